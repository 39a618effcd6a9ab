// SPDX-License-Identifier: MIT

//! `GET /`: a liveness heartbeat reporting this daemon's own service name
//! and build version.

use axum::Json;
use serde_json::{json, Value};

pub async fn heartbeat() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "service": "inferd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
