// SPDX-License-Identifier: MIT

//! `GET /result/{name}`: stream a result file's raw bytes. A missing file
//! answers with a bare 404 rather than the daemon's usual structured error
//! body.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::state::AppState;

pub async fn get_result(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.results.read(&name) {
        Ok(bytes) => (StatusCode::OK, bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
