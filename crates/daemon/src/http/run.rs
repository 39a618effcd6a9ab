// SPDX-License-Identifier: MIT

//! `POST /run/{pkg}/{fn}` and `POST /_run/{pkg}/{model}`, each with a sync
//! and an async twin. The request body is an optional JSON object of named
//! inputs, defaulting to empty when absent.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::Json;
use inferd_core::{Tensor, WireTensor};
use inferd_engine::JobRequest;
use serde_json::Value;

use super::error::ApiError;
use super::jobs::JobStatus;
use super::respond::{wrap_async, wrap_sync};
use crate::state::AppState;

fn call_request(pkg_name: String, fn_name: String, inputs: Option<HashMap<String, Value>>) -> JobRequest {
    JobRequest::Call { pkg_name, fn_name, inputs: inputs.unwrap_or_default() }
}

fn call_raw_request(
    pkg_name: String,
    model_name: String,
    inputs: Option<HashMap<String, WireTensor>>,
) -> Result<JobRequest, ApiError> {
    let mut decoded = HashMap::new();
    for (name, wire) in inputs.unwrap_or_default() {
        decoded.insert(name, Tensor::decode(&wire).map_err(ApiError::from)?);
    }
    Ok(JobRequest::CallRaw { pkg_name, model_name, inputs: decoded })
}

pub async fn call_sync(
    State(state): State<AppState>,
    Path((pkg_name, fn_name)): Path<(String, String)>,
    body: Option<Json<HashMap<String, Value>>>,
) -> Result<Json<Value>, ApiError> {
    wrap_sync(&state.scheduler, call_request(pkg_name, fn_name, body.map(|Json(v)| v))).await
}

pub async fn call_async(
    State(state): State<AppState>,
    Path((pkg_name, fn_name)): Path<(String, String)>,
    body: Option<Json<HashMap<String, Value>>>,
) -> Result<Json<JobStatus>, ApiError> {
    wrap_async(&state.scheduler, call_request(pkg_name, fn_name, body.map(|Json(v)| v))).await
}

pub async fn call_raw_sync(
    State(state): State<AppState>,
    Path((pkg_name, model_name)): Path<(String, String)>,
    body: Option<Json<HashMap<String, WireTensor>>>,
) -> Result<Json<Value>, ApiError> {
    let request = call_raw_request(pkg_name, model_name, body.map(|Json(v)| v))?;
    wrap_sync(&state.scheduler, request).await
}

pub async fn call_raw_async(
    State(state): State<AppState>,
    Path((pkg_name, model_name)): Path<(String, String)>,
    body: Option<Json<HashMap<String, WireTensor>>>,
) -> Result<Json<JobStatus>, ApiError> {
    let request = call_raw_request(pkg_name, model_name, body.map(|Json(v)| v))?;
    wrap_async(&state.scheduler, request).await
}
