// SPDX-License-Identifier: MIT

//! `GET /async/get/{uid}` and `GET /async/cancel/{uid}`. The job status
//! descriptor carries `uid`, `status`, `data` (progress extras), plus
//! `result` or `error` once terminal.

use axum::extract::{Path, State};
use axum::Json;
use inferd_core::{Job, JobError, JobId, JobState};
use serde::Serialize;
use serde_json::Value;

use crate::http::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct JobStatus {
    pub uid: String,
    pub status: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl From<Job> for JobStatus {
    fn from(job: Job) -> Self {
        let result = if job.state == JobState::Done { job.result } else { None };
        JobStatus {
            uid: job.uid.to_string(),
            status: job.state.to_string(),
            data: serde_json::to_value(job.extras).unwrap_or(Value::Null),
            result,
            error: job.error,
        }
    }
}

pub async fn async_get(State(state): State<AppState>, Path(uid): Path<String>) -> Result<Json<JobStatus>, ApiError> {
    let handle = state.scheduler.get(&JobId::from_string(&uid)).map_err(ApiError::from)?;
    Ok(Json(handle.snapshot().into()))
}

pub async fn async_cancel(State(state): State<AppState>, Path(uid): Path<String>) -> Result<Json<JobStatus>, ApiError> {
    let handle = state.scheduler.get(&JobId::from_string(&uid)).map_err(ApiError::from)?;
    handle.cancel();
    Ok(Json(handle.snapshot().into()))
}
