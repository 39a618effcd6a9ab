// SPDX-License-Identifier: MIT

//! `wrap_sync`/`wrap_async`: every operation that goes through the
//! scheduler has a synchronous form (submit, then block for the result) and
//! an asynchronous form (submit, return the job descriptor immediately).
//! Route handlers differ only in which of these two they call.

use axum::Json;
use inferd_engine::{JobHandle, Scheduler};
use inferd_runtime::fake::FakeEngine;
use serde_json::Value;

use super::error::ApiError;
use super::jobs::JobStatus;

/// Submit `request`, block until it reaches a terminal state, and respond
/// with its result (or its error, at whatever status that error carries).
pub async fn wrap_sync(
    scheduler: &Scheduler<FakeEngine>,
    request: inferd_engine::JobRequest,
) -> Result<Json<Value>, ApiError> {
    let handle: JobHandle = scheduler.submit(request)?;
    let value = handle.await_result().await?;
    Ok(Json(value))
}

/// Submit `request` and respond immediately with the job descriptor every
/// `/async/...` route returns.
pub async fn wrap_async(
    scheduler: &Scheduler<FakeEngine>,
    request: inferd_engine::JobRequest,
) -> Result<Json<JobStatus>, ApiError> {
    let handle: JobHandle = scheduler.submit(request)?;
    Ok(Json(handle.snapshot().into()))
}
