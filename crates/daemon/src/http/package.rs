// SPDX-License-Identifier: MIT

//! `/package/{install,fetch,activate,deactivate,remove,search,list}`, each
//! with a sync and an async twin. Every route but `list` submits a job onto
//! the worker pool, since installing, activating, or searching all involve
//! I/O the HTTP frontend must never block on directly.
//!
//! `install` installs and activates; `fetch` installs without activating.
//! That distinction lives entirely in which [`InstallOptions::activate`]
//! each route passes — both submit the same [`JobRequest::Install`].

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use inferd_engine::{InstallOptions, JobRequest, PackageTarget};
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::jobs::JobStatus;
use super::respond::{wrap_async, wrap_sync};
use crate::install_request;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TargetBody {
    name: String,
    version: Option<String>,
}

impl From<TargetBody> for PackageTarget {
    fn from(body: TargetBody) -> Self {
        PackageTarget { name: body.name, version: body.version }
    }
}

#[derive(Deserialize)]
pub struct SearchBody {
    query: String,
}

/// Multipart and plain-JSON install bodies both reach here; which one a
/// request used is told apart by `Content-Type`. The whole [`Request`] is
/// taken (rather than a `Bytes` body plus headers) so a multipart body can
/// still be handed to axum's own `Multipart` extractor when that's the
/// shape in play.
async fn install_source_from_request(
    state: &AppState,
    request: Request,
) -> Result<inferd_engine::InstallSource, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/"))
        .unwrap_or(false);

    if is_multipart {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| ApiError::from(inferd_core::DaemonError::Validation(e.to_string())))?;
        install_request::from_multipart(multipart).await.map_err(ApiError::from)
    } else {
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .map_err(|e| ApiError::from(inferd_core::DaemonError::Validation(e.to_string())))?;
        install_request::from_json(&bytes).map_err(ApiError::from)
    }
}

async fn install_job(state: &AppState, request: Request, options: InstallOptions) -> Result<JobRequest, ApiError> {
    let source = install_source_from_request(state, request).await?;
    Ok(JobRequest::Install { source, options })
}

pub async fn install_sync(State(state): State<AppState>, request: Request) -> Result<Json<Value>, ApiError> {
    let job = install_job(&state, request, InstallOptions { exist_ok: false, activate: true }).await?;
    wrap_sync(&state.scheduler, job).await
}

pub async fn install_async(State(state): State<AppState>, request: Request) -> Result<Json<JobStatus>, ApiError> {
    let job = install_job(&state, request, InstallOptions { exist_ok: false, activate: true }).await?;
    wrap_async(&state.scheduler, job).await
}

pub async fn fetch_sync(State(state): State<AppState>, request: Request) -> Result<Json<Value>, ApiError> {
    let job = install_job(&state, request, InstallOptions { exist_ok: false, activate: false }).await?;
    wrap_sync(&state.scheduler, job).await
}

pub async fn fetch_async(State(state): State<AppState>, request: Request) -> Result<Json<JobStatus>, ApiError> {
    let job = install_job(&state, request, InstallOptions { exist_ok: false, activate: false }).await?;
    wrap_async(&state.scheduler, job).await
}

pub async fn activate_sync(
    State(state): State<AppState>,
    Json(body): Json<TargetBody>,
) -> Result<Json<Value>, ApiError> {
    wrap_sync(&state.scheduler, JobRequest::Activate(body.into())).await
}

pub async fn activate_async(
    State(state): State<AppState>,
    Json(body): Json<TargetBody>,
) -> Result<Json<JobStatus>, ApiError> {
    wrap_async(&state.scheduler, JobRequest::Activate(body.into())).await
}

pub async fn deactivate_sync(
    State(state): State<AppState>,
    Json(body): Json<TargetBody>,
) -> Result<Json<Value>, ApiError> {
    wrap_sync(&state.scheduler, JobRequest::Deactivate(body.into())).await
}

pub async fn deactivate_async(
    State(state): State<AppState>,
    Json(body): Json<TargetBody>,
) -> Result<Json<JobStatus>, ApiError> {
    wrap_async(&state.scheduler, JobRequest::Deactivate(body.into())).await
}

pub async fn remove_sync(
    State(state): State<AppState>,
    Json(body): Json<TargetBody>,
) -> Result<Json<Value>, ApiError> {
    wrap_sync(&state.scheduler, JobRequest::Remove(body.into())).await
}

pub async fn remove_async(
    State(state): State<AppState>,
    Json(body): Json<TargetBody>,
) -> Result<Json<JobStatus>, ApiError> {
    wrap_async(&state.scheduler, JobRequest::Remove(body.into())).await
}

pub async fn search_sync(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<Value>, ApiError> {
    wrap_sync(&state.scheduler, JobRequest::Search { query: body.query }).await
}

pub async fn search_async(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<JobStatus>, ApiError> {
    wrap_async(&state.scheduler, JobRequest::Search { query: body.query }).await
}

pub async fn list_sync(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    wrap_sync(&state.scheduler, JobRequest::List).await
}

pub async fn list_async(State(state): State<AppState>) -> Result<Json<JobStatus>, ApiError> {
    wrap_async(&state.scheduler, JobRequest::List).await
}
