// SPDX-License-Identifier: MIT

//! Maps [`DaemonError`] onto the wire response shape every endpoint shares —
//! `{error, msg, status_code, data?}` — at whatever HTTP status the error
//! carries.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use inferd_core::{DaemonError, ErrorResponse, JobError};

/// Either a scheduler-rejection error or a terminated job's own error — both
/// already share the `{error, msg, status_code, data?}` shape, so this is
/// just the union of the two sources that can produce it.
pub struct ApiError(pub ErrorResponse);

impl From<DaemonError> for ApiError {
    fn from(err: DaemonError) -> Self {
        ApiError(err.to_wire())
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        ApiError(ErrorResponse { error: err.error, msg: err.msg, status_code: err.status_code, data: err.data })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}
