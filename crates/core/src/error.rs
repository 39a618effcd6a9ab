// SPDX-License-Identifier: MIT

//! The daemon's error taxonomy.
//!
//! One enum covers every failure kind the daemon produces: handler failures,
//! package-lifecycle failures, download failures, catalog failures, and
//! scheduler failures. Each variant carries a human message and, where it
//! matters for clients, a `data` payload and an HTTP-shaped status code.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Truncate a debug-formatted value to at most `max_len` characters,
/// appending an ellipsis when truncated. Used to keep error payloads that
/// echo back bad user input from growing unbounded.
pub fn truncate(s: impl AsRef<str>, max_len: usize) -> String {
    let s = s.as_ref();
    if s.len() <= max_len {
        s.to_string()
    } else {
        let cut = s.char_indices().take(max_len.saturating_sub(3)).last().map(|(i, c)| i + c.len_utf8()).unwrap_or(0);
        format!("{}...", &s[..cut])
    }
}

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid tensor: {0}")]
    InvalidTensor(String),
    #[error("no such function {package}/{function}")]
    MissingFunction { package: String, function: String },
    #[error("no such job {0}")]
    NoSuchJob(String),
    #[error("package {name} version {version:?} already exists")]
    PackageAlreadyExists { name: String, version: Option<String> },
    #[error("package install failed: {0}")]
    PackageInstallError(String),
    #[error("package storage error: {0}")]
    PackageStorageError(String),
    #[error("repository error: {0}")]
    RepositoryError(String),
    #[error("download collision for {0}")]
    DownloadCollision(String),
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("remote server failed: {0}")]
    RemoteFailed(String),
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("database error: {0}")]
    DatabaseError(String),
    #[error("missing catalog entry: {0}")]
    MissingEntry(String),
    #[error("model run error: {0}")]
    ModelRunError(String),
    #[error("job interrupted")]
    JobInterrupted,
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("queue overloaded")]
    Overloaded,
    /// Errors raised by third-party handler code that are not themselves
    /// `DaemonError`s get wrapped here with the handler's message captured.
    #[error("package error: {0}")]
    PackageError(String),
}

impl DaemonError {
    /// The daemon's name for this error kind, used as the `error` field of
    /// the wire-format error response.
    pub fn name(&self) -> &'static str {
        match self {
            DaemonError::Validation(_) => "Validation Error",
            DaemonError::InvalidTensor(_) => "Invalid Tensor",
            DaemonError::MissingFunction { .. } => "Missing Function",
            DaemonError::NoSuchJob(_) => "No such job",
            DaemonError::PackageAlreadyExists { .. } => "Package Already Exists",
            DaemonError::PackageInstallError(_) => "Package Install Error",
            DaemonError::PackageStorageError(_) => "Package Storage Error",
            DaemonError::RepositoryError(_) => "Repository Error",
            DaemonError::DownloadCollision(_) => "Download Collision",
            DaemonError::HashMismatch { .. } => "Hash Mismatch",
            DaemonError::RemoteFailed(_) => "Remote Server Error",
            DaemonError::ConnectionError(_) => "Connection Error",
            DaemonError::DatabaseError(_) => "Database Error",
            DaemonError::MissingEntry(_) => "Missing Entry",
            DaemonError::ModelRunError(_) => "Model Run Error",
            DaemonError::JobInterrupted => "Job Interrupted",
            DaemonError::InternalError(_) => "Internal Error",
            DaemonError::Overloaded => "Overloaded",
            DaemonError::PackageError(_) => "Package Error",
        }
    }

    /// HTTP-shaped status code. Validation-family errors are client errors
    /// (400); everything else defaults to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            DaemonError::Validation(_)
            | DaemonError::InvalidTensor(_)
            | DaemonError::MissingFunction { .. }
            | DaemonError::NoSuchJob(_) => 400,
            DaemonError::Overloaded => 503,
            _ => 500,
        }
    }

    pub fn data(&self) -> Option<Value> {
        match self {
            DaemonError::PackageAlreadyExists { name, version } => Some(serde_json::json!({
                "name": name,
                "version": version,
            })),
            DaemonError::HashMismatch { expected, actual } => Some(serde_json::json!({
                "expected": expected,
                "actual": actual,
            })),
            _ => None,
        }
    }

    /// Render the `{error, msg, status_code, data?}` wire shape clients parse.
    pub fn to_wire(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.name(),
            msg: self.to_string(),
            status_code: self.status_code(),
            data: self.data(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub msg: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
