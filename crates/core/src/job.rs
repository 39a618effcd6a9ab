// SPDX-License-Identifier: MIT

//! Job identity and the job state machine.
//!
//! A job starts `Init`, moves to `Queued` once handed to the worker pool,
//! then `Running`, then one of the three terminal states. Transitions are
//! monotone — once terminal, a job never moves again.

use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::define_id;
use crate::error::DaemonError;

define_id! {
    /// Identifies one submitted job. Serialized form is the bare id string
    /// (no struct wrapper) to match the wire `uid` field.
    pub struct JobId("job-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Init,
    Queued,
    Running,
    Done,
    Error,
    Interrupted,
}

crate::simple_display! {
    JobState {
        Init => "Initializing",
        Queued => "Queued",
        Running => "In Progress",
        Done => "Done",
        Error => "Error",
        Interrupted => "Interrupted",
    }
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Error | JobState::Interrupted)
    }

    /// Whether `to` is a legal transition from `self`. Terminal states never
    /// move again.
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, to),
            (Init, Queued) | (Init, Interrupted)
                | (Queued, Running) | (Queued, Interrupted)
                | (Running, Done) | (Running, Error) | (Running, Interrupted)
        )
    }
}

/// Extra progress data a handler may attach while running, surfaced back to
/// clients polling the job's status.
pub type ProgressExtras = HashMap<String, Value>;

/// The method name that produced a job plus when it was received — internal
/// bookkeeping (logging, diagnostics), not part of the wire job descriptor.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo {
    pub method: &'static str,
    pub received_at: SystemTime,
}

/// A submitted job's bookkeeping record, independent of the pipeline that
/// actually runs it. Owned by the scheduler; the pipeline only ever reports
/// state transitions back through it.
#[derive(Debug, Clone)]
pub struct Job {
    pub uid: JobId,
    pub state: JobState,
    pub extras: ProgressExtras,
    pub result: Option<Value>,
    pub error: Option<JobError>,
    pub request_info: Option<RequestInfo>,
}

/// A terminal job's failure, carried separately from [`DaemonError`] because
/// it must survive being moved across the worker/caller boundary and
/// serialized into the job status response.
#[derive(Debug, Clone, Serialize)]
pub struct JobError {
    pub error: &'static str,
    pub msg: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&DaemonError> for JobError {
    fn from(err: &DaemonError) -> Self {
        let wire = err.to_wire();
        JobError { error: wire.error, msg: wire.msg, status_code: wire.status_code, data: wire.data }
    }
}

impl Job {
    pub fn new() -> Self {
        Job {
            uid: JobId::new(),
            state: JobState::Init,
            extras: HashMap::new(),
            result: None,
            error: None,
            request_info: None,
        }
    }

    /// Apply a state transition, panicking in debug builds on an illegal
    /// move since that indicates a scheduler bug, not a client error.
    pub fn transition(&mut self, to: JobState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "illegal job transition {:?} -> {:?}",
            self.state,
            to
        );
        self.state = to;
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
