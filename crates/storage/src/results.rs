// SPDX-License-Identifier: MIT

//! The result file handle store: transforms that produce a large artifact
//! write it under `results/<uuid>` and hand back a `{"file_ref": <uuid>}`
//! sentinel; `/result/<uuid>` streams the bytes back. The daemon never
//! interprets the file's contents.

use std::path::PathBuf;

use inferd_core::DaemonError;
use inferd_handler_api::{HandlerError, ResultWriter};
use uuid::Uuid;

use crate::layout::Layout;

#[derive(Clone)]
pub struct ResultStore {
    layout: Layout,
}

impl ResultStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Write `bytes` under a fresh uuid and return the id clients use to
    /// address it via `/result/<uuid>`.
    pub fn put(&self, bytes: &[u8]) -> Result<String, DaemonError> {
        std::fs::create_dir_all(self.layout.results_dir())
            .map_err(|e| DaemonError::InternalError(format!("creating results dir: {e}")))?;
        let uid = Uuid::new_v4().to_string();
        std::fs::write(self.layout.result_path(&uid), bytes)
            .map_err(|e| DaemonError::InternalError(format!("writing result file: {e}")))?;
        Ok(uid)
    }

    pub fn path(&self, uid: &str) -> PathBuf {
        self.layout.result_path(uid)
    }

    pub fn read(&self, uid: &str) -> Result<Vec<u8>, DaemonError> {
        std::fs::read(self.path(uid)).map_err(|e| DaemonError::MissingEntry(format!("result {uid}: {e}")))
    }
}

impl ResultWriter for ResultStore {
    fn put(&self, bytes: &[u8]) -> Result<String, HandlerError> {
        ResultStore::put(self, bytes).map_err(|e| HandlerError::new(e.to_string()))
    }
}
