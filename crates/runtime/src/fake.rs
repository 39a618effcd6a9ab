// SPDX-License-Identifier: MIT

//! A reference `Session`/`InferenceEngine` pair used by the pipeline's and
//! daemon's own test suites, since the real tensor runtime is out of scope
//! here. `IdentitySession` passes one named input straight through to one
//! named output, enough to exercise the whole request pipeline end to end
//! with a simple echo/identity call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use inferd_core::{DaemonError, Tensor};
use parking_lot::Mutex;

use crate::session::{InferenceEngine, Session};

pub struct IdentitySession {
    input: (String, String),
    output: String,
}

impl IdentitySession {
    pub fn new(input_name: impl Into<String>, output_name: impl Into<String>, dtype_tag: impl Into<String>) -> Self {
        Self { input: (input_name.into(), dtype_tag.into()), output: output_name.into() }
    }
}

impl Session for IdentitySession {
    fn inputs(&self) -> &[(String, String)] {
        std::slice::from_ref(&self.input)
    }

    fn outputs(&self) -> &[String] {
        std::slice::from_ref(&self.output)
    }

    fn run(
        &self,
        output_names: &[String],
        mut inputs: HashMap<String, Tensor>,
    ) -> Result<HashMap<String, Tensor>, DaemonError> {
        let tensor = inputs.remove(&self.input.0).ok_or_else(|| {
            DaemonError::ModelRunError(format!("missing input {}", self.input.0))
        })?;
        let mut out = HashMap::new();
        for name in output_names {
            out.insert(name.clone(), tensor.clone());
        }
        Ok(out)
    }
}

/// Opens [`IdentitySession`]s for any path, recording how many times each
/// path was opened so tests can assert on cache behavior.
#[derive(Default)]
pub struct FakeEngine {
    opens: Mutex<HashMap<PathBuf, u32>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self, path: &Path) -> u32 {
        self.opens.lock().get(path).copied().unwrap_or(0)
    }
}

impl InferenceEngine for FakeEngine {
    fn open_session(&self, path: &Path) -> Result<Arc<dyn Session>, DaemonError> {
        *self.opens.lock().entry(path.to_path_buf()).or_insert(0) += 1;
        Ok(Arc::new(IdentitySession::new("x", "y", "tensor(float)")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_session_passes_input_through() {
        let session = IdentitySession::new("x", "y", "tensor(float)");
        let tensor = Tensor::new(inferd_core::DType::Float32, vec![2], vec![0, 0, 128, 63, 0, 0, 0, 64])
            .expect("build tensor");
        let mut inputs = HashMap::new();
        inputs.insert("x".to_string(), tensor.clone());
        let outputs = session.run(&["y".to_string()], inputs).expect("run");
        assert_eq!(outputs.get("y"), Some(&tensor));
    }

    #[test]
    fn fake_engine_counts_opens_per_path() {
        let engine = FakeEngine::new();
        let path = Path::new("/models/echo.onnx");
        engine.open_session(path).expect("open 1");
        engine.open_session(path).expect("open 2");
        assert_eq!(engine.open_count(path), 2);
    }
}
