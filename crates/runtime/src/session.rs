// SPDX-License-Identifier: MIT

//! The opaque session-per-model boundary: `open session → coerce dtypes →
//! run → named outputs`.

use std::collections::HashMap;
use std::path::Path;

use inferd_core::{DaemonError, Tensor};

/// One open model session. Implementations own whatever native handle the
/// real tensor runtime needs; this crate never looks inside it.
pub trait Session: Send + Sync {
    /// `(name, dtype_tag)` pairs the session expects, e.g. `("x",
    /// "tensor(float)")`. The request pipeline uses this to coerce
    /// caller-supplied dtypes before calling `run`.
    fn inputs(&self) -> &[(String, String)];

    fn outputs(&self) -> &[String];

    fn run(
        &self,
        output_names: &[String],
        inputs: HashMap<String, Tensor>,
    ) -> Result<HashMap<String, Tensor>, DaemonError>;
}

/// Opens sessions from a model's on-disk path. The real implementation would
/// wrap an ONNX-equivalent runtime; that binding is out of scope here.
pub trait InferenceEngine: Send + Sync {
    fn open_session(&self, path: &Path) -> Result<std::sync::Arc<dyn Session>, DaemonError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::IdentitySession;

    #[test]
    fn identity_session_declares_its_contract() {
        let session = IdentitySession::new("x", "y", "tensor(float)");
        assert_eq!(session.inputs(), &[("x".to_string(), "tensor(float)".to_string())]);
        assert_eq!(session.outputs(), &["y".to_string()]);
    }
}
