// SPDX-License-Identifier: MIT

//! The function registry: maps `(package_id, function_name)` to the handler
//! record a package's module registered during load. First registration
//! wins within a package; `resolve_active` is implemented in `pipeline`
//! since it also needs the catalog's active-package lookup.

use std::collections::HashMap;
use std::sync::Arc;

use inferd_core::package::PackageId;
use inferd_handler_api::{InputSchema, InputTransform, OutputTransform};
use parking_lot::Mutex;

pub struct FunctionRegistration {
    pub package_id: PackageId,
    pub function_name: String,
    pub model_name: String,
    pub input_transform: Box<dyn InputTransform>,
    pub output_transform: Box<dyn OutputTransform>,
    pub input_schema: Option<InputSchema>,
}

/// In-memory registry, owned by the process for its lifetime. Guarded by
/// one coarse lock.
#[derive(Default)]
pub struct FunctionRegistry {
    inner: Mutex<HashMap<(PackageId, String), Arc<FunctionRegistration>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under the loading package. Duplicates (same
    /// `(package_id, function_name)` registered twice in one load) are
    /// ignored — first registration wins.
    pub fn register(&self, registration: FunctionRegistration) {
        let key = (registration.package_id, registration.function_name.clone());
        self.inner.lock().entry(key).or_insert_with(|| Arc::new(registration));
    }

    /// Drop every registration belonging to `package_id`, invoked on
    /// deactivate/remove.
    pub fn clear(&self, package_id: PackageId) {
        self.inner.lock().retain(|(pid, _), _| *pid != package_id);
    }

    pub fn lookup(&self, package_id: PackageId, function_name: &str) -> Option<Arc<FunctionRegistration>> {
        self.inner.lock().get(&(package_id, function_name.to_string())).cloned()
    }

    pub fn registered_count(&self, package_id: PackageId) -> usize {
        self.inner.lock().keys().filter(|(pid, _)| *pid == package_id).count()
    }
}
