// SPDX-License-Identifier: MIT

//! The handler loader. A package's handler module is third-party code that
//! runs in-process with full daemon privileges: a compiled `cdylib` loaded
//! with `libloading`, rather than a subprocess or WASM sandbox. It exposes
//! one `extern "C"` entry point (`inferd_handler_api::ENTRY_POINT_SYMBOL`)
//! that receives a `&mut dyn Registrar` and calls `register(...)` through
//! it once per function it wants to expose.
//!
//! Single-loader discipline is enforced by `loading_lock`: exactly one
//! package loads at a time, process-wide. The registrar passed to the
//! module already carries its package's id as an explicit field, so the
//! lock's remaining job is serializing the working-directory swap —
//! `std::env::current_dir` is itself process-global, so two concurrent
//! loads would stomp on each other's cwd regardless of how registration is
//! threaded through.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use inferd_core::package::PackageId;
use inferd_core::DaemonError;
use inferd_handler_api::{EntryPoint, InputSchema, InputTransform, OutputTransform, Registrar, ENTRY_POINT_SYMBOL};
use libloading::Library;
use parking_lot::Mutex;

use crate::registry::{FunctionRegistration, FunctionRegistry};

/// Restores the process working directory on drop, covering early returns
/// and panics alike.
struct WorkingDirGuard {
    previous: PathBuf,
}

impl WorkingDirGuard {
    fn enter(dir: &Path) -> Result<Self, DaemonError> {
        let previous = std::env::current_dir()
            .map_err(|e| DaemonError::PackageInstallError(format!("reading cwd: {e}")))?;
        std::env::set_current_dir(dir)
            .map_err(|e| DaemonError::PackageInstallError(format!("entering install dir: {e}")))?;
        Ok(Self { previous })
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if std::env::set_current_dir(&self.previous).is_err() {
            tracing::error!(dir = %self.previous.display(), "failed to restore working directory after handler load");
        }
    }
}

struct LoadingRegistrar<'a> {
    package_id: PackageId,
    registry: &'a FunctionRegistry,
}

impl Registrar for LoadingRegistrar<'_> {
    fn register(
        &mut self,
        fn_name: &str,
        input_transform: Box<dyn InputTransform>,
        output_transform: Box<dyn OutputTransform>,
        model_name: Option<&str>,
        input_schema: Option<InputSchema>,
    ) {
        self.registry.register(FunctionRegistration {
            package_id: self.package_id,
            function_name: fn_name.to_string(),
            model_name: model_name.unwrap_or(fn_name).to_string(),
            input_transform,
            output_transform,
            input_schema,
        });
    }
}

/// Owns every loaded package's `cdylib`, keeping it mapped for as long as
/// the package stays loaded.
pub struct Loader {
    loading_lock: Mutex<()>,
    libraries: Mutex<HashMap<PackageId, Library>>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// The fixed destination file name every installed handler module is copied
/// to, regardless of the archive's own extension for it. A `cdylib` only
/// ever has the one extension `libloading` can open on a given platform, so
/// unlike the model files (whose `<name>.<type>` naming carries meaning),
/// preserving the archive's original module extension would only add a
/// second source of truth the loader would later have to rediscover —
/// fixing the name once at install time removes that lookup entirely.
pub const MODULE_FILE_NAME: &str = "module.so";

impl Loader {
    pub fn new() -> Self {
        Self { loading_lock: Mutex::new(()), libraries: Mutex::new(HashMap::new()) }
    }

    /// Load `package_id`'s handler module from `install_dir`, registering
    /// its functions into `registry`. Any module panic or registration
    /// error becomes `PackageInstallError`.
    pub fn load(
        &self,
        registry: &FunctionRegistry,
        package_id: PackageId,
        install_dir: &Path,
        module_file_name: &str,
    ) -> Result<(), DaemonError> {
        let _loading_guard = self.loading_lock.lock();
        let _cwd_guard = WorkingDirGuard::enter(install_dir)?;

        let module_path = install_dir.join(module_file_name);
        // SAFETY: the loaded library is trusted third-party handler code
        // that the daemon deliberately runs with full process privileges,
        // unsandboxed; `libloading` cannot itself verify the symbol's ABI,
        // which is why handler modules must be built with the same
        // toolchain as the daemon.
        let library = unsafe { Library::new(&module_path) }
            .map_err(|e| DaemonError::PackageInstallError(format!("loading handler module: {e}")))?;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            // SAFETY: see above; the symbol name and signature are the
            // fixed contract in `inferd_handler_api::ENTRY_POINT_SYMBOL`.
            let entry: libloading::Symbol<EntryPoint> = unsafe { library.get(ENTRY_POINT_SYMBOL) }
                .map_err(|e| DaemonError::PackageInstallError(format!("missing entry point: {e}")))?;
            let mut registrar = LoadingRegistrar { package_id, registry };
            // SAFETY: `entry` is the handler-supplied `extern "C"` function;
            // it receives only the `&mut dyn Registrar` the ABI promises.
            unsafe { entry(&mut registrar) }
                .map_err(|e| DaemonError::PackageInstallError(format!("handler registration failed: {e}")))
        }));

        match result {
            Ok(Ok(())) => {
                self.libraries.lock().insert(package_id, library);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler module panicked".to_string());
                let msg = inferd_core::error::truncate(msg, 500);
                Err(DaemonError::PackageInstallError(format!("handler module panicked: {msg}")))
            }
        }
    }

    /// Clear a package's registrations and drop its loaded library. Must
    /// clear the registry first: the registrations hold `Box<dyn Trait>`
    /// values whose code lives in the library being unloaded.
    pub fn unload(&self, registry: &FunctionRegistry, package_id: PackageId) {
        registry.clear(package_id);
        self.libraries.lock().remove(&package_id);
    }

    pub fn is_loaded(&self, package_id: PackageId) -> bool {
        self.libraries.lock().contains_key(&package_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_file_is_package_install_error() {
        let loader = Loader::new();
        let registry = FunctionRegistry::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let err = loader.load(&registry, 1, dir.path(), "module.so").unwrap_err();
        assert!(matches!(err, DaemonError::PackageInstallError(_)));
    }

    #[test]
    fn unload_without_prior_load_is_a_no_op() {
        let loader = Loader::new();
        let registry = FunctionRegistry::new();
        loader.unload(&registry, 42);
        assert!(!loader.is_loaded(42));
    }
}
