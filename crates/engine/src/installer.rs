// SPDX-License-Identifier: MIT

//! The archive installer: stage, parse manifest, allocate install id,
//! insert catalog rows, plan copies, verify sources exist, copy under the
//! fresh install id, optionally activate.

use std::io::Read;
use std::path::{Path, PathBuf};

use inferd_core::package::{ModelKind, PackageRow};
use inferd_core::{DaemonError, Manifest};
use inferd_storage::{CatalogSession, Layout};
use uuid::Uuid;

use crate::loader::Loader;
use crate::registry::FunctionRegistry;

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// A `PackageAlreadyExists` conflict on insert becomes a success
    /// sentinel instead of propagating.
    pub exist_ok: bool,
    /// Whether to run the handler loader and mark the package active once
    /// installed — the `install`/`fetch` distinction.
    pub activate: bool,
}

#[derive(Debug, Clone)]
pub enum InstallOutcome {
    Installed(PackageRow),
    AlreadyExists(PackageRow),
}

impl InstallOutcome {
    pub fn row(&self) -> &PackageRow {
        match self {
            InstallOutcome::Installed(row) | InstallOutcome::AlreadyExists(row) => row,
        }
    }
}

pub struct Installer {
    layout: Layout,
}

impl Installer {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Install the archive (or staged directory) at `archive_path`. The
    /// catalog session is the caller's — the worker loop commits or rolls
    /// it back at job end.
    pub fn install(
        &self,
        session: &mut CatalogSession<'_>,
        loader: &Loader,
        registry: &FunctionRegistry,
        archive_path: &Path,
        options: InstallOptions,
    ) -> Result<InstallOutcome, DaemonError> {
        let staging = self.stage(archive_path)?;

        let manifest = self.read_manifest(staging.path())?;
        manifest.validate().map_err(DaemonError::Validation)?;

        let install_id = Uuid::new_v4().to_string();

        let package = match session.insert_package(
            &manifest.name,
            manifest.version.as_deref(),
            manifest.human_name.as_deref(),
            &install_id,
        ) {
            Ok(row) => row,
            Err(DaemonError::PackageAlreadyExists { name, version }) if options.exist_ok => {
                let existing = session
                    .package_by_name_version(&manifest.name, manifest.version.as_deref())
                    .ok_or(DaemonError::PackageAlreadyExists { name, version })?;
                return Ok(InstallOutcome::AlreadyExists(existing));
            }
            Err(e) => return Err(e),
        };

        self.verify_sources_exist(staging.path(), &manifest)?;

        for (model_name, entry) in &manifest.model {
            let dest_name = model_file_name(model_name, entry.kind);
            session.insert_model(package.package_id, model_name, entry.kind, &dest_name)?;
        }

        let dest_dir = self.layout.package_install_dir(&install_id);
        self.copy_into_install_dir(staging.path(), &dest_dir, &manifest, crate::loader::MODULE_FILE_NAME)?;

        if options.activate {
            loader.load(registry, package.package_id, &dest_dir, crate::loader::MODULE_FILE_NAME)?;
            session.set_active(package.package_id, true)?;
        }

        let installed = session
            .package_by_id(package.package_id)
            .unwrap_or(package);
        tracing::info!(
            package = %installed.name,
            version = ?installed.version,
            activated = options.activate,
            "package installed"
        );
        Ok(InstallOutcome::Installed(installed))
    }

    /// Stage an archive (zip file) or a plain directory into a fresh temp
    /// directory.
    fn stage(&self, archive_path: &Path) -> Result<tempfile::TempDir, DaemonError> {
        let staging = tempfile::tempdir()
            .map_err(|e| DaemonError::PackageStorageError(format!("creating staging dir: {e}")))?;

        if archive_path.is_dir() {
            copy_tree(archive_path, staging.path())?;
        } else {
            let file = std::fs::File::open(archive_path)
                .map_err(|e| DaemonError::PackageStorageError(format!("opening archive: {e}")))?;
            let mut archive = zip::ZipArchive::new(file)
                .map_err(|e| DaemonError::PackageInstallError(format!("reading archive: {e}")))?;
            for i in 0..archive.len() {
                let mut entry = archive
                    .by_index(i)
                    .map_err(|e| DaemonError::PackageInstallError(format!("reading archive entry: {e}")))?;
                let Some(relative) = entry.enclosed_name() else {
                    continue;
                };
                let dest = staging.path().join(relative);
                if entry.is_dir() {
                    std::fs::create_dir_all(&dest)
                        .map_err(|e| DaemonError::PackageStorageError(format!("staging dir: {e}")))?;
                    continue;
                }
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| DaemonError::PackageStorageError(format!("staging dir: {e}")))?;
                }
                let mut buf = Vec::new();
                entry
                    .read_to_end(&mut buf)
                    .map_err(|e| DaemonError::PackageInstallError(format!("reading archive entry: {e}")))?;
                std::fs::write(&dest, buf)
                    .map_err(|e| DaemonError::PackageStorageError(format!("staging file: {e}")))?;
            }
        }

        Ok(staging)
    }

    fn read_manifest(&self, staging_dir: &Path) -> Result<Manifest, DaemonError> {
        let bytes = std::fs::read(staging_dir.join("meta.json"))
            .map_err(|e| DaemonError::PackageInstallError(format!("missing meta.json: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DaemonError::PackageInstallError(format!("invalid meta.json: {e}")))
    }

    /// Abort before any copy if a named source file is missing.
    fn verify_sources_exist(&self, staging_dir: &Path, manifest: &Manifest) -> Result<(), DaemonError> {
        let module_src = staging_dir.join(&manifest.module);
        if !module_src.is_file() {
            return Err(DaemonError::PackageInstallError(format!(
                "manifest module file missing: {}",
                manifest.module
            )));
        }
        for entry in manifest.model.values() {
            let src = staging_dir.join(&entry.file);
            if !src.is_file() {
                return Err(DaemonError::PackageInstallError(format!(
                    "manifest model file missing: {}",
                    entry.file
                )));
            }
        }
        Ok(())
    }

    fn copy_into_install_dir(
        &self,
        staging_dir: &Path,
        dest_dir: &Path,
        manifest: &Manifest,
        module_file_name: &str,
    ) -> Result<(), DaemonError> {
        std::fs::create_dir_all(dest_dir)
            .map_err(|e| DaemonError::PackageStorageError(format!("creating install dir: {e}")))?;

        std::fs::copy(staging_dir.join("meta.json"), dest_dir.join("meta.json"))
            .map_err(|e| DaemonError::PackageStorageError(format!("copying meta.json: {e}")))?;
        std::fs::copy(staging_dir.join(&manifest.module), dest_dir.join(module_file_name))
            .map_err(|e| DaemonError::PackageStorageError(format!("copying module: {e}")))?;
        for (model_name, entry) in &manifest.model {
            let dest_name = model_file_name(model_name, entry.kind);
            std::fs::copy(staging_dir.join(&entry.file), dest_dir.join(&dest_name))
                .map_err(|e| DaemonError::PackageStorageError(format!("copying model {model_name}: {e}")))?;
        }
        Ok(())
    }
}

fn model_file_name(model_name: &str, kind: ModelKind) -> String {
    let ext = match kind {
        ModelKind::Onnx => "onnx",
    };
    format!("{model_name}.{ext}")
}

fn copy_tree(src: &Path, dest: &Path) -> Result<(), DaemonError> {
    for entry in std::fs::read_dir(src)
        .map_err(|e| DaemonError::PackageStorageError(format!("reading {}: {e}", src.display())))?
    {
        let entry = entry.map_err(|e| DaemonError::PackageStorageError(format!("reading entry: {e}")))?;
        let dest_path = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| DaemonError::PackageStorageError(format!("stat {}: {e}", entry.path().display())))?;
        if file_type.is_dir() {
            std::fs::create_dir_all(&dest_path)
                .map_err(|e| DaemonError::PackageStorageError(format!("creating {}: {e}", dest_path.display())))?;
            copy_tree(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path)
                .map_err(|e| DaemonError::PackageStorageError(format!("copying {}: {e}", entry.path().display())))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferd_core::package::ModelKind;
    use inferd_storage::Catalog;
    use std::io::Write;

    fn write_manifest(dir: &Path, version: Option<&str>) {
        std::fs::write(dir.join("handler.so"), b"fake-handler").expect("write handler");
        std::fs::write(dir.join("echo.onnx"), b"fake-model").expect("write model");
        let manifest = serde_json::json!({
            "name": "echo",
            "module": "handler.so",
            "model": { "echo": { "type": "onnx", "file": "echo.onnx" } },
            "version": version,
            "human_name": null,
        });
        let mut f = std::fs::File::create(dir.join("meta.json")).expect("create meta.json");
        f.write_all(manifest.to_string().as_bytes()).expect("write meta.json");
    }

    #[test]
    fn installs_from_staged_directory_without_activation() {
        let root = tempfile::tempdir().expect("root");
        let src = tempfile::tempdir().expect("src");
        write_manifest(src.path(), Some("1.0"));

        let layout = Layout::new(root.path());
        let catalog = Catalog::open(layout.catalog_path()).expect("open catalog");
        let loader = Loader::new();
        let registry = FunctionRegistry::new();
        let installer = Installer::new(layout.clone());

        let mut session = catalog.session();
        let outcome = installer
            .install(&mut session, &loader, &registry, src.path(), InstallOptions::default())
            .expect("install");
        session.commit().expect("commit");

        let row = outcome.row();
        assert_eq!(row.name, "echo");
        assert!(!row.active);
        assert!(!loader.is_loaded(row.package_id));
    }

    #[test]
    fn exist_ok_returns_sentinel_on_conflict() {
        let root = tempfile::tempdir().expect("root");
        let src = tempfile::tempdir().expect("src");
        write_manifest(src.path(), Some("1.0"));

        let layout = Layout::new(root.path());
        let catalog = Catalog::open(layout.catalog_path()).expect("open catalog");
        let loader = Loader::new();
        let registry = FunctionRegistry::new();
        let installer = Installer::new(layout.clone());

        let mut first = catalog.session();
        installer
            .install(&mut first, &loader, &registry, src.path(), InstallOptions::default())
            .expect("first install");
        first.commit().expect("commit first");

        let mut second = catalog.session();
        let outcome = installer
            .install(
                &mut second,
                &loader,
                &registry,
                src.path(),
                InstallOptions { exist_ok: true, activate: false },
            )
            .expect("second install tolerated");
        second.rollback();
        assert!(matches!(outcome, InstallOutcome::AlreadyExists(_)));
    }

    #[test]
    fn missing_model_file_aborts_before_any_copy() {
        let root = tempfile::tempdir().expect("root");
        let src = tempfile::tempdir().expect("src");
        let manifest = serde_json::json!({
            "name": "broken",
            "module": "handler.so",
            "model": { "echo": { "type": "onnx", "file": "missing.onnx" } },
            "version": null,
            "human_name": null,
        });
        std::fs::write(src.path().join("handler.so"), b"fake-handler").expect("write handler");
        std::fs::write(src.path().join("meta.json"), manifest.to_string()).expect("write meta.json");

        let layout = Layout::new(root.path());
        let catalog = Catalog::open(layout.catalog_path()).expect("open catalog");
        let loader = Loader::new();
        let registry = FunctionRegistry::new();
        let installer = Installer::new(layout);

        let mut session = catalog.session();
        let err = installer
            .install(&mut session, &loader, &registry, src.path(), InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, DaemonError::PackageInstallError(_)));
        session.rollback();
    }

    #[test]
    fn model_file_name_uses_model_name_and_kind_extension() {
        assert_eq!(model_file_name("echo", ModelKind::Onnx), "echo.onnx");
    }
}
