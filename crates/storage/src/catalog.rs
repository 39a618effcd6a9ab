// SPDX-License-Identifier: MIT

//! The catalog: two tables (packages, models), per-worker transactional
//! sessions, and the version-latest resolution policy.
//!
//! A rolled-back install must leave no catalog residue, but full
//! event-sourced replay would be overkill for that guarantee, so a session
//! buffers a full in-memory snapshot taken at session start and either
//! commits the live table back to it (writing `catalog.db`) or discards its
//! own changes by restoring the snapshot. Because the catalog is guarded by
//! one coarse mutex held for a session's whole lifetime, this is equivalent
//! to true per-worker isolation: only one worker's session is ever live at
//! a time.

use std::path::{Path, PathBuf};

use inferd_core::package::{ModelId, ModelKind, ModelRow, PackageId, PackageRow};
use inferd_core::DaemonError;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::version;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogInner {
    packages: Vec<PackageRow>,
    models: Vec<ModelRow>,
    next_package_id: PackageId,
    next_model_id: ModelId,
}

/// The package/model catalog. One instance per daemon process.
pub struct Catalog {
    inner: Mutex<CatalogInner>,
    path: PathBuf,
}

impl Catalog {
    /// Open (or create) the catalog persisted at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let path = path.into();
        let inner = if path.exists() {
            let bytes = std::fs::read(&path)
                .map_err(|e| DaemonError::DatabaseError(format!("reading catalog: {e}")))?;
            serde_json::from_slice(&bytes)
                .map_err(|e| DaemonError::DatabaseError(format!("parsing catalog: {e}")))?
        } else {
            CatalogInner::default()
        };
        Ok(Self { inner: Mutex::new(inner), path })
    }

    /// Begin a transactional session. Blocks until any other session
    /// completes — each worker, for the duration of one job, holds an
    /// exclusive session.
    pub fn session(&self) -> CatalogSession<'_> {
        let guard = self.inner.lock();
        let snapshot = guard.clone();
        CatalogSession { guard, snapshot, path: self.path.clone() }
    }

    pub fn list_packages(&self) -> Vec<PackageRow> {
        self.inner.lock().packages.clone()
    }
}

/// A per-worker transactional handle into the catalog. Reads see the
/// session's own writes immediately; `commit` persists them, `rollback`
/// discards them.
pub struct CatalogSession<'a> {
    guard: MutexGuard<'a, CatalogInner>,
    snapshot: CatalogInner,
    path: PathBuf,
}

impl CatalogSession<'_> {
    pub fn insert_package(
        &mut self,
        name: &str,
        version: Option<&str>,
        human_name: Option<&str>,
        install_path: &str,
    ) -> Result<PackageRow, DaemonError> {
        if self.guard.packages.iter().any(|p| p.name == name && p.version.as_deref() == version) {
            return Err(DaemonError::PackageAlreadyExists {
                name: name.to_string(),
                version: version.map(str::to_string),
            });
        }
        self.guard.next_package_id += 1;
        let row = PackageRow {
            package_id: self.guard.next_package_id,
            name: name.to_string(),
            version: version.map(str::to_string),
            human_name: human_name.map(str::to_string),
            active: false,
            install_path: install_path.to_string(),
        };
        self.guard.packages.push(row.clone());
        Ok(row)
    }

    pub fn insert_model(
        &mut self,
        package_id: PackageId,
        name: &str,
        kind: ModelKind,
        install_path: &str,
    ) -> Result<ModelRow, DaemonError> {
        if !self.guard.packages.iter().any(|p| p.package_id == package_id) {
            return Err(DaemonError::MissingEntry(format!("package {package_id}")));
        }
        if self.guard.models.iter().any(|m| m.package_id == package_id && m.name == name) {
            return Err(DaemonError::PackageAlreadyExists {
                name: name.to_string(),
                version: None,
            });
        }
        self.guard.next_model_id += 1;
        let row = ModelRow {
            model_id: self.guard.next_model_id,
            package_id,
            name: name.to_string(),
            kind,
            install_path: install_path.to_string(),
        };
        self.guard.models.push(row.clone());
        Ok(row)
    }

    pub fn package_by_name_version(&self, name: &str, version: Option<&str>) -> Option<PackageRow> {
        self.guard.packages.iter().find(|p| p.name == name && p.version.as_deref() == version).cloned()
    }

    /// Resolve the "latest" version of `name`: parse each candidate's
    /// version as dotted components, take the max, breaking ties by higher
    /// `package_id`. Packages with no version string sort below every
    /// versioned candidate.
    pub fn package_latest(&self, name: &str) -> Option<PackageRow> {
        self.guard
            .packages
            .iter()
            .filter(|p| p.name == name)
            .max_by(|a, b| {
                match (&a.version, &b.version) {
                    (Some(va), Some(vb)) => version::compare(va, vb),
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (None, None) => std::cmp::Ordering::Equal,
                }
                .then(a.package_id.cmp(&b.package_id))
            })
            .cloned()
    }

    pub fn package_active(&self, name: &str) -> Option<PackageRow> {
        self.guard.packages.iter().find(|p| p.name == name && p.active).cloned()
    }

    pub fn package_by_id(&self, package_id: PackageId) -> Option<PackageRow> {
        self.guard.packages.iter().find(|p| p.package_id == package_id).cloned()
    }

    /// Activate `package_id`, deactivating any other package sharing its
    /// `name` first — at most one active package per name.
    pub fn set_active(&mut self, package_id: PackageId, active: bool) -> Result<(), DaemonError> {
        let name = self
            .guard
            .packages
            .iter()
            .find(|p| p.package_id == package_id)
            .map(|p| p.name.clone())
            .ok_or_else(|| DaemonError::MissingEntry(format!("package {package_id}")))?;

        if active {
            for p in self.guard.packages.iter_mut().filter(|p| p.name == name) {
                p.active = p.package_id == package_id;
            }
        } else if let Some(p) = self.guard.packages.iter_mut().find(|p| p.package_id == package_id) {
            p.active = false;
        }
        Ok(())
    }

    pub fn model(&self, package_id: PackageId, model_name: &str) -> Result<ModelRow, DaemonError> {
        self.guard
            .models
            .iter()
            .find(|m| m.package_id == package_id && m.name == model_name)
            .cloned()
            .ok_or_else(|| DaemonError::MissingEntry(format!("model {model_name} of package {package_id}")))
    }

    /// Drop a package and all its models.
    /// Function-registry cleanup is the caller's responsibility (the
    /// registry lives in `inferd-engine`, which this crate doesn't depend
    /// on).
    pub fn remove_package(&mut self, package_id: PackageId) -> Result<(), DaemonError> {
        let before = self.guard.packages.len();
        self.guard.packages.retain(|p| p.package_id != package_id);
        if self.guard.packages.len() == before {
            return Err(DaemonError::MissingEntry(format!("package {package_id}")));
        }
        self.guard.models.retain(|m| m.package_id != package_id);
        Ok(())
    }

    pub fn list_packages(&self) -> Vec<PackageRow> {
        self.guard.packages.clone()
    }

    /// Persist the session's writes to disk. After this call the catalog's
    /// on-disk state matches the in-memory state.
    pub fn commit(self) -> Result<(), DaemonError> {
        write_catalog(&self.path, &self.guard)?;
        tracing::debug!(packages = self.guard.packages.len(), "catalog session committed");
        Ok(())
    }

    /// Discard the session's writes, restoring the catalog to the state it
    /// had when the session began.
    pub fn rollback(mut self) {
        *self.guard = self.snapshot.clone();
        tracing::debug!("catalog session rolled back");
    }
}

fn write_catalog(path: &Path, inner: &CatalogInner) -> Result<(), DaemonError> {
    let bytes = serde_json::to_vec_pretty(inner)
        .map_err(|e| DaemonError::DatabaseError(format!("serializing catalog: {e}")))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DaemonError::DatabaseError(format!("creating catalog dir: {e}")))?;
    }
    let tmp = path.with_extension("db.tmp");
    std::fs::write(&tmp, bytes).map_err(|e| DaemonError::DatabaseError(format!("writing catalog: {e}")))?;
    std::fs::rename(&tmp, path).map_err(|e| DaemonError::DatabaseError(format!("finalizing catalog: {e}")))?;
    Ok(())
}
