// SPDX-License-Identifier: MIT

//! Catalog row types: the two tables the catalog persists, per spec §3.
//! These are plain data — the catalog module owns lookup, uniqueness, and
//! transactional semantics; this module only defines the shapes.

use serde::{Deserialize, Serialize};

pub type PackageId = u64;
pub type ModelId = u64;

/// `ModelKind` — the set of supported model file types. Only `onnx` exists
/// today; the type exists so the manifest schema has somewhere to grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Onnx,
}

/// A package catalog row. `(name, version)` is unique; at most one row per
/// `name` may have `active = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRow {
    pub package_id: PackageId,
    pub name: String,
    pub version: Option<String>,
    pub human_name: Option<String>,
    pub active: bool,
    pub install_path: String,
}

/// A model catalog row, owned by its parent package. `(package_id, name)` is
/// unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRow {
    pub model_id: ModelId,
    pub package_id: PackageId,
    pub name: String,
    pub kind: ModelKind,
    pub install_path: String,
}

#[cfg(test)]
#[path = "package_tests.rs"]
mod tests;
