// SPDX-License-Identifier: MIT

//! The package manifest (`meta.json`) bundled in every archive: required
//! `name`, `module`, `model`; optional `version`, `human_name`; unknown
//! keys rejected outright.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::package::ModelKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelEntry {
    #[serde(rename = "type")]
    pub kind: ModelKind,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub name: String,
    pub module: String,
    pub model: HashMap<String, ModelEntry>,
    pub version: Option<String>,
    pub human_name: Option<String>,
}

impl Manifest {
    /// A manifest's own structural requirements beyond what serde already
    /// enforces: non-empty name and at least the `module` file named.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("manifest `name` must not be empty".into());
        }
        if self.module.trim().is_empty() {
            return Err("manifest `module` must not be empty".into());
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
