use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;
use vcdn_schema::Target;

use crate::io::{self, JsonFileError};

/// Last published upstream identity per package and target.
///
/// Persisted as `_index/external-state.json`:
/// `{ "<package>": { "latest": "<identity>", "stable": ..., "beta": ... } }`.
/// Loaded once per run and saved once at the end. Losing this file is safe:
/// the next run republishes everything it resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState {
    packages: BTreeMap<String, BTreeMap<String, String>>,
}

impl SyncState {
    /// Load from `path`. A missing or unreadable file yields an empty state.
    pub fn load(path: &Path) -> Self {
        match io::read_json(path) {
            Ok(Some(state)) => state,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable sync state; every target will be republished");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), JsonFileError> {
        io::write_json_atomic(path, self)
    }

    pub fn prior_identity(&self, package: &str, target: Target) -> Option<&str> {
        self.packages
            .get(package)
            .and_then(|targets| targets.get(target.as_str()))
            .map(String::as_str)
    }

    pub fn record_identity(&mut self, package: &str, target: Target, identity: impl Into<String>) {
        self.packages
            .entry(package.to_string())
            .or_default()
            .insert(target.as_str().to_string(), identity.into());
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
