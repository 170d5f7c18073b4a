use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::GlobalIndex;
use crate::manifest::VersionManifest;

/// Every manifest plus the global index in one document, so the UI and the
/// analytics side can load the whole registry with a single fetch.
///
/// Always rebuilt from disk, never patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// When the bundle was generated.
    pub generated_at: Option<DateTime<Utc>>,
    /// Copy of `_index/index.json`.
    pub index: GlobalIndex,
    /// Package name to version label to manifest.
    pub packages: BTreeMap<String, BTreeMap<String, VersionManifest>>,
}

impl BundleManifest {
    /// Number of version manifests in the bundle.
    pub fn manifest_count(&self) -> usize {
        self.packages.values().map(BTreeMap::len).sum()
    }
}
