//! `versions.json` and `_index/index.json`.
//!
//! The global index is a denormalised view of each package's version index;
//! it is always recomputed from it, never edited independently.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Channel, Meta};

/// One published version as listed in `versions.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Version label with its leading `v`.
    pub version: String,
    /// Channel of the version, `null` when it has none.
    pub channel: Option<Channel>,
    /// When the version directory was written.
    pub built_at: DateTime<Utc>,
}

/// Per-package version list, newest `built_at` first, unique by version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionIndex {
    /// Entries in display order.
    pub entries: Vec<VersionEntry>,
}

impl VersionIndex {
    /// Insert `entry`, replacing any entry with the same version, and re-sort.
    ///
    /// The sort is stable and the new entry goes in front before sorting, so
    /// among equal `built_at` values the most recent upsert wins first place.
    pub fn upsert(&mut self, entry: VersionEntry) {
        self.entries.retain(|e| e.version != entry.version);
        self.entries.insert(0, entry);
        self.entries.sort_by(|a, b| b.built_at.cmp(&a.built_at));
    }

    /// Most recently built entry regardless of channel.
    pub fn latest(&self) -> Option<&VersionEntry> {
        self.entries.first()
    }

    /// Most recently built entry on `channel`.
    pub fn latest_on(&self, channel: Channel) -> Option<&VersionEntry> {
        self.entries.iter().find(|e| e.channel == Some(channel))
    }

    /// Look up an entry by version label.
    pub fn get(&self, version: &str) -> Option<&VersionEntry> {
        self.entries.iter().find(|e| e.version == version)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A package's row in the global index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageSummary {
    /// Most recently built stable version.
    pub last_stable: Option<VersionEntry>,
    /// Most recently built beta version.
    pub last_beta: Option<VersionEntry>,
    /// Most recently built version of any channel.
    pub last_latest: Option<VersionEntry>,
    /// Descriptive block, retained across publishes that don't provide one.
    pub meta: Option<Meta>,
}

/// `_index/index.json`: package name to summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalIndex {
    /// Summaries keyed by package name.
    pub packages: BTreeMap<String, PackageSummary>,
}

impl GlobalIndex {
    /// Recompute `package`'s summary from its version index.
    ///
    /// `meta` replaces the stored block only when it is `Some`.
    pub fn refresh(&mut self, package: &str, versions: &VersionIndex, meta: Option<Meta>) {
        let summary = self.packages.entry(package.to_string()).or_default();
        summary.last_stable = versions.latest_on(Channel::Stable).cloned();
        summary.last_beta = versions.latest_on(Channel::Beta).cloned();
        summary.last_latest = versions.latest().cloned();
        if meta.is_some() {
            summary.meta = meta;
        }
    }

    /// Summary for `package`.
    pub fn get(&self, package: &str) -> Option<&PackageSummary> {
        self.packages.get(package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(version: &str, channel: Option<Channel>, minute: u32) -> VersionEntry {
        VersionEntry {
            version: version.to_string(),
            channel,
            built_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_upsert_sorts_newest_first() {
        let mut idx = VersionIndex::default();
        idx.upsert(entry("v1.0.0", Some(Channel::Stable), 1));
        idx.upsert(entry("v2.0.0-beta.1", Some(Channel::Beta), 3));
        idx.upsert(entry("v1.1.0", Some(Channel::Stable), 2));

        let order: Vec<_> = idx.entries.iter().map(|e| e.version.as_str()).collect();
        assert_eq!(order, vec!["v2.0.0-beta.1", "v1.1.0", "v1.0.0"]);
    }

    #[test]
    fn test_upsert_replaces_same_version() {
        let mut idx = VersionIndex::default();
        idx.upsert(entry("v1.0.0", Some(Channel::Stable), 1));
        idx.upsert(entry("v1.1.0", Some(Channel::Stable), 2));
        idx.upsert(entry("v1.0.0", Some(Channel::Stable), 5));

        assert_eq!(idx.len(), 2);
        assert_eq!(idx.latest().unwrap().version, "v1.0.0");
    }

    #[test]
    fn test_upsert_tie_prefers_most_recent_insert() {
        let mut idx = VersionIndex::default();
        idx.upsert(entry("v1.0.0", Some(Channel::Stable), 1));
        idx.upsert(entry("v1.0.1", Some(Channel::Stable), 1));
        assert_eq!(idx.latest().unwrap().version, "v1.0.1");
    }

    #[test]
    fn test_refresh_summary() {
        let mut idx = VersionIndex::default();
        idx.upsert(entry("v1.0.0", Some(Channel::Stable), 1));
        idx.upsert(entry("v2.0.0-rc.1", Some(Channel::Beta), 2));

        let mut global = GlobalIndex::default();
        let mut meta = Meta::new();
        meta.insert("description".into(), "A lib".into());
        global.refresh("foo", &idx, Some(meta));
        global.refresh("foo", &idx, None);

        let s = global.get("foo").unwrap();
        assert_eq!(s.last_stable.as_ref().unwrap().version, "v1.0.0");
        assert_eq!(s.last_beta.as_ref().unwrap().version, "v2.0.0-rc.1");
        assert_eq!(s.last_latest.as_ref().unwrap().version, "v2.0.0-rc.1");
        assert_eq!(s.meta.as_ref().unwrap()["description"], "A lib");
    }

    #[test]
    fn test_versions_json_is_an_array() {
        let mut idx = VersionIndex::default();
        idx.upsert(entry("v1.0.0", None, 1));
        let json = serde_json::to_value(&idx).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["channel"], serde_json::Value::Null);
    }
}
