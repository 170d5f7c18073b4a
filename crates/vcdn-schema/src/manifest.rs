use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::SourceKind;
use crate::types::{Channel, Meta};

/// Integrity and size of one published file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Sub-resource-Integrity string, always `sha384-<base64>`.
    pub integrity: String,
    /// Length of the file in bytes.
    pub bytes: u64,
}

/// How the published files were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetSource {
    /// Downloaded release assets (possibly extracted from a zip).
    ReleaseAssets,
    /// Built from the repository snapshot archive.
    SourceBuild,
    /// Fetched file-by-file from the repository at a fixed commit or tag.
    RawFiles,
}

/// Upstream origin of a published version.
///
/// Two publishes with equal provenance produce the same version directory,
/// which is what lets the publisher leave an existing one untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Upstream host (`github`).
    pub host: String,
    /// Source kind that produced the version.
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// `owner/name` of the upstream repository.
    pub repo: String,
    /// Release tag or tag name, when the version came from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// The moving ref that was resolved (raw-file sources).
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Commit SHA the files were taken from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Human-facing release page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_url: Option<String>,
    /// Release publication timestamp as reported by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    /// How the files were obtained.
    pub asset_source: AssetSource,
}

/// `manifest.json` of a version (and of every pointer mirroring it).
///
/// Readers must treat this file as the commit point: it is always written
/// after the files it lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionManifest {
    /// Package name.
    pub package: String,
    /// Version label with its leading `v` (`v1.4.0`).
    pub version: String,
    /// Release channel, `null` for channel-less snapshots.
    pub channel: Option<Channel>,
    /// When this version directory was written.
    pub built_at: DateTime<Utc>,
    /// Where the files came from.
    pub upstream: Provenance,
    /// Descriptive block from the source configuration.
    pub meta: Option<Meta>,
    /// Published files keyed by their path relative to the version directory.
    pub files: BTreeMap<String, FileEntry>,
}
