//! Shared types and on-disk wire format for vcdn.
//!
//! Everything in this crate is read by something outside the publishing
//! engine: the browser UI parses manifests and indexes directly, and the
//! source document is written by hand. Field names are part of the contract.

/// Aggregated bundle manifest (`_index/bundle-manifest.json`).
pub mod bundle;
/// Version index and global package index.
pub mod index;
/// Per-version manifest written next to the published files.
pub mod manifest;
/// Run report (`_index/sync-report.json`).
pub mod report;
/// Source configuration document.
pub mod source;
/// Channels, pointer targets and other small shared enums.
pub mod types;

pub use bundle::BundleManifest;
pub use index::{GlobalIndex, PackageSummary, VersionEntry, VersionIndex};
pub use manifest::{AssetSource, FileEntry, Provenance, VersionManifest};
pub use report::{ReportRow, Status, SyncReport};
pub use source::{BuildConfig, ConfigError, FileRule, InvalidSource, SourceConfig, SourceKind, parse_sources};
pub use types::{Channel, Meta, Target};

/// File name of the per-version manifest inside every version and pointer directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of the per-package version index.
pub const VERSIONS_FILE: &str = "versions.json";
