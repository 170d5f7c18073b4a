//! The source document (`sources.json`).
//!
//! ```json
//! {
//!   "sources": [
//!     { "package": "foo", "type": "release-asset", "repo": "x/y", "asset_regex": "\\.js$" }
//!   ]
//! }
//! ```
//!
//! Entries are parsed one at a time. A malformed entry becomes an
//! [`InvalidSource`] and fails only itself; the rest of the document still
//! loads.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Channel, Meta};

/// Default build step timeout (10 minutes).
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 600;

/// Default ref resolved by raw-file sources when none is configured.
pub const DEFAULT_REF: &str = "HEAD";

/// Errors raised while reading the source document or validating one entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document itself is not valid JSON or lacks a `sources` array.
    #[error("invalid source document: {0}")]
    Document(String),

    /// A single entry could not be deserialized (missing field, unknown type, ...).
    #[error("invalid source entry: {0}")]
    Entry(String),

    /// A required field is present but empty or unusable.
    #[error("field `{field}`: {reason}")]
    Field {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },
}

impl ConfigError {
    /// Shorthand for a [`ConfigError::Field`].
    pub fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Field {
            field,
            reason: reason.into(),
        }
    }
}

/// Upstream source kind. Dispatch on this is exhaustive; there is no
/// fallback variant, so an unrecognised `type` fails deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// The host's "latest release", assets selected by regex. Drives `@latest` only.
    ReleaseAsset,
    /// Full release listing; drives `@latest`, `@stable` and `@beta` independently.
    ReleaseAssetsSemver,
    /// Explicit file paths pinned to the commit a ref resolves to.
    RawFile,
}

impl SourceKind {
    /// Wire name as written in the source document.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReleaseAsset => "release-asset",
            Self::ReleaseAssetsSemver => "release-assets-semver",
            Self::RawFile => "raw-file",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects files by path and decides the name they are published under.
///
/// Used both for entries inside zip assets and for build outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRule {
    /// Glob matched against the entry's path relative to its root (`dist/*.js`).
    pub glob: String,
    /// Publish under this exact name instead of the derived one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,
    /// Keep the relative path instead of flattening to the basename.
    #[serde(default)]
    pub keep_path: bool,
}

/// Optional "build from source snapshot" step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Whether the step runs at all. Sources that don't opt in never build.
    pub enable: bool,
    /// Directory (relative to the snapshot's top-level directory) to run in.
    pub workdir: String,
    /// Upper bound for each of the install and run commands.
    pub timeout_secs: u64,
    /// Install command. When absent, chosen from lockfile presence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<String>,
    /// Build command. When absent the step performs install only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    /// Extra environment for both commands.
    pub env: BTreeMap<String, String>,
    /// Rules collecting output files from the working directory.
    pub outputs: Vec<FileRule>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            enable: false,
            workdir: ".".to_string(),
            timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            install: None,
            run: None,
            env: BTreeMap::new(),
            outputs: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One package's upstream source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Package name; becomes the top-level directory in the output tree.
    pub package: String,
    /// Which adapter handles this source.
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// Upstream repository in `owner/name` form.
    pub repo: String,
    /// Branch, tag or commit for raw-file sources.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Single file path (shorthand for `paths`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// File paths fetched from the repository at a fixed commit or tag.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    /// Regex selecting release assets by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_regex: Option<String>,
    /// Rules selecting entries inside zip assets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extract: Vec<FileRule>,
    /// Optional source-snapshot build step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
    /// Explicit channel override; takes precedence over version parsing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    /// Descriptive block copied into manifests and the global index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl SourceConfig {
    /// Ref to resolve for raw-file sources.
    pub fn git_ref(&self) -> &str {
        self.git_ref.as_deref().unwrap_or(DEFAULT_REF)
    }

    /// `path` and `paths` combined, in declaration order, without duplicates.
    pub fn file_paths(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for p in self.path.iter().chain(self.paths.iter()) {
            if !out.contains(&p.as_str()) {
                out.push(p.as_str());
            }
        }
        out
    }

    /// The build configuration when it is present and enabled.
    pub fn enabled_build(&self) -> Option<&BuildConfig> {
        self.build.as_ref().filter(|b| b.enable)
    }

    /// Structural validation that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Field`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_package_name(&self.package)?;

        let mut parts = self.repo.split('/');
        let valid_repo = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
        );
        if !valid_repo {
            return Err(ConfigError::field(
                "repo",
                format!("expected 'owner/name', got '{}'", self.repo),
            ));
        }

        if self.kind == SourceKind::RawFile && self.file_paths().is_empty() {
            return Err(ConfigError::field(
                "paths",
                "raw-file sources need at least one path",
            ));
        }

        for path in self.file_paths() {
            if path.is_empty() || path.starts_with('/') || path.split('/').any(|c| c == "..") {
                return Err(ConfigError::field(
                    "paths",
                    format!("'{path}' must be a relative path inside the repository"),
                ));
            }
        }

        if let Some(build) = self.enabled_build() {
            if build.outputs.is_empty() {
                return Err(ConfigError::field(
                    "build.outputs",
                    "an enabled build needs at least one output rule",
                ));
            }
            if build.timeout_secs == 0 {
                return Err(ConfigError::field("build.timeout_secs", "must be positive"));
            }
        }

        Ok(())
    }
}

/// Package names become directory names next to `_index/`, so they must be a
/// single safe path segment.
fn validate_package_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::field("package", "must not be empty"));
    }
    if name.contains('/') || name.contains('\\') || name.starts_with('.') || name.starts_with('_')
    {
        return Err(ConfigError::field(
            "package",
            format!("'{name}' is not a safe directory name"),
        ));
    }
    Ok(())
}

/// A document entry that failed to load. Reported as a failed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSource {
    /// Package name if one could be read, else `#<position>`.
    pub package: String,
    /// Raw `type` value if one could be read.
    pub kind: String,
    /// Why the entry was rejected.
    pub error: ConfigError,
}

#[derive(Deserialize)]
struct RawDocument {
    sources: Vec<serde_json::Value>,
}

/// Parse the source document.
///
/// The outer `Result` fails only when the document as a whole is unusable;
/// each inner `Result` is one entry, in document order.
///
/// # Errors
///
/// Returns [`ConfigError::Document`] if the text is not JSON or has no
/// `sources` array.
pub fn parse_sources(text: &str) -> Result<Vec<Result<SourceConfig, InvalidSource>>, ConfigError> {
    let doc: RawDocument =
        serde_json::from_str(text).map_err(|e| ConfigError::Document(e.to_string()))?;

    Ok(doc
        .sources
        .into_iter()
        .enumerate()
        .map(|(i, value)| parse_entry(i, value))
        .collect())
}

fn parse_entry(position: usize, value: serde_json::Value) -> Result<SourceConfig, InvalidSource> {
    let package = value
        .get("package")
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map_or_else(|| format!("#{}", position + 1), str::to_string);
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("?")
        .to_string();

    let source: SourceConfig = serde_json::from_value(value).map_err(|e| InvalidSource {
        package: package.clone(),
        kind: kind.clone(),
        error: ConfigError::Entry(e.to_string()),
    })?;

    source.validate().map_err(|error| InvalidSource {
        package,
        kind,
        error,
    })?;

    Ok(source)
}
