//! Upstream source adapters.
//!
//! Each [`SourceKind`] has one adapter. An adapter first *resolves* a source
//! into candidates (one per pointer it drives), comparing each candidate's
//! upstream identity with the last one recorded, and later *materializes*
//! the candidates that need work into an [`ArtifactSet`].

pub mod raw_file;
pub mod release_asset;
pub mod release_semver;

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use vcdn_schema::{AssetSource, Channel, Provenance, SourceConfig, SourceKind, Target};

use crate::archive::{self, ArchiveError};
use crate::artifact::{ArtifactSet, DuplicateName};
use crate::build::{BuildError, BuildStep};
use crate::forges::{ForgeError, Release, UpstreamHost};
use crate::layout::is_safe_version_id;
use crate::rules::{self, RuleError};
use crate::state::SyncState;
use crate::version::{channel_of, strip_tag_prefix};

pub use raw_file::RawFileAdapter;
pub use release_asset::ReleaseAssetAdapter;
pub use release_semver::ReleaseSemverAdapter;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("configuration: {0}")]
    Config(String),

    #[error("upstream: {0}")]
    Upstream(#[from] ForgeError),

    #[error("unresolved: {0}")]
    Unresolved(String),

    #[error("{what}; available: {}", fmt_available(.available))]
    NoMatch { what: String, available: Vec<String> },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("build task aborted: {0}")]
    Join(String),
}

impl From<DuplicateName> for AdapterError {
    fn from(e: DuplicateName) -> Self {
        Self::Rules(RuleError::Duplicate(e))
    }
}

fn fmt_available(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

/// Where a candidate's files come from.
#[derive(Debug, Clone)]
pub enum Origin {
    /// A release (assets, or a build/raw fetch at its tag).
    Release(Box<Release>),
    /// A bare tag, used when the repository has no releases.
    Tag { tag: String, commit: String },
    /// A commit a ref resolved to.
    Commit { sha: String },
}

/// One pointer's resolution.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub target: Target,
    /// Tag or commit, for reports.
    pub upstream_ref: String,
    pub version_id: String,
    pub channel: Option<Channel>,
    pub identity: String,
    /// The identity differs from the one last recorded for this pointer.
    pub needs_work: bool,
    pub origin: Origin,
    pub provenance: Provenance,
}

/// A pointer that could not be resolved.
#[derive(Debug)]
pub struct TargetFailure {
    pub target: Target,
    pub error: AdapterError,
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub targets: Vec<Result<Candidate, TargetFailure>>,
    /// Informational remarks (e.g. no prerelease published yet).
    pub notes: Vec<String>,
}

impl Resolution {
    fn fail(&mut self, target: Target, error: AdapterError) {
        self.targets.push(Err(TargetFailure { target, error }));
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Resolve `source` into per-pointer candidates.
    ///
    /// An `Err` means the whole source failed (bad configuration, listing
    /// failed); per-pointer problems are reported inside the resolution.
    async fn resolve(
        &self,
        source: &SourceConfig,
        state: &SyncState,
    ) -> Result<Resolution, AdapterError>;

    /// Fetch (and build, when configured) the files for `candidate`.
    async fn materialize(
        &self,
        source: &SourceConfig,
        candidate: &Candidate,
    ) -> Result<ArtifactSet, AdapterError>;
}

/// Shared collaborators of every adapter.
#[derive(Clone)]
pub struct AdapterContext {
    pub host: Arc<dyn UpstreamHost>,
    pub builder: BuildStep,
}

impl std::fmt::Debug for AdapterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterContext")
            .field("host", &self.host.name())
            .finish_non_exhaustive()
    }
}

/// One adapter per source kind.
#[derive(Debug)]
pub struct Adapters {
    release_asset: ReleaseAssetAdapter,
    release_semver: ReleaseSemverAdapter,
    raw_file: RawFileAdapter,
}

impl Adapters {
    pub fn new(ctx: &AdapterContext) -> Self {
        Self {
            release_asset: ReleaseAssetAdapter::new(ctx.clone()),
            release_semver: ReleaseSemverAdapter::new(ctx.clone()),
            raw_file: RawFileAdapter::new(ctx.clone()),
        }
    }

    pub fn for_kind(&self, kind: SourceKind) -> &dyn SourceAdapter {
        match kind {
            SourceKind::ReleaseAsset => &self.release_asset,
            SourceKind::ReleaseAssetsSemver => &self.release_semver,
            SourceKind::RawFile => &self.raw_file,
        }
    }
}

/// Explicit override, else implied by the version id.
pub fn channel_for(source: &SourceConfig, version_id: &str) -> Channel {
    source.channel.unwrap_or_else(|| channel_of(version_id))
}

/// Version id for an upstream tag or commit, which must name a single
/// directory.
pub(crate) fn version_id_of(upstream_ref: &str) -> Result<String, AdapterError> {
    let version_id = strip_tag_prefix(upstream_ref);
    if is_safe_version_id(version_id) {
        return Ok(version_id.to_string());
    }
    Err(AdapterError::Unresolved(format!(
        "'{upstream_ref}' cannot be used as a version directory name; \
         tags must be a single path segment such as v1.2.3"
    )))
}

pub(crate) fn release_identity(host: &str, repo: &str, release: &Release) -> String {
    format!(
        "{host}:{repo}@{}#{}",
        release.tag_name,
        release.published_at.as_deref().unwrap_or_default()
    )
}

pub(crate) fn release_provenance(
    host: &str,
    source: &SourceConfig,
    release: &Release,
    asset_source: AssetSource,
) -> Provenance {
    Provenance {
        host: host.to_string(),
        kind: source.kind,
        repo: source.repo.clone(),
        tag: Some(release.tag_name.clone()),
        git_ref: None,
        commit: None,
        release_url: release.html_url.clone(),
        published_at: release.published_at.clone(),
        asset_source,
    }
}

pub(crate) fn needs_work(state: &SyncState, package: &str, target: Target, identity: &str) -> bool {
    state.prior_identity(package, target) != Some(identity)
}

pub(crate) fn compile_asset_regex(source: &SourceConfig) -> Result<Option<Regex>, AdapterError> {
    source
        .asset_regex
        .as_deref()
        .map(|re| {
            Regex::new(re).map_err(|e| AdapterError::Config(format!("asset_regex: {e}")))
        })
        .transpose()
}

/// Whether any asset of `release` matches `regex`.
pub(crate) fn has_matching_asset(release: &Release, regex: Option<&Regex>) -> bool {
    regex.is_some_and(|re| release.assets.iter().any(|a| re.is_match(&a.name)))
}

/// Download every asset matching `regex`, expanding zips through the
/// source's `extract` rules when there are any.
pub(crate) async fn fetch_release_assets(
    host: &dyn UpstreamHost,
    source: &SourceConfig,
    release: &Release,
    regex: &Regex,
) -> Result<ArtifactSet, AdapterError> {
    let extract = rules::compile(&source.extract)?;
    let matching: Vec<_> = release
        .assets
        .iter()
        .filter(|a| regex.is_match(&a.name))
        .collect();
    if matching.is_empty() {
        return Err(AdapterError::NoMatch {
            what: format!("no asset of {} matches /{regex}/", release.tag_name),
            available: release.assets.iter().map(|a| a.name.clone()).collect(),
        });
    }

    let mut set = ArtifactSet::new();
    for asset in matching {
        debug!(asset = %asset.name, "downloading release asset");
        let bytes = host.download(&asset.browser_download_url).await?;

        if !extract.is_empty() && archive::is_zip(&asset.name, &bytes) {
            let entries = archive::zip_entries(&bytes)?;
            let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
            let selected = rules::select_entries(&extract, entries)?;
            if selected.is_empty() {
                return Err(AdapterError::NoMatch {
                    what: format!("no entry of {} matches the extract rules", asset.name),
                    available: names,
                });
            }
            set.extend(selected)?;
        } else {
            set.push(asset.name.clone(), bytes)?;
        }
    }
    Ok(set)
}

/// Build the repository at `rev` with the source's enabled build config.
pub(crate) async fn build_at(
    ctx: &AdapterContext,
    source: &SourceConfig,
    rev: &str,
) -> Result<ArtifactSet, AdapterError> {
    let Some(config) = source.enabled_build().cloned() else {
        return Err(AdapterError::Config("build is not enabled".into()));
    };
    let snapshot = ctx.host.snapshot(&source.repo, rev).await?;
    let builder = ctx.builder.clone();
    let set = tokio::task::spawn_blocking(move || builder.run(&snapshot, &config))
        .await
        .map_err(|e| AdapterError::Join(e.to_string()))??;
    Ok(set)
}

/// Fetch the configured paths at exactly `rev`, flattened to file names.
pub(crate) async fn fetch_raw_paths(
    host: &dyn UpstreamHost,
    source: &SourceConfig,
    rev: &str,
) -> Result<ArtifactSet, AdapterError> {
    let mut set = ArtifactSet::new();
    for path in source.file_paths() {
        let bytes = host.raw_file(&source.repo, rev, path).await?;
        let name = path.rsplit('/').next().unwrap_or(path);
        set.push(name, bytes)?;
    }
    Ok(set)
}
