use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("rate limited by upstream at {url} (set GITHUB_TOKEN for a higher limit)")]
    RateLimited { url: String },

    #[error("not found: {0}")]
    NotFound(String),
}

/// A release as listed by the host. Drafts never leave the adapter.
///
/// The host's own prerelease flag is not read: channels come from the
/// semver pre-release part of the tag.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// An asset attached to a release
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
    pub commit: TagCommit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagCommit {
    pub sha: String,
}

/// Read-only view of an upstream source-control host.
///
/// Every method is a plain request; retries and caching are the caller's
/// business. `repo` is always `owner/name`.
#[async_trait]
pub trait UpstreamHost: Send + Sync {
    /// Short host identifier recorded in provenance and identities (`github`).
    fn name(&self) -> &str;

    /// The host's own notion of "latest release". `None` when there is none.
    async fn latest_release(&self, repo: &str) -> Result<Option<Release>, ForgeError>;

    /// All non-draft releases, newest first.
    async fn list_releases(&self, repo: &str) -> Result<Vec<Release>, ForgeError>;

    /// Tags, in host order.
    async fn list_tags(&self, repo: &str) -> Result<Vec<Tag>, ForgeError>;

    /// Resolve a branch, tag or sha to a full commit sha.
    async fn resolve_ref(&self, repo: &str, git_ref: &str) -> Result<String, ForgeError>;

    /// Download an asset by URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>, ForgeError>;

    /// Contents of `path` at exactly `rev` (a commit sha or tag).
    async fn raw_file(&self, repo: &str, rev: &str, path: &str) -> Result<Vec<u8>, ForgeError>;

    /// Gzipped tarball of the repository at `rev`.
    async fn snapshot(&self, repo: &str, rev: &str) -> Result<Vec<u8>, ForgeError>;
}
