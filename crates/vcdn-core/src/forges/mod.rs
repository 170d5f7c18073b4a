//! Forge adapters for code hosting platforms.

/// GitHub REST API adapter.
pub mod github;
/// Shared traits and types for forge adapters.
pub mod traits;

pub use github::GitHubClient;
pub use traits::{Asset, ForgeError, Release, Tag, UpstreamHost};
