pub mod adapters;
pub mod archive;
pub mod artifact;
pub mod build;
pub mod forges;
pub mod index;
pub mod integrity;
pub mod io;
pub mod layout;
pub mod publish;
pub mod rules;
pub mod state;
pub mod sync;
pub mod version;

pub mod reporter;

pub use adapters::{AdapterContext, AdapterError, Adapters, Candidate, Resolution, SourceAdapter};
pub use build::{BuildStep, CommandRunner, ShellRunner};
pub use forges::{GitHubClient, UpstreamHost};
pub use index::IndexMaintainer;
pub use layout::{Layout, Pointer};
pub use publish::{PublishRequest, Publisher};
pub use reporter::{NullReporter, Reporter};
pub use state::SyncState;
pub use sync::{SyncError, SyncOptions, Syncer};

/// User Agent string for upstream requests
pub const USER_AGENT: &str = concat!("vcdn/", env!("CARGO_PKG_VERSION"));
