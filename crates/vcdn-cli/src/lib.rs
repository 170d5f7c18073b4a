//! vcdn - versioned static CDN publisher
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Mirrors front-end packages from their upstream repositories into a static
//! directory tree that any file host can serve.
//!
//! # Output Layout
//!
//! ```text
//! dist/
//! ├── <package>/
//! │   ├── v1.4.0/              # immutable, one per upstream version
//! │   ├── @latest/ @stable/ @beta/
//! │   ├── v1/ v1.4/            # stable aliases
//! │   └── versions.json
//! └── _index/
//!     ├── index.json
//!     ├── bundle-manifest.json
//!     ├── external-state.json
//!     └── sync-report.json
//! ```

pub mod output;
pub mod sync;

use clap::Parser;
use std::path::PathBuf;

/// Exit code for failures that stop the run before any source is processed.
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "vcdn")]
#[command(author, version, about = "vcdn - publish versioned packages as a static CDN tree")]
pub struct Cli {
    /// Source document listing the packages to mirror
    #[arg(long, env = "VCDN_CONFIG", default_value = "sources.json")]
    pub config: PathBuf,

    /// Output root of the published tree
    #[arg(long, env = "VCDN_OUT", default_value = "dist")]
    pub out: PathBuf,

    /// Static UI directory copied into the output root after a change
    #[arg(long)]
    pub ui_dir: Option<PathBuf>,

    /// Only process these packages
    #[arg(long, num_args = 1..)]
    pub only: Vec<String>,

    /// Exit non-zero when any source failed
    #[arg(long)]
    pub strict: bool,

    /// Token for the GitHub API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Override the GitHub API base URL
    #[arg(long, hide = true)]
    pub api_base: Option<String>,

    /// Override the raw file host base URL
    #[arg(long, hide = true)]
    pub raw_base: Option<String>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long)]
    pub verbose: bool,
}
