//! The one thing the binary does: run a sync from command-line options.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;
use vcdn_core::{
    AdapterContext, BuildStep, GitHubClient, Layout, Reporter, SyncOptions, SyncState, Syncer,
};
use vcdn_schema::{SyncReport, parse_sources};

use crate::Cli;

/// Load the source document, run every source and write the derived files.
///
/// Errors returned here are fatal: the document could not be read or the
/// output tree could not be written. Per-source failures are in the report.
pub async fn sync(cli: &Cli, reporter: impl Reporter) -> Result<SyncReport> {
    let text = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading source document {}", cli.config.display()))?;
    let sources = parse_sources(&text)
        .with_context(|| format!("parsing source document {}", cli.config.display()))?;
    debug!(entries = sources.len(), config = %cli.config.display(), "source document loaded");

    std::fs::create_dir_all(&cli.out)
        .with_context(|| format!("creating output root {}", cli.out.display()))?;
    let layout = Layout::new(&cli.out);

    let client = GitHubClient::new(cli.token.as_deref())
        .context("building HTTP client")?
        .with_bases(cli.api_base.as_deref(), cli.raw_base.as_deref());
    let ctx = AdapterContext {
        host: Arc::new(client),
        builder: BuildStep::default(),
    };

    let options = SyncOptions {
        ui_dir: cli.ui_dir.clone(),
        only: cli.only.clone(),
        strict: cli.strict,
    };

    let mut state = SyncState::load(&layout.state_json());
    let syncer = Syncer::new(layout, &ctx, options, reporter);
    let report = syncer.run(sources, &mut state).await?;
    Ok(report)
}
