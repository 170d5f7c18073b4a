//! Run orchestration.
//!
//! Sources are processed one at a time. For each source the adapter resolves
//! its pointers; every pointer whose upstream identity changed is published,
//! grouping pointers that land on the same version into one publish. A
//! pointer's identity is recorded only after its publish succeeded, so a
//! failed target is retried on the next run.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use chrono::Utc;
use futures::FutureExt;
use thiserror::Error;
use tracing::{info, warn};
use vcdn_schema::{InvalidSource, ReportRow, SourceConfig, Status, SyncReport, Target};

use crate::adapters::{AdapterContext, AdapterError, Adapters, Candidate, SourceAdapter};
use crate::index::{IndexError, IndexMaintainer};
use crate::io::{self as fsio, JsonFileError};
use crate::layout::{Layout, version_label};
use crate::publish::{PublishError, PublishOutcome, PublishRequest, Publisher};
use crate::reporter::Reporter;
use crate::state::SyncState;

/// Longest panic message kept in a report row.
const PANIC_DETAIL_MAX: usize = 200;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("writing run report: {0}")]
    Report(JsonFileError),

    #[error("saving sync state: {0}")]
    State(JsonFileError),

    #[error("rebuilding bundle manifest: {0}")]
    Bundle(#[from] IndexError),

    #[error("copying UI assets from {path}: {source}")]
    Ui {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
enum PublishStepError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Static UI directory copied verbatim into the output root.
    pub ui_dir: Option<PathBuf>,
    /// Restrict the run to these packages. Empty means all.
    pub only: Vec<String>,
    pub strict: bool,
}

pub struct Syncer<R: Reporter> {
    layout: Layout,
    adapters: Adapters,
    publisher: Publisher,
    index: IndexMaintainer,
    options: SyncOptions,
    reporter: R,
}

impl<R: Reporter> std::fmt::Debug for Syncer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Syncer")
            .field("layout", &self.layout)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Per-source accumulator for the report row.
#[derive(Default)]
struct SourceRun {
    refs: Vec<String>,
    published: Vec<String>,
    failures: Vec<String>,
    notes: Vec<String>,
}

impl SourceRun {
    fn add_ref(&mut self, upstream_ref: &str) {
        if !self.refs.iter().any(|r| r == upstream_ref) {
            self.refs.push(upstream_ref.to_string());
        }
    }

    fn into_row(self, source: &SourceConfig) -> ReportRow {
        let status = if !self.failures.is_empty() {
            Status::Fail
        } else if !self.published.is_empty() {
            Status::Ok
        } else {
            Status::Skip
        };
        let upstream = if self.refs.is_empty() {
            source.repo.clone()
        } else {
            format!("{}@{}", source.repo, self.refs.join(","))
        };
        let action = if self.published.is_empty() {
            "check".to_string()
        } else {
            format!("publish {}", self.published.join("; "))
        };
        let detail = if !self.failures.is_empty() {
            self.failures.join("; ")
        } else if !self.notes.is_empty() {
            self.notes.join("; ")
        } else if self.published.is_empty() {
            "up to date".to_string()
        } else {
            String::new()
        };
        ReportRow {
            package: source.package.clone(),
            kind: source.kind.as_str().to_string(),
            upstream,
            action,
            status,
            detail,
        }
    }
}

fn pointer_list(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| c.target.dir_name())
        .collect::<Vec<_>>()
        .join(",")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    let truncated: String = msg.chars().take(PANIC_DETAIL_MAX).collect();
    format!("panic: {truncated}")
}

impl<R: Reporter> Syncer<R> {
    pub fn new(layout: Layout, ctx: &AdapterContext, options: SyncOptions, reporter: R) -> Self {
        Self {
            adapters: Adapters::new(ctx),
            publisher: Publisher::new(layout.clone()),
            index: IndexMaintainer::new(layout.clone()),
            layout,
            options,
            reporter,
        }
    }

    fn selected(&self, package: &str) -> bool {
        self.options.only.is_empty() || self.options.only.iter().any(|p| p == package)
    }

    /// Process every source, then refresh the derived files.
    ///
    /// Individual source failures end up in the report; only failing to
    /// write the output tree itself is an error.
    pub async fn run(
        &self,
        sources: Vec<Result<SourceConfig, InvalidSource>>,
        state: &mut SyncState,
    ) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        let mut rows = Vec::new();
        let mut changed = false;

        for entry in sources {
            let row = match entry {
                Ok(source) => {
                    if !self.selected(&source.package) {
                        continue;
                    }
                    self.reporter
                        .source_started(&source.package, source.kind.as_str());
                    let outcome = AssertUnwindSafe(self.sync_source(&source, state))
                        .catch_unwind()
                        .await;
                    match outcome {
                        Ok(run) => {
                            changed |= !run.published.is_empty();
                            run.into_row(&source)
                        }
                        Err(payload) => {
                            let detail = panic_message(payload.as_ref());
                            warn!(package = %source.package, %detail, "source panicked");
                            SourceRun {
                                failures: vec![detail],
                                ..SourceRun::default()
                            }
                            .into_row(&source)
                        }
                    }
                }
                Err(invalid) => {
                    if !self.selected(&invalid.package) {
                        continue;
                    }
                    self.reporter.source_started(&invalid.package, &invalid.kind);
                    warn!(package = %invalid.package, error = %invalid.error, "invalid source");
                    ReportRow {
                        package: invalid.package,
                        kind: invalid.kind,
                        upstream: String::new(),
                        action: "load".to_string(),
                        status: Status::Fail,
                        detail: invalid.error.to_string(),
                    }
                }
            };

            if row.status == Status::Fail {
                self.reporter
                    .warning(&format!("{}: {}", row.package, row.detail));
            }
            self.reporter.source_finished(&row);
            rows.push(row);
        }

        let finalized = if changed {
            self.finalize(state)
        } else {
            Ok(())
        };

        let report = SyncReport {
            started_at,
            finished_at: Utc::now(),
            changed,
            strict: self.options.strict,
            rows,
        };
        fsio::write_json_atomic(&self.layout.report_json(), &report).map_err(SyncError::Report)?;
        finalized?;

        info!(
            ok = report.count(Status::Ok),
            skipped = report.count(Status::Skip),
            failed = report.count(Status::Fail),
            changed,
            "sync finished"
        );
        Ok(report)
    }

    fn finalize(&self, state: &SyncState) -> Result<(), SyncError> {
        if let Some(ui) = &self.options.ui_dir {
            fsio::copy_dir_all(ui, self.layout.root()).map_err(|source| SyncError::Ui {
                path: ui.clone(),
                source,
            })?;
        }
        state
            .save(&self.layout.state_json())
            .map_err(SyncError::State)?;
        let bundle = self.index.rebuild_bundle()?;
        self.reporter.info(&format!(
            "bundle manifest: {} versions across {} packages",
            bundle.manifest_count(),
            bundle.packages.len()
        ));
        Ok(())
    }

    async fn sync_source(&self, source: &SourceConfig, state: &mut SyncState) -> SourceRun {
        let mut run = SourceRun::default();
        let adapter = self.adapters.for_kind(source.kind);

        let resolution = match adapter.resolve(source, state).await {
            Ok(resolution) => resolution,
            Err(e) => {
                run.failures.push(e.to_string());
                return run;
            }
        };
        for note in &resolution.notes {
            self.reporter.info(&format!("{}: {note}", source.package));
        }
        run.notes = resolution.notes;

        // Pointers landing on the same upstream release share one publish.
        let mut groups: Vec<Vec<Candidate>> = Vec::new();
        for target in resolution.targets {
            match target {
                Err(failure) => run
                    .failures
                    .push(format!("{}: {}", failure.target.dir_name(), failure.error)),
                Ok(candidate) => {
                    run.add_ref(&candidate.upstream_ref);
                    if !candidate.needs_work {
                        continue;
                    }
                    match groups.iter_mut().find(|g| {
                        g[0].version_id == candidate.version_id && g[0].identity == candidate.identity
                    }) {
                        Some(group) => group.push(candidate),
                        None => groups.push(vec![candidate]),
                    }
                }
            }
        }

        for group in groups {
            let label = format!("{} {}", pointer_list(&group), version_label(&group[0].version_id));
            match self.publish_group(adapter, source, &group).await {
                Ok(_) => {
                    for candidate in &group {
                        state.record_identity(&source.package, candidate.target, &candidate.identity);
                    }
                    run.published.push(label);
                }
                Err(e) => {
                    warn!(package = %source.package, %label, error = %e, "publish failed");
                    run.failures.push(format!("{label}: {e}"));
                }
            }
        }
        run
    }

    async fn publish_group(
        &self,
        adapter: &dyn SourceAdapter,
        source: &SourceConfig,
        group: &[Candidate],
    ) -> Result<PublishOutcome, PublishStepError> {
        let lead = &group[0];
        let reusable = self
            .publisher
            .existing_manifest(&source.package, &lead.version_id)?
            .is_some_and(|m| m.upstream == lead.provenance);

        let files = if reusable {
            Vec::new()
        } else {
            adapter.materialize(source, lead).await?.into_files()
        };

        let outcome = self.publisher.publish(PublishRequest {
            package: source.package.clone(),
            version_id: lead.version_id.clone(),
            channel: lead.channel,
            files,
            provenance: lead.provenance.clone(),
            meta: source.meta.clone(),
            built_at: Utc::now(),
            pointers: group.iter().map(|c| c.target).collect::<Vec<Target>>(),
        })?;

        let manifest = &outcome.manifest;
        self.index.record_publish(
            &source.package,
            &manifest.version,
            manifest.channel,
            manifest.built_at,
            source.meta.clone(),
        )?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceConfig {
        serde_json::from_value(serde_json::json!({
            "package": "foo", "type": "release-assets-semver", "repo": "x/y"
        }))
        .unwrap()
    }

    #[test]
    fn test_row_status_aggregation() {
        let skip = SourceRun::default().into_row(&source());
        assert_eq!(skip.status, Status::Skip);
        assert_eq!(skip.detail, "up to date");

        let ok = SourceRun {
            published: vec!["@latest v1.4.0".into()],
            refs: vec!["v1.4.0".into()],
            ..SourceRun::default()
        }
        .into_row(&source());
        assert_eq!(ok.status, Status::Ok);
        assert_eq!(ok.upstream, "x/y@v1.4.0");
        assert_eq!(ok.action, "publish @latest v1.4.0");

        let partial = SourceRun {
            published: vec!["@latest v1.4.0".into()],
            failures: vec!["@beta: boom".into()],
            ..SourceRun::default()
        }
        .into_row(&source());
        assert_eq!(partial.status, Status::Fail);
        assert_eq!(partial.detail, "@beta: boom");
    }

    #[test]
    fn test_panic_message_truncated() {
        let long = "x".repeat(500);
        let payload: Box<dyn std::any::Any + Send> = Box::new(long);
        let msg = panic_message(payload.as_ref());
        assert_eq!(msg.len(), "panic: ".len() + PANIC_DETAIL_MAX);

        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "panic: static");
    }
}
