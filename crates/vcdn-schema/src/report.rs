use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one source in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// At least one target was published and none failed.
    #[serde(rename = "OK")]
    Ok,
    /// Nothing changed upstream.
    #[serde(rename = "SKIP")]
    Skip,
    /// The source or at least one of its targets failed.
    #[serde(rename = "FAIL")]
    Fail,
}

impl Status {
    /// Upper-case label used in the report and the summary table.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Skip => "SKIP",
            Self::Fail => "FAIL",
        }
    }
}

/// One row of the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    /// Package name (or `#<n>` for an entry without one).
    pub package: String,
    /// Source type as written in the document.
    #[serde(rename = "type")]
    pub kind: String,
    /// Upstream reference(s) examined, e.g. `x/y@v1.4.0`.
    pub upstream: String,
    /// What was attempted (`publish @latest`, `check`, ...).
    pub action: String,
    /// Final status.
    pub status: Status,
    /// One-line detail or hint.
    pub detail: String,
}

/// `_index/sync-report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
    /// Whether any publish happened.
    pub changed: bool,
    /// Whether the caller asked for strict failure handling.
    pub strict: bool,
    /// One row per source, in document order.
    pub rows: Vec<ReportRow>,
}

impl SyncReport {
    /// Number of rows with `status`.
    pub fn count(&self, status: Status) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }

    /// Whether any source failed.
    pub fn has_failures(&self) -> bool {
        self.count(Status::Fail) > 0
    }

    /// Process exit code: non-zero only for failures under strict mode.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.strict && self.has_failures())
    }
}
