//! Reporter trait for progress output
//!
//! Lets the sync engine report per-source progress without knowing whether
//! the caller draws a terminal table, writes logs, or discards it all.

use vcdn_schema::ReportRow;

pub trait Reporter: Send + Sync {
    /// A source is about to be processed.
    fn source_started(&self, package: &str, kind: &str);

    /// A source finished with its report row.
    fn source_finished(&self, row: &ReportRow);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn source_started(&self, package: &str, kind: &str) {
        (**self).source_started(package, kind);
    }
    fn source_finished(&self, row: &ReportRow) {
        (**self).source_finished(row);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// Discards everything. Used by tests and quiet callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn source_started(&self, _: &str, _: &str) {}
    fn source_finished(&self, _: &ReportRow) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
}
