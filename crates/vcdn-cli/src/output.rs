//! Terminal output: progress lines on stderr, summary table on stdout.

use std::io::Write;

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, ContentArrangement, Table};
use vcdn_core::Reporter;
use vcdn_schema::{ReportRow, Status, SyncReport};

/// Longest detail shown in the table; the report file has the full text.
const DETAIL_WIDTH: usize = 80;

/// Progress lines for interactive runs, one per source plus notes.
#[derive(Debug, Default)]
pub struct TerminalReporter;

fn line(msg: &str) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "{msg}");
}

impl Reporter for TerminalReporter {
    fn source_started(&self, package: &str, kind: &str) {
        line(&format!("==> {package} ({kind})"));
    }

    fn source_finished(&self, row: &ReportRow) {
        line(&format!("    {:<4} {}", row.status.as_str(), row.action));
    }

    fn info(&self, msg: &str) {
        line(&format!("    {msg}"));
    }

    fn warning(&self, msg: &str) {
        line(&format!("    warning: {msg}"));
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// One row per source, in run order.
pub fn summary_table(report: &SyncReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Package", "Type", "Upstream", "Action", "Status", "Detail"]);

    for row in &report.rows {
        table.add_row(vec![
            Cell::new(&row.package),
            Cell::new(&row.kind),
            Cell::new(&row.upstream),
            Cell::new(&row.action),
            Cell::new(row.status.as_str()),
            Cell::new(truncate(&row.detail, DETAIL_WIDTH)),
        ]);
    }
    table
}

/// `3 ok, 1 skipped, 0 failed`
pub fn totals_line(report: &SyncReport) -> String {
    format!(
        "{} ok, {} skipped, {} failed",
        report.count(Status::Ok),
        report.count(Status::Skip),
        report.count(Status::Fail)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcdn_schema::SyncReport;

    fn report() -> SyncReport {
        serde_json::from_value(serde_json::json!({
            "started_at": "2024-05-01T00:00:00Z",
            "finished_at": "2024-05-01T00:00:05Z",
            "changed": true,
            "strict": false,
            "rows": [
                {"package": "foo", "type": "release-assets-semver", "upstream": "x/y@v1.4.0",
                 "action": "publish @latest,@stable v1.4.0", "status": "OK", "detail": ""},
                {"package": "bar", "type": "raw-file", "upstream": "x/z",
                 "action": "check", "status": "FAIL", "detail": "x".repeat(200)}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_summary_table_lists_every_row() {
        let rendered = summary_table(&report()).to_string();
        assert!(rendered.contains("foo"));
        assert!(rendered.contains("publish @latest,@stable v1.4.0"));
        assert!(rendered.contains("FAIL"));
        assert!(!rendered.contains(&"x".repeat(DETAIL_WIDTH + 1)));
    }

    #[test]
    fn test_totals_line() {
        assert_eq!(totals_line(&report()), "1 ok, 0 skipped, 1 failed");
    }

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
