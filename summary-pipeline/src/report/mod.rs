//! Report emission: filter audit artifact and duplicate-code comment.
//!
//! Pure serialization over two inputs: the pipeline's own [`FilterReport`]
//! and the JSON report produced by the external duplicate-code detector.
//! The detector JSON is reshaped into a Markdown table the comment-posting
//! collaborator publishes as-is.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::errors::{ReportError, RunResult};
use crate::filter::FilterReport;

/// Writes the filter audit artifact: `{"passed": [...], "blocked": [...]}`.
pub fn write_filter_report(report: &FilterReport, path: &Path) -> RunResult<()> {
    let json = serde_json::to_string_pretty(report).map_err(ReportError::Serde)?;
    std::fs::write(path, json).map_err(ReportError::Io)?;
    debug!(
        path = %path.display(),
        passed = report.passed.len(),
        blocked = report.blocked.len(),
        "filter report written"
    );
    Ok(())
}

/// Detector output consumed here; field names follow its JSON verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct DuplicationReport {
    pub statistics: Statistics,
    #[serde(default)]
    pub duplicates: Vec<DuplicatePair>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Statistics {
    pub total: TotalStats,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalStats {
    pub duplicated_lines: u64,
    pub clones: u64,
    pub lines: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatePair {
    pub lines: u64,
    pub first_file: FileRegion,
    pub second_file: FileRegion,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRegion {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

impl DuplicationReport {
    /// Parses the detector's JSON report file.
    pub fn load(path: &Path) -> RunResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(ReportError::Io)?;
        let report: DuplicationReport =
            serde_json::from_str(&raw).map_err(ReportError::Serde)?;
        debug!(
            path = %path.display(),
            clones = report.statistics.total.clones,
            pairs = report.duplicates.len(),
            "duplication report loaded"
        );
        Ok(report)
    }
}

/// Renders the duplicate-code comment body: totals, per-pair table, and the
/// filter audit lists. No input mutation; pure formatting.
pub fn render_duplication_comment(report: &DuplicationReport, filter: &FilterReport) -> String {
    let total = &report.statistics.total;
    let mut body = format!(
        "🧬 **Duplicate Code Report**\n\n\
         - Clones: {}\n\
         - Duplicated lines: {} / {} ({:.2}%)",
        total.clones, total.duplicated_lines, total.lines, total.percentage
    );

    if report.duplicates.is_empty() {
        body.push_str("\n\n_No duplicates found_");
    } else {
        body.push_str("\n\n| Lines | First File | Second File |\n|---|---|---|");
        for dup in &report.duplicates {
            body.push_str(&format!(
                "\n| {} | {}:{}-{} | {}:{}-{} |",
                dup.lines,
                dup.first_file.name,
                dup.first_file.start,
                dup.first_file.end,
                dup.second_file.name,
                dup.second_file.start,
                dup.second_file.end,
            ));
        }
    }

    body.push_str("\n\n**Diff Filter Results**\n\n");
    body.push_str(&format!("_Passed files:_\n{}\n\n", bullet_list(&filter.passed)));
    body.push_str(&format!("_Blocked files:_\n{}", bullet_list(&filter.blocked)));
    body
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "statistics": {
            "total": {
                "duplicatedLines": 42,
                "clones": 3,
                "lines": 1000,
                "percentage": 4.2
            }
        },
        "duplicates": [
            {
                "lines": 14,
                "firstFile": {"name": "src/a.rs", "start": 10, "end": 24},
                "secondFile": {"name": "src/b.rs", "start": 30, "end": 44}
            }
        ]
    }"#;

    fn filter_report() -> FilterReport {
        FilterReport {
            passed: vec!["src/a.rs".into(), "src/b.rs".into()],
            blocked: vec!["README.md".into()],
        }
    }

    #[test]
    fn parses_detector_json() {
        let report: DuplicationReport = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(report.statistics.total.clones, 3);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].first_file.name, "src/a.rs");
    }

    #[test]
    fn renders_totals_table_and_audit_lists() {
        let report: DuplicationReport = serde_json::from_str(SAMPLE).unwrap();
        let body = render_duplication_comment(&report, &filter_report());
        assert!(body.contains("- Clones: 3"));
        assert!(body.contains("42 / 1000 (4.20%)"));
        assert!(body.contains("| 14 | src/a.rs:10-24 | src/b.rs:30-44 |"));
        assert!(body.contains("- src/a.rs"));
        assert!(body.contains("_Blocked files:_\n- README.md"));
    }

    #[test]
    fn no_duplicates_branch() {
        let mut report: DuplicationReport = serde_json::from_str(SAMPLE).unwrap();
        report.duplicates.clear();
        let body = render_duplication_comment(&report, &filter_report());
        assert!(body.contains("_No duplicates found_"));
        assert!(!body.contains("| Lines |"));
    }

    #[test]
    fn empty_audit_lists_render_none() {
        let report: DuplicationReport = serde_json::from_str(SAMPLE).unwrap();
        let body = render_duplication_comment(&report, &FilterReport::default());
        assert!(body.contains("_Passed files:_\n- (none)"));
    }

    #[test]
    fn filter_report_json_shape_is_stable() {
        let value = serde_json::to_value(filter_report()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "passed": ["src/a.rs", "src/b.rs"],
                "blocked": ["README.md"]
            })
        );
    }
}
