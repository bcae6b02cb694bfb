use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::controller::{CaseReport, Outcome, RunSummary};

/// Totals section of the run report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunTotals {
    pub total: usize,
    pub passed: usize,
    pub new: usize,
    pub regressions: usize,
    pub faults: usize,
}

/// JSON run report written after a batch.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport<'a> {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub results_file: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub totals: RunTotals,
    pub cases: &'a [CaseReport],
}

impl<'a> RunReport<'a> {
    pub fn new(summary: &'a RunSummary, results_file: &Path) -> Self {
        Self {
            schema_version: "1.0",
            generated_at: Utc::now(),
            results_file: results_file.display().to_string(),
            exit_code: summary.exit_code(),
            duration_ms: summary.duration_ms,
            totals: RunTotals {
                total: summary.total(),
                passed: summary.count(Outcome::Passed),
                new: summary.count(Outcome::New),
                regressions: summary.count(Outcome::Regression),
                faults: summary.count(Outcome::Fault),
            },
            cases: &summary.cases,
        }
    }
}

/// Write the run report in pretty JSON format.
pub fn write_run_report(path: &Path, report: &RunReport<'_>) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render the plain-text summary printed at the end of a batch.
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = format!(
        "{} test(s) run: {} passed, {} new, {} failed ({:.1}s)\n",
        summary.total(),
        summary.count(Outcome::Passed),
        summary.count(Outcome::New),
        summary.failed(),
        summary.duration_ms as f64 / 1000.0
    );
    let failed: Vec<&str> = summary.failed_names().collect();
    if !failed.is_empty() {
        out.push_str(&format!("Failed: {}\n", failed.join(" ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TestIdentifier;

    fn case(number: u16, suffix: &str, outcome: Outcome) -> CaseReport {
        let key = TestIdentifier::new(number, suffix);
        CaseReport {
            id: key.padded(),
            name: key.name(),
            key,
            description: Some("demo".to_string()),
            outcome,
            duration_ms: 1500,
            fingerprint: Some("abc".to_string()),
            baseline: None,
            message: None,
            sub_test_faults: Vec::new(),
            commands: Vec::new(),
        }
    }

    fn summary() -> RunSummary {
        RunSummary {
            cases: vec![
                case(14, "splitting_by_size", Outcome::Passed),
                case(47, "X_tags", Outcome::Regression),
                case(217, "file_identification", Outcome::New),
            ],
            duration_ms: 4200,
        }
    }

    #[test]
    fn run_report_schema_has_expected_keys() {
        let summary = summary();
        let report = RunReport::new(&summary, Path::new("results.txt"));
        let value = serde_json::to_value(&report).expect("serialize report");

        for key in ["schema_version", "generated_at", "exit_code", "totals", "cases"] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(value["exit_code"], 1);
        assert_eq!(value["totals"]["regressions"], 1);
        assert_eq!(value["cases"][1]["name"], "T_047X_tags");
        assert_eq!(value["cases"][1]["outcome"], "regression");
        assert!(value["cases"][0].get("commands").is_none());
    }

    #[test]
    fn write_run_report_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        let summary = summary();
        write_run_report(&path, &RunReport::new(&summary, Path::new("results.txt")))
            .expect("write report");
        let content = std::fs::read_to_string(&path).expect("read report");
        assert!(content.contains("\"T_217file_identification\""));
    }

    #[test]
    fn summary_lists_failed_names() {
        let text = render_summary(&summary());
        assert!(text.starts_with("3 test(s) run: 1 passed, 1 new, 1 failed (4.2s)"));
        assert!(text.contains("Failed: T_047X_tags"));
    }
}
