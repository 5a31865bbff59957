//! Report generation.
//!
//! This module renders an [`AggregateReport`] as console text, Markdown or
//! JSON. All three carry the same totals; the failure breakdown only shows
//! up when something actually failed.

use crate::cli::OutputFormat;
use crate::models::{AggregateReport, DiscoveryStatus, QueryKind};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Render the report in the requested format.
pub fn render(report: &AggregateReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(generate_text_report(report)),
        OutputFormat::Markdown => Ok(generate_markdown_report(report)),
        OutputFormat::Json => generate_json_report(report),
    }
}

/// Message printed when discovery finds nothing.
pub fn no_projects_message(discovery: &DiscoveryStatus) -> String {
    match discovery.error {
        Some(ref error) => format!("❌ No projects found (project listing failed: {})", error),
        None => "❌ No projects found.".to_string(),
    }
}

/// Generate the console report.
pub fn generate_text_report(report: &AggregateReport) -> String {
    let mut output = String::new();
    let totals = &report.totals;

    output.push_str(&format!(
        "📊 Activity report for user {} ({})\n",
        report.user_id, report.range
    ));
    output.push_str(&format!("✅ Commits: {}\n", totals.commits));
    output.push_str(&format!(
        "✅ Merge requests authored: {}{}\n",
        totals.merge_requests_authored,
        lifetime_note(report)
    ));
    output.push_str(&format!(
        "✅ Merge requests reviewed: {}{}\n",
        totals.merge_requests_reviewed,
        lifetime_note(report)
    ));
    output.push_str(&format!("✅ Lines added: {}\n", totals.lines_added));
    output.push_str(&format!("✅ Lines removed: {}\n", totals.lines_removed));
    output.push_str(&format!(
        "   Projects processed: {}\n",
        report.projects_processed
    ));

    if !report.is_complete() {
        output.push('\n');
        output.push_str("⚠️  Incomplete data:\n");
        for line in incomplete_lines(report) {
            output.push_str(&format!("   - {}\n", line));
        }
    }

    output
}

/// Generate a Markdown report.
pub fn generate_markdown_report(report: &AggregateReport) -> String {
    let mut output = String::new();
    let totals = &report.totals;

    output.push_str("# GitLab Activity Report\n\n");

    output.push_str("## Scope\n\n");
    output.push_str(&format!("- **User:** {}\n", report.user_id));
    output.push_str(&format!("- **Date Range:** {}\n", report.range));
    output.push_str(&format!(
        "- **Merge Requests:** {}\n",
        if report.merge_requests_range_scoped {
            "within the date range"
        } else {
            "lifetime totals"
        }
    ));
    output.push_str(&format!(
        "- **Projects Processed:** {}\n\n",
        report.projects_processed
    ));

    output.push_str("## Totals\n\n");
    output.push_str("| Metric | Count |\n");
    output.push_str("|--------|-------|\n");
    output.push_str(&format!("| Commits | {} |\n", totals.commits));
    output.push_str(&format!(
        "| Merge requests authored | {} |\n",
        totals.merge_requests_authored
    ));
    output.push_str(&format!(
        "| Merge requests reviewed | {} |\n",
        totals.merge_requests_reviewed
    ));
    output.push_str(&format!("| Lines added | {} |\n", totals.lines_added));
    output.push_str(&format!("| Lines removed | {} |\n", totals.lines_removed));
    output.push('\n');

    if !report.is_complete() {
        output.push_str("## Incomplete Data\n\n");
        output.push_str(
            "Failed queries count as zero and capped queries as their partial count in the totals above.\n\n",
        );
        for line in incomplete_lines(report) {
            output.push_str(&format!("- {}\n", line));
        }
        output.push('\n');
    }

    output.push_str("---\n\n");
    output.push_str(&format!(
        "*Generated by gitlab-activity v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    output
}

#[derive(Serialize)]
struct JsonReport<'a> {
    complete: bool,
    failed_queries: usize,
    truncated_queries: usize,
    #[serde(flatten)]
    report: &'a AggregateReport,
}

/// Generate a JSON report.
pub fn generate_json_report(report: &AggregateReport) -> Result<String> {
    let document = JsonReport {
        complete: report.is_complete(),
        failed_queries: report.failed_queries(),
        truncated_queries: report.truncated_queries(),
        report,
    };
    serde_json::to_string_pretty(&document).context("Failed to serialize report to JSON")
}

/// Write a rendered report to `path`.
pub fn write_report(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

fn lifetime_note(report: &AggregateReport) -> &'static str {
    if report.merge_requests_range_scoped {
        ""
    } else {
        " (all time)"
    }
}

/// Human-readable reasons the report is not complete.
fn incomplete_lines(report: &AggregateReport) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(ref error) = report.discovery.error {
        lines.push(format!("Project listing failed: {}", error));
    }
    if report.discovery.truncated {
        lines.push(format!(
            "Project listing stopped at the page cap after {} pages",
            report.discovery.pages
        ));
    }
    if report.projects_with_failures > 0 {
        lines.push(format!(
            "{} of {} projects had failed queries",
            report.projects_with_failures, report.projects_processed
        ));
    }
    for kind in QueryKind::ALL {
        if let Some(count) = report.failures.get(&kind) {
            lines.push(format!("{}: {} failed", kind, count));
        }
    }
    for kind in QueryKind::ALL {
        if let Some(count) = report.truncations.get(&kind) {
            lines.push(format!(
                "{}: {} stopped at the page cap (count is a lower bound)",
                kind, count
            ));
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_date, DateRange, MetricSample, ProjectId, Totals};
    use std::collections::BTreeSet;

    fn create_test_report(failed: &[QueryKind]) -> AggregateReport {
        let range = DateRange::new(
            parse_date("2025-03-01").unwrap(),
            parse_date("2025-03-31").unwrap(),
        )
        .unwrap();
        let discovery = DiscoveryStatus {
            pages: 1,
            error: None,
            truncated: false,
        };
        AggregateReport::new("42", range, false, discovery).absorb(&MetricSample {
            project: ProjectId::from(101),
            totals: Totals {
                commits: 3,
                merge_requests_authored: 3,
                merge_requests_reviewed: 1,
                lines_added: 45,
                lines_removed: 10,
            },
            failed: failed.iter().copied().collect::<BTreeSet<_>>(),
            truncated: BTreeSet::new(),
        })
    }

    #[test]
    fn test_generate_text_report() {
        let text = generate_text_report(&create_test_report(&[]));

        assert!(text.contains("user 42 (2025-03-01 .. 2025-03-31)"));
        assert!(text.contains("Commits: 3"));
        assert!(text.contains("Merge requests authored: 3 (all time)"));
        assert!(text.contains("Merge requests reviewed: 1"));
        assert!(text.contains("Lines added: 45"));
        assert!(text.contains("Lines removed: 10"));
        assert!(!text.contains("Incomplete data"));
    }

    #[test]
    fn test_text_report_lists_failures() {
        let text = generate_text_report(&create_test_report(&[QueryKind::Commits]));

        assert!(text.contains("Incomplete data"));
        assert!(text.contains("1 of 1 projects had failed queries"));
        assert!(text.contains("Commits: 1 failed"));
    }

    #[test]
    fn test_text_report_lists_page_cap() {
        let mut report = create_test_report(&[]);
        report.truncations.insert(QueryKind::LineStats, 2);
        let text = generate_text_report(&report);

        assert!(text.contains("Incomplete data"));
        assert!(text.contains("Line statistics: 2 stopped at the page cap"));
        assert!(!text.contains("had failed queries"));
    }

    #[test]
    fn test_generate_markdown_report() {
        let mut report = create_test_report(&[]);
        report.merge_requests_range_scoped = true;
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# GitLab Activity Report"));
        assert!(markdown.contains("| Lines added | 45 |"));
        assert!(markdown.contains("within the date range"));
        assert!(!markdown.contains("## Incomplete Data"));
    }

    #[test]
    fn test_markdown_report_discovery_failure() {
        let mut report = create_test_report(&[]);
        report.discovery.error = Some("401 Unauthorized".to_string());
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("## Incomplete Data"));
        assert!(markdown.contains("Project listing failed: 401 Unauthorized"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_report(&[QueryKind::LineStats])).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["complete"], false);
        assert_eq!(value["failed_queries"], 1);
        assert_eq!(value["truncated_queries"], 0);
        assert_eq!(value["totals"]["lines_added"], 45);
        assert_eq!(value["failures"]["line_stats"], 1);
        assert_eq!(value["range"]["start"], "2025-03-01");
    }

    #[test]
    fn test_no_projects_message() {
        assert_eq!(
            no_projects_message(&DiscoveryStatus::default()),
            "❌ No projects found."
        );
        let status = DiscoveryStatus {
            pages: 0,
            error: Some("403 Forbidden".to_string()),
            truncated: false,
        };
        assert!(no_projects_message(&status).contains("403 Forbidden"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");

        write_report(&path, "hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }
}
