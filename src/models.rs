//! Data models for the activity reporter.
//!
//! This module contains the core data structures used throughout the
//! application: project identifiers, the reporting date range, per-project
//! metric samples and the aggregate report they fold into.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Opaque identifier of one project on the platform.
///
/// GitLab returns numeric ids, but path-style ids (`group%2Fproject`) are
/// accepted too, so the value is kept as the string that goes into URLs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    #[allow(dead_code)] // Used by tests
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract the id from a JSON value (number or non-empty string).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self(n.to_string())),
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ProjectId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Inclusive calendar-day range used to filter commit queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting one whose start falls after its end.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if start > end {
            return Err(format!(
                "Start date {} is after end date {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ));
        }
        Ok(Self { start, end })
    }

    /// The full calendar month before the one containing `today`.
    pub fn previous_month(today: NaiveDate) -> Self {
        let first_of_this_month = today.with_day(1).unwrap_or(today);
        let end = first_of_this_month - Duration::days(1);
        let start = end.with_day(1).unwrap_or(end);
        Self { start, end }
    }

    /// Lower bound as sent to the API (start of the first day, UTC).
    pub fn since_param(&self) -> String {
        format!("{}T00:00:00Z", self.start.format("%Y-%m-%d"))
    }

    /// Upper bound as sent to the API (last second of the final day, UTC).
    pub fn until_param(&self) -> String {
        format!("{}T23:59:59Z", self.end.format("%Y-%m-%d"))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("Invalid date '{}' (expected YYYY-MM-DD): {}", s, e))
}

/// One of the four independent queries issued per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Commits authored by the user within the range.
    Commits,
    /// Merge requests authored by the user.
    AuthoredMergeRequests,
    /// Merge requests the user is a reviewer on.
    ReviewedMergeRequests,
    /// Added/removed line statistics of every commit in the range.
    LineStats,
}

impl QueryKind {
    pub const ALL: [QueryKind; 4] = [
        QueryKind::Commits,
        QueryKind::AuthoredMergeRequests,
        QueryKind::ReviewedMergeRequests,
        QueryKind::LineStats,
    ];
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::Commits => write!(f, "Commits"),
            QueryKind::AuthoredMergeRequests => write!(f, "Merge requests authored"),
            QueryKind::ReviewedMergeRequests => write!(f, "Merge requests reviewed"),
            QueryKind::LineStats => write!(f, "Line statistics"),
        }
    }
}

/// The five activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub commits: u64,
    pub merge_requests_authored: u64,
    pub merge_requests_reviewed: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
}

impl Add for Totals {
    type Output = Totals;

    fn add(self, other: Totals) -> Totals {
        Totals {
            commits: self.commits + other.commits,
            merge_requests_authored: self.merge_requests_authored
                + other.merge_requests_authored,
            merge_requests_reviewed: self.merge_requests_reviewed
                + other.merge_requests_reviewed,
            lines_added: self.lines_added + other.lines_added,
            lines_removed: self.lines_removed + other.lines_removed,
        }
    }
}

impl AddAssign for Totals {
    fn add_assign(&mut self, other: Totals) {
        *self = *self + other;
    }
}

/// Metrics collected for a single project.
///
/// A query that failed contributes zero to its field(s) and is listed in
/// `failed`. A query cut short by the page cap keeps its partial count and
/// is listed in `truncated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSample {
    pub project: ProjectId,
    pub totals: Totals,
    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    pub failed: BTreeSet<QueryKind>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    pub truncated: BTreeSet<QueryKind>,
}

impl MetricSample {
    /// The sample of a project whose every query failed.
    #[allow(dead_code)] // Used by tests
    pub fn all_failed(project: ProjectId) -> Self {
        Self {
            project,
            totals: Totals::default(),
            failed: QueryKind::ALL.into_iter().collect(),
            truncated: BTreeSet::new(),
        }
    }

    #[allow(dead_code)] // Used by tests
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.truncated.is_empty()
    }
}

/// How project discovery went.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryStatus {
    /// Pages fetched successfully.
    pub pages: usize,
    /// Set when a page request failed or returned something other than a list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the page cap stopped discovery before the last page.
    pub truncated: bool,
}

impl DiscoveryStatus {
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && !self.truncated
    }
}

/// Result of listing the projects visible to the credentials.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub projects: Vec<ProjectId>,
    pub status: DiscoveryStatus,
}

/// The element-wise sum of every project's sample for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    /// User whose activity was aggregated.
    pub user_id: String,
    /// Range applied to commit queries.
    pub range: DateRange,
    /// Whether merge request counts are restricted to the range.
    pub merge_requests_range_scoped: bool,
    /// Summed counters.
    pub totals: Totals,
    /// Number of projects a sample was collected for.
    pub projects_processed: usize,
    /// Number of projects with at least one failed query.
    pub projects_with_failures: usize,
    /// Failed query count per kind, across all projects.
    pub failures: BTreeMap<QueryKind, usize>,
    /// Per kind, queries that stopped at the page cap and undercount.
    #[serde(default)]
    pub truncations: BTreeMap<QueryKind, usize>,
    /// Discovery outcome.
    pub discovery: DiscoveryStatus,
}

impl AggregateReport {
    /// An empty report for the given run parameters.
    pub fn new(
        user_id: impl Into<String>,
        range: DateRange,
        merge_requests_range_scoped: bool,
        discovery: DiscoveryStatus,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            range,
            merge_requests_range_scoped,
            totals: Totals::default(),
            projects_processed: 0,
            projects_with_failures: 0,
            failures: BTreeMap::new(),
            truncations: BTreeMap::new(),
            discovery,
        }
    }

    /// Add one project's sample to the report.
    pub fn absorb(mut self, sample: &MetricSample) -> Self {
        self.totals += sample.totals;
        self.projects_processed += 1;
        if !sample.failed.is_empty() {
            self.projects_with_failures += 1;
        }
        for kind in &sample.failed {
            *self.failures.entry(*kind).or_insert(0) += 1;
        }
        for kind in &sample.truncated {
            *self.truncations.entry(*kind).or_insert(0) += 1;
        }
        self
    }

    /// Total number of failed queries across all projects.
    pub fn failed_queries(&self) -> usize {
        self.failures.values().sum()
    }

    /// Total number of queries stopped by the page cap.
    pub fn truncated_queries(&self) -> usize {
        self.truncations.values().sum()
    }

    /// True when discovery and every query succeeded in full.
    pub fn is_complete(&self) -> bool {
        self.discovery.is_complete() && self.failed_queries() == 0 && self.truncated_queries() == 0
    }

    /// Why the report is incomplete, one short phrase per cause.
    pub fn incomplete_causes(&self) -> Vec<String> {
        let mut causes = Vec::new();
        if self.discovery.error.is_some() {
            causes.push("project listing failed".to_string());
        }
        if self.discovery.truncated {
            causes.push("project listing hit the page cap".to_string());
        }
        match self.failed_queries() {
            0 => {}
            1 => causes.push("1 failed query".to_string()),
            n => causes.push(format!("{} failed queries", n)),
        }
        match self.truncated_queries() {
            0 => {}
            1 => causes.push("1 query hit the page cap".to_string()),
            n => causes.push(format!("{} queries hit the page cap", n)),
        }
        causes
    }
}

/// What a run produced.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Discovery yielded nothing; no metrics were collected.
    NoProjects { discovery: DiscoveryStatus },
    /// Metrics were collected for at least one project.
    Report(AggregateReport),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn sample(id: u64, totals: Totals, failed: &[QueryKind]) -> MetricSample {
        MetricSample {
            project: ProjectId::from(id),
            totals,
            failed: failed.iter().copied().collect(),
            truncated: BTreeSet::new(),
        }
    }

    #[test]
    fn test_project_id_from_json() {
        assert_eq!(ProjectId::from_json(&json!(101)), Some(ProjectId::new("101")));
        assert_eq!(
            ProjectId::from_json(&json!("group%2Fapp")),
            Some(ProjectId::new("group%2Fapp"))
        );
        assert_eq!(ProjectId::from_json(&json!("")), None);
        assert_eq!(ProjectId::from_json(&json!(null)), None);
        assert_eq!(ProjectId::from_json(&json!({"id": 1})), None);
    }

    #[test]
    fn test_date_range_params() {
        let range = DateRange::new(date("2025-03-01"), date("2025-03-31")).unwrap();
        assert_eq!(range.since_param(), "2025-03-01T00:00:00Z");
        assert_eq!(range.until_param(), "2025-03-31T23:59:59Z");
        assert_eq!(range.to_string(), "2025-03-01 .. 2025-03-31");
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        assert!(DateRange::new(date("2025-04-01"), date("2025-03-31")).is_err());
        assert!(DateRange::new(date("2025-03-31"), date("2025-03-31")).is_ok());
    }

    #[test]
    fn test_previous_month() {
        let range = DateRange::previous_month(date("2025-03-15"));
        assert_eq!(range.start, date("2025-02-01"));
        assert_eq!(range.end, date("2025-02-28"));

        let range = DateRange::previous_month(date("2025-01-01"));
        assert_eq!(range.start, date("2024-12-01"));
        assert_eq!(range.end, date("2024-12-31"));
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date("2025-13-01").is_err());
        assert!(parse_date("03/01/2025").is_err());
        assert_eq!(parse_date(" 2025-03-01 ").unwrap(), date("2025-03-01"));
    }

    #[test]
    fn test_totals_addition() {
        let a = Totals {
            commits: 3,
            merge_requests_authored: 1,
            merge_requests_reviewed: 0,
            lines_added: 40,
            lines_removed: 10,
        };
        let b = Totals {
            commits: 0,
            merge_requests_authored: 2,
            merge_requests_reviewed: 1,
            lines_added: 5,
            lines_removed: 0,
        };
        let mut sum = Totals::default();
        sum += a;
        sum += b;
        assert_eq!(sum, a + b);
        assert_eq!(sum.merge_requests_authored, 3);
        assert_eq!(sum.lines_added, 45);
    }

    #[test]
    fn test_report_absorb_counts_failures() {
        let range = DateRange::new(date("2025-03-01"), date("2025-03-31")).unwrap();
        let report = AggregateReport::new("42", range, false, DiscoveryStatus::default())
            .absorb(&sample(1, Totals { commits: 2, ..Totals::default() }, &[]))
            .absorb(&sample(2, Totals::default(), &[QueryKind::Commits]))
            .absorb(&MetricSample::all_failed(ProjectId::from(3)));

        assert_eq!(report.projects_processed, 3);
        assert_eq!(report.projects_with_failures, 2);
        assert_eq!(report.failures.get(&QueryKind::Commits), Some(&2));
        assert_eq!(report.failures.get(&QueryKind::LineStats), Some(&1));
        assert_eq!(report.failed_queries(), 5);
        assert_eq!(report.totals.commits, 2);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_report_complete_requires_discovery() {
        let range = DateRange::new(date("2025-03-01"), date("2025-03-31")).unwrap();
        let discovery = DiscoveryStatus {
            pages: 1,
            error: None,
            truncated: true,
        };
        let report = AggregateReport::new("42", range, false, discovery)
            .absorb(&sample(1, Totals::default(), &[]));
        assert_eq!(report.failed_queries(), 0);
        assert!(!report.is_complete());
        assert_eq!(report.incomplete_causes(), vec!["project listing hit the page cap"]);
    }

    #[test]
    fn test_truncated_sample_makes_report_incomplete() {
        let range = DateRange::new(date("2025-03-01"), date("2025-03-31")).unwrap();
        let mut capped = sample(1, Totals { commits: 100, ..Totals::default() }, &[]);
        capped.truncated.insert(QueryKind::Commits);
        assert!(!capped.is_complete());

        let report = AggregateReport::new("42", range, false, DiscoveryStatus::default())
            .absorb(&capped)
            .absorb(&sample(2, Totals::default(), &[QueryKind::LineStats]));

        assert_eq!(report.totals.commits, 100);
        assert_eq!(report.projects_with_failures, 1);
        assert_eq!(report.truncations.get(&QueryKind::Commits), Some(&1));
        assert_eq!(report.truncated_queries(), 1);
        assert!(!report.is_complete());
        assert_eq!(
            report.incomplete_causes(),
            vec!["1 failed query", "1 query hit the page cap"]
        );
    }
}
