//! Activity aggregation across projects.
//!
//! The aggregator discovers every project visible to the token, collects
//! one [`MetricSample`] per project concurrently and folds the samples into
//! an [`AggregateReport`] once all of them have completed. Each sample is a
//! value returned by its own future; nothing is accumulated in shared state
//! while requests are in flight.

use crate::client::{walk_pages, ApiClient, ClientError, Endpoints};
use crate::models::{
    AggregateReport, DateRange, Discovery, DiscoveryStatus, MetricSample, ProjectId, QueryKind,
    RunOutcome, Totals,
};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, error, info, warn};

/// Run parameters fixed at startup.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// User whose activity is aggregated.
    pub user_id: String,
    /// Range applied to commit queries.
    pub range: DateRange,
    /// Apply the range to merge request queries as well.
    pub scope_merge_requests: bool,
    /// Page cap for every list endpoint.
    pub max_pages: usize,
}

/// Orchestrates discovery, per-project collection and the final fold.
pub struct Aggregator<C> {
    client: C,
    endpoints: Endpoints,
    config: AggregatorConfig,
    progress: ProgressBar,
}

impl<C: ApiClient> Aggregator<C> {
    pub fn new(client: C, endpoints: Endpoints, config: AggregatorConfig) -> Self {
        Self {
            client,
            endpoints,
            config,
            progress: ProgressBar::hidden(),
        }
    }

    /// Show a per-project progress bar on stderr while collecting.
    pub fn with_progress(mut self, show: bool) -> Self {
        if show {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} projects ({eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            self.progress = pb;
        }
        self
    }

    /// List every project visible to the credentials.
    ///
    /// Never fails: a bad page is logged and discovery keeps whatever was
    /// gathered before it, which is nothing when the first page fails.
    pub async fn discover_projects(&self) -> Discovery {
        let walk = walk_pages(
            &self.client,
            self.endpoints.per_page(),
            self.config.max_pages,
            |page| self.endpoints.projects(page),
        )
        .await;

        let mut seen = HashSet::new();
        let mut projects = Vec::with_capacity(walk.items.len());
        for item in &walk.items {
            match item.get("id").and_then(ProjectId::from_json) {
                Some(id) if seen.insert(id.clone()) => projects.push(id),
                Some(id) => debug!("Project {} listed twice, counting it once", id),
                None => warn!("Skipping project entry without an id"),
            }
        }

        let error = walk.error.map(|e| {
            error!("Failed to list projects: {}", e);
            if e.is_auth() {
                error!("Check the GitLab token and that it has the read_api scope");
            }
            e.to_string()
        });

        if walk.truncated {
            warn!(
                "Project discovery stopped at the {}-page cap; remaining projects are not counted",
                self.config.max_pages
            );
        }

        info!(
            "Discovered {} projects across {} pages",
            projects.len(),
            walk.pages
        );

        Discovery {
            projects,
            status: DiscoveryStatus {
                pages: walk.pages,
                error,
                truncated: walk.truncated,
            },
        }
    }

    /// Collect the four metrics of one project.
    ///
    /// The queries run concurrently and fail independently: a failed query
    /// leaves its field(s) at zero and is recorded in `MetricSample::failed`.
    /// A query stopped by the page cap keeps its partial count and is
    /// recorded in `MetricSample::truncated`.
    pub async fn collect_sample(
        &self,
        project: &ProjectId,
        range: &DateRange,
        user_id: &str,
    ) -> MetricSample {
        let mr_scope = self.config.scope_merge_requests.then_some(range);

        let (commits, authored, reviewed, lines) = tokio::join!(
            self.count(|page| {
                self.endpoints
                    .commits_by_author(project, user_id, range, page)
            }),
            self.count(|page| {
                self.endpoints
                    .merge_requests_authored(project, user_id, mr_scope, page)
            }),
            self.count(|page| {
                self.endpoints
                    .merge_requests_reviewed(project, user_id, mr_scope, page)
            }),
            self.line_stats(project, range),
        );

        let mut gaps = Gaps::default();
        let commits = gaps.settle(project, QueryKind::Commits, commits);
        let merge_requests_authored =
            gaps.settle(project, QueryKind::AuthoredMergeRequests, authored);
        let merge_requests_reviewed =
            gaps.settle(project, QueryKind::ReviewedMergeRequests, reviewed);
        let (lines_added, lines_removed) = gaps.settle(project, QueryKind::LineStats, lines);

        MetricSample {
            project: project.clone(),
            totals: Totals {
                commits,
                merge_requests_authored,
                merge_requests_reviewed,
                lines_added,
                lines_removed,
            },
            failed: gaps.failed,
            truncated: gaps.truncated,
        }
    }

    /// Discover projects, collect every sample and fold them into a report.
    pub async fn run(&self) -> RunOutcome {
        let AggregatorConfig {
            user_id,
            range,
            scope_merge_requests,
            ..
        } = &self.config;

        let discovery = self.discover_projects().await;
        if discovery.projects.is_empty() {
            warn!("No projects found");
            return RunOutcome::NoProjects {
                discovery: discovery.status,
            };
        }

        info!(
            "Collecting activity of user {} in {} projects ({})",
            user_id,
            discovery.projects.len(),
            range
        );

        self.progress.set_length(discovery.projects.len() as u64);
        let samples = join_all(discovery.projects.iter().map(|project| async move {
            let sample = self.collect_sample(project, range, user_id).await;
            self.progress.inc(1);
            sample
        }))
        .await;
        self.progress.finish_and_clear();

        let report = samples.iter().fold(
            AggregateReport::new(
                user_id.clone(),
                *range,
                *scope_merge_requests,
                discovery.status,
            ),
            |report, sample| report.absorb(sample),
        );

        if report.failed_queries() > 0 {
            warn!(
                "{} queries failed in {} of {} projects; their fields count as zero",
                report.failed_queries(),
                report.projects_with_failures,
                report.projects_processed
            );
        }
        if report.truncated_queries() > 0 {
            warn!(
                "{} queries stopped at the {}-page cap; their counts are lower bounds",
                report.truncated_queries(),
                self.config.max_pages
            );
        }

        RunOutcome::Report(report)
    }

    /// Number of items across all pages of a list endpoint.
    async fn count<F>(&self, url_for_page: F) -> Result<Answer<u64>, ClientError>
    where
        F: Fn(usize) -> String,
    {
        let walk = walk_pages(
            &self.client,
            self.endpoints.per_page(),
            self.config.max_pages,
            url_for_page,
        )
        .await;
        let truncated = walk.truncated;
        walk.into_result().map(|items| Answer {
            value: items.len() as u64,
            truncated,
        })
    }

    /// Sum of added and removed lines over every commit in the range.
    async fn line_stats(
        &self,
        project: &ProjectId,
        range: &DateRange,
    ) -> Result<Answer<(u64, u64)>, ClientError> {
        let walk = walk_pages(
            &self.client,
            self.endpoints.per_page(),
            self.config.max_pages,
            |page| self.endpoints.commits_in_range(project, range, page),
        )
        .await;
        let truncated = walk.truncated;
        let commits = walk.into_result()?;

        let shas = commits
            .iter()
            .map(|commit| {
                commit
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ClientError::UnexpectedShape {
                        url: self.endpoints.commits_in_range(project, range, 1),
                        message: "commit entry without an id".to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let details = join_all(shas.into_iter().map(|sha| async move {
            let url = self.endpoints.commit(project, sha);
            self.client.get_json(&url).await
        }))
        .await;

        let value = details
            .into_iter()
            .try_fold((0u64, 0u64), |(added, removed), detail| -> Result<_, ClientError> {
                let detail = detail?;
                Ok((
                    added + stat(&detail, "additions"),
                    removed + stat(&detail, "deletions"),
                ))
            })?;
        Ok(Answer { value, truncated })
    }
}

/// A query's value and whether the page cap cut it short.
#[derive(Debug, Default, PartialEq, Eq)]
struct Answer<T> {
    value: T,
    truncated: bool,
}

/// Failed and truncated queries of one sample.
#[derive(Debug, Default)]
struct Gaps {
    failed: BTreeSet<QueryKind>,
    truncated: BTreeSet<QueryKind>,
}

impl Gaps {
    /// Unwrap a query result, recording a failure (value falls back to zero)
    /// or a page-cap stop (value kept as is).
    fn settle<T: Default>(
        &mut self,
        project: &ProjectId,
        kind: QueryKind,
        result: Result<Answer<T>, ClientError>,
    ) -> T {
        match result {
            Ok(answer) => {
                if answer.truncated {
                    debug!("Project {}: {} query stopped at the page cap", project, kind);
                    self.truncated.insert(kind);
                }
                answer.value
            }
            Err(e) => {
                debug!("Project {}: {} query failed: {}", project, kind, e);
                self.failed.insert(kind);
                T::default()
            }
        }
    }
}

/// `stats.<field>` of a commit detail; absent stats count as zero.
fn stat(commit: &Value, field: &str) -> u64 {
    commit
        .get("stats")
        .and_then(|stats| stats.get(field))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}
