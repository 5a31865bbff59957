//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap, including the
//! environment variable fallbacks and validation.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// gitlab-activity - one user's GitLab activity across every project
///
/// Counts commits, authored and reviewed merge requests, and lines
/// added/removed over a date range in all projects the token can see.
///
/// Examples:
///   GITLAB_TOKEN=glpat-... gitlab-activity --user-id 42
///   gitlab-activity --user-id 42 --since 2025-03-01 --until 2025-03-31
///   gitlab-activity --gitlab-url https://gitlab.example.com/api/v4 --format json
///   gitlab-activity --init-config
#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Root of the GitLab REST API
    ///
    /// Defaults to https://gitlab.com/api/v4 when neither the flag, the
    /// environment nor the config file set it.
    #[arg(long, value_name = "URL", env = "GITLAB_URL")]
    pub gitlab_url: Option<String>,

    /// Personal access token (read_api scope)
    #[arg(long, value_name = "TOKEN", env = "GITLAB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// GitLab user id whose activity is aggregated
    #[arg(short, long, value_name = "ID", env = "USER_ID")]
    pub user_id: Option<String>,

    /// First day of the range, inclusive (YYYY-MM-DD)
    ///
    /// Defaults to the first day of the previous month.
    #[arg(long, value_name = "DATE", env = "START_DATE")]
    pub since: Option<String>,

    /// Last day of the range, inclusive (YYYY-MM-DD)
    ///
    /// Defaults to the last day of the previous month.
    #[arg(long, value_name = "DATE", env = "END_DATE")]
    pub until: Option<String>,

    /// Also restrict merge request counts to the date range
    ///
    /// Without this flag merge request counts are lifetime totals while
    /// commit counts are range-scoped.
    #[arg(long)]
    pub scope_merge_requests: bool,

    /// Items per page for list requests (1-100)
    #[arg(long, value_name = "COUNT")]
    pub per_page: Option<usize>,

    /// Maximum pages fetched from any list endpoint
    #[arg(long, value_name = "COUNT")]
    pub max_pages: Option<usize>,

    /// Maximum number of API requests in flight
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format (text, markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .gitlab-activity.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Exit with status 0 even when some queries failed
    #[arg(long)]
    pub allow_partial: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no progress bar)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .gitlab-activity.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

// Hand-written so the token never reaches the debug log.
impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("gitlab_url", &self.gitlab_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user_id", &self.user_id)
            .field("since", &self.since)
            .field("until", &self.until)
            .field("scope_merge_requests", &self.scope_merge_requests)
            .field("per_page", &self.per_page)
            .field("max_pages", &self.max_pages)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .field("format", &self.format)
            .field("output", &self.output)
            .field("config", &self.config)
            .field("allow_partial", &self.allow_partial)
            .field("verbose", &self.verbose)
            .field("quiet", &self.quiet)
            .field("init_config", &self.init_config)
            .finish()
    }
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain console text (default)
    #[default]
    Text,
    /// Markdown document
    Markdown,
    /// JSON document
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    ///
    /// Settings that may come from the config file are checked after
    /// merging, in `Config::validate`.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.gitlab_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("GitLab URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(per_page) = self.per_page {
            if !(1..=100).contains(&per_page) {
                return Err("Per-page must be between 1 and 100".to_string());
            }
        }

        if self.max_pages == Some(0) {
            return Err("Max pages must be at least 1".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        for date in [&self.since, &self.until].into_iter().flatten() {
            crate::models::parse_date(date)?;
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
