//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.gitlab-activity.toml` files. Values given on the command line or
//! through the environment take precedence over the file.

use crate::cli::{Args, OutputFormat};
use crate::models::{parse_date, DateRange};
use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".gitlab-activity.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// GitLab connection settings.
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// What to aggregate.
    #[serde(default)]
    pub query: QueryConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Maximum number of API requests in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Exit with status 0 even when some queries failed.
    #[serde(default)]
    pub allow_partial: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            allow_partial: false,
        }
    }
}

fn default_concurrency() -> usize {
    8
}

/// GitLab API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// Root of the REST API, e.g. `https://gitlab.com/api/v4`.
    #[serde(default = "default_url")]
    pub url: String,

    /// Personal access token. Prefer the `GITLAB_TOKEN` environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Items requested per page (GitLab allows at most 100).
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Maximum pages fetched from any list endpoint.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            per_page: default_per_page(),
            max_pages: default_max_pages(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_url() -> String {
    "https://gitlab.com/api/v4".to_string()
}

fn default_per_page() -> usize {
    100
}

fn default_max_pages() -> usize {
    50
}

fn default_timeout() -> u64 {
    30
}

/// Whose activity to aggregate, and over which days.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Numeric GitLab user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// First day of the range (`YYYY-MM-DD`), inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    /// Last day of the range (`YYYY-MM-DD`), inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    /// Restrict merge request counts to the range.
    ///
    /// Off by default: merge request counts are lifetime totals.
    #[serde(default)]
    pub scope_merge_requests: bool,
}

/// Report output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Write the report to this file instead of stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Arguments (including their environment fallbacks) take precedence;
    /// only values actually provided override the file.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref url) = args.gitlab_url {
            self.gitlab.url = url.clone();
        }
        if let Some(ref token) = args.token {
            self.gitlab.token = Some(token.clone());
        }
        if let Some(per_page) = args.per_page {
            self.gitlab.per_page = per_page;
        }
        if let Some(max_pages) = args.max_pages {
            self.gitlab.max_pages = max_pages;
        }
        if let Some(timeout) = args.timeout {
            self.gitlab.timeout_seconds = timeout;
        }

        if let Some(ref user_id) = args.user_id {
            self.query.user_id = Some(user_id.clone());
        }
        if let Some(ref since) = args.since {
            self.query.start_date = Some(since.clone());
        }
        if let Some(ref until) = args.until {
            self.query.end_date = Some(until.clone());
        }
        if args.scope_merge_requests {
            self.query.scope_merge_requests = true;
        }

        if let Some(format) = args.format {
            self.report.format = format;
        }
        if let Some(ref output) = args.output {
            self.report.output = Some(output.display().to_string());
        }

        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if args.allow_partial {
            self.general.allow_partial = true;
        }
    }

    /// Resolve the date range, defaulting to the previous calendar month.
    pub fn date_range(&self) -> Result<DateRange> {
        self.date_range_from(Local::now().date_naive())
    }

    fn date_range_from(&self, today: NaiveDate) -> Result<DateRange> {
        let fallback = DateRange::previous_month(today);
        let start = match self.query.start_date {
            Some(ref s) => parse_date(s).map_err(anyhow::Error::msg)?,
            None => fallback.start,
        };
        let end = match self.query.end_date {
            Some(ref s) => parse_date(s).map_err(anyhow::Error::msg)?,
            None => fallback.end,
        };
        DateRange::new(start, end).map_err(anyhow::Error::msg)
    }

    /// Check the merged settings before any request is made.
    pub fn validate(&self) -> Result<()> {
        let url = self.gitlab.url.as_str();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("GitLab URL must start with 'http://' or 'https://'");
        }

        match self.gitlab.token.as_deref() {
            Some(token) if !token.trim().is_empty() => {}
            _ => bail!("A GitLab token is required (set GITLAB_TOKEN or pass --token)"),
        }

        match self.query.user_id.as_deref() {
            Some(user_id) if !user_id.trim().is_empty() => {}
            _ => bail!("A user id is required (set USER_ID or pass --user-id)"),
        }

        if !(1..=100).contains(&self.gitlab.per_page) {
            bail!("Per-page must be between 1 and 100");
        }
        if self.gitlab.max_pages == 0 {
            bail!("Max pages must be at least 1");
        }
        if self.gitlab.timeout_seconds == 0 {
            bail!("Timeout must be at least 1 second");
        }
        if self.general.concurrency == 0 {
            bail!("Concurrency must be at least 1");
        }

        self.date_range()?;
        Ok(())
    }

    /// The configured user id, trimmed. Empty if unset.
    pub fn user_id(&self) -> String {
        self.query
            .user_id
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.gitlab.token = Some("glpat-example".to_string());
        config.query.user_id = Some("42".to_string());
        config.query.start_date = Some("2025-03-01".to_string());
        config.query.end_date = Some("2025-03-31".to_string());
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gitlab.url, "https://gitlab.com/api/v4");
        assert_eq!(config.gitlab.per_page, 100);
        assert_eq!(config.general.concurrency, 8);
        assert!(!config.query.scope_merge_requests);
        assert_eq!(config.report.format, OutputFormat::Text);
    }

    #[test]
    fn test_default_toml_has_only_live_settings() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("concurrency = 8"));
        assert!(!toml_str.contains("verbose"));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
concurrency = 4
allow_partial = true

[gitlab]
url = "https://gitlab.example.com/api/v4"
per_page = 50

[query]
user_id = "42"
start_date = "2025-03-01"
end_date = "2025-03-31"
scope_merge_requests = true

[report]
format = "json"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.concurrency, 4);
        assert!(config.general.allow_partial);
        assert_eq!(config.gitlab.url, "https://gitlab.example.com/api/v4");
        assert_eq!(config.gitlab.per_page, 50);
        assert_eq!(config.gitlab.max_pages, 50);
        assert_eq!(config.user_id(), "42");
        assert!(config.query.scope_merge_requests);
        assert_eq!(config.report.format, OutputFormat::Json);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gitlab]\ntimeout_seconds = 5").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.gitlab.timeout_seconds, 5);
        assert_eq!(config.gitlab.per_page, 100);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gitlab\nurl = 1").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_args_override_file() {
        let mut config = valid_config();
        config.gitlab.url = "https://file.example.com/api/v4".to_string();
        config.gitlab.per_page = 20;

        let args = Args::parse_from([
            "gitlab-activity",
            "--gitlab-url",
            "https://cli.example.com/api/v4",
            "--user-id",
            "7",
            "--since",
            "2025-01-01",
            "--scope-merge-requests",
            "--format",
            "markdown",
        ]);
        config.merge_with_args(&args);

        assert_eq!(config.gitlab.url, "https://cli.example.com/api/v4");
        assert_eq!(config.gitlab.per_page, 20);
        assert_eq!(config.user_id(), "7");
        assert_eq!(config.query.start_date.as_deref(), Some("2025-01-01"));
        assert_eq!(config.query.end_date.as_deref(), Some("2025-03-31"));
        assert!(config.query.scope_merge_requests);
        assert_eq!(config.report.format, OutputFormat::Markdown);
    }

    #[test]
    fn test_validate() {
        assert!(valid_config().validate().is_ok());

        let mut config = valid_config();
        config.gitlab.token = None;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.query.user_id = Some("  ".to_string());
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.gitlab.url = "gitlab.example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.gitlab.per_page = 1000;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.query.start_date = Some("2025-04-01".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_date_range_defaults_to_previous_month() {
        let mut config = valid_config();
        config.query.start_date = None;
        config.query.end_date = None;
        let today = NaiveDate::from_ymd_opt(2025, 4, 10).unwrap();

        let range = config.date_range_from(today).unwrap();
        assert_eq!(range.to_string(), "2025-03-01 .. 2025-03-31");
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[gitlab]"));
        assert!(!toml_str.contains("token"));
    }
}
