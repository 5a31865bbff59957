//! gitlab-activity - GitLab activity reporter
//!
//! A CLI tool that aggregates one user's commits, merge requests and
//! changed lines across every project a GitLab token can see.
//!
//! Exit codes:
//!   0 - Success (every query answered, or --allow-partial set)
//!   1 - Runtime error (invalid configuration, HTTP client, output file)
//!   2 - Incomplete data (project listing or some queries failed)

mod analysis;
mod cli;
mod client;
mod config;
mod models;
mod report;

use analysis::{Aggregator, AggregatorConfig};
use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use client::{ClientConfig, Endpoints, GitLabClient};
use config::Config;
use models::RunOutcome;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit code for a report built from incomplete data.
const EXIT_INCOMPLETE: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("gitlab-activity v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_report(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Report failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .gitlab-activity.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE_NAME);
    println!("   Set GITLAB_TOKEN in the environment rather than in the file.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so a report printed on stdout stays machine-readable.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete report workflow. Returns the exit code.
async fn run_report(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    let range = config.date_range()?;
    let user_id = config.user_id();
    let token = config.gitlab.token.clone().unwrap_or_default();

    let client = GitLabClient::new(&ClientConfig {
        token,
        timeout_seconds: config.gitlab.timeout_seconds,
        concurrency: config.general.concurrency,
    })?;
    let endpoints = Endpoints::new(&config.gitlab.url, config.gitlab.per_page);

    let aggregator = Aggregator::new(
        client,
        endpoints,
        AggregatorConfig {
            user_id: user_id.clone(),
            range,
            scope_merge_requests: config.query.scope_merge_requests,
            max_pages: config.gitlab.max_pages,
        },
    )
    .with_progress(!args.quiet && std::io::stderr().is_terminal());

    eprintln!(
        "🔍 Collecting GitLab activity of user {} ({}) from {}",
        user_id, range, config.gitlab.url
    );
    if !config.query.scope_merge_requests {
        debug!("Merge request counts are lifetime totals (not range-scoped)");
    }

    let outcome = aggregator.run().await;
    let allow_partial = config.general.allow_partial;
    let code = exit_code(&outcome, allow_partial);

    let report = match outcome {
        RunOutcome::NoProjects { discovery } => {
            println!("{}", report::no_projects_message(&discovery));
            return Ok(code);
        }
        RunOutcome::Report(report) => report,
    };

    let format = config.report.format;
    let output = report::render(&report, format)?;

    match config.report.output {
        Some(ref path) => {
            let path = PathBuf::from(path);
            report::write_report(&path, &output)?;
            eprintln!("✅ Report saved to: {}", path.display());
        }
        None => {
            if format == OutputFormat::Text {
                println!();
            }
            print!("{}", output);
            if format == OutputFormat::Json {
                println!();
            }
        }
    }

    info!(
        "Processed {} projects in {:.1}s",
        report.projects_processed,
        start_time.elapsed().as_secs_f64()
    );

    if !report.is_complete() {
        let causes = report.incomplete_causes().join(", ");
        if allow_partial {
            warn!(
                "Report is incomplete ({}); exiting successfully because partial results are allowed",
                causes
            );
        } else {
            eprintln!(
                "\n⛔ Report is incomplete ({}); totals are lower bounds (exit code {}).",
                causes, code
            );
        }
    }

    Ok(code)
}

/// Map a run outcome to the process exit status.
///
/// A failed project listing with nothing gathered is not a partial result,
/// so `allow_partial` does not turn it into success.
fn exit_code(outcome: &RunOutcome, allow_partial: bool) -> i32 {
    match outcome {
        RunOutcome::NoProjects { discovery } if discovery.error.is_some() => EXIT_INCOMPLETE,
        RunOutcome::NoProjects { .. } => 0,
        RunOutcome::Report(report) if report.is_complete() || allow_partial => 0,
        RunOutcome::Report(_) => EXIT_INCOMPLETE,
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
