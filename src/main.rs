//! control-tree - control tree aggregation for performance test sessions
//!
//! A CLI tool that reads session data from a snapshot, builds the summary
//! and details navigation trees concurrently and writes them as JSON or
//! as a Markdown outline.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Any error (config, snapshot, aggregation, output)

mod cli;
mod config;
mod correlate;
mod error;
mod fetcher;
mod models;
mod pipeline;
mod ranking;
mod report;
mod rules;
mod tree;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use fetcher::SnapshotFetcher;
use indicatif::{ProgressBar, ProgressStyle};
use report::{Report, ReportMetadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tree::ControlTreeBuilder;

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

    let (mut config, source) = load_config(&args);
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("control-tree v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match source {
        ConfigSource::File(ref path) => info!("Loaded config from: {}", path.display()),
        ConfigSource::Defaults => debug!("No config file found, using defaults"),
        ConfigSource::Fallback(ref e) => warn!("Failed to load config: {:#}", e),
    }

    if let Err(e) = run(args, config).await {
        error!("Control tree failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .control-tree.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize rules, monitoring groups and ranking.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Build the tree and write it out.
async fn run(args: Args, config: Config) -> Result<()> {
    let start_time = Instant::now();

    config.validate().context("Invalid configuration")?;

    let session_ids = args.session_ids();
    let data_path = args
        .data
        .as_deref()
        .context("A data snapshot is required (--data)")?;

    println!("📥 Loading snapshot: {}", data_path.display());
    let fetcher = SnapshotFetcher::load(data_path)?;

    let builder = ControlTreeBuilder::from_config(Arc::new(fetcher), &config)
        .context("Failed to compile rules")?;

    let spinner = if args.quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
        );
        pb.set_message(format!(
            "Building control tree for {} session(s)...",
            session_ids.len()
        ));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    };

    let tree = builder.build_control_tree(&session_ids).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let tree = tree?;

    let report = Report {
        metadata: ReportMetadata {
            sessions: session_ids.into_iter().collect(),
            generated_at: Utc::now(),
            tests: tree.summary.tests.len(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        tree,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = Path::new(&config.general.output);
    std::fs::write(output_path, &output)
        .with_context(|| format!("Failed to write tree to {}", output_path.display()))?;

    let summary = &report.tree.summary;
    let details = &report.tree.details;
    println!("\n📊 Control Tree Summary:");
    println!("   Sessions: {}", report.metadata.sessions.join(", "));
    println!("   Tests: {}", summary.tests.len());
    println!(
        "   Metrics: {} | Plots: {}",
        summary
            .tests
            .iter()
            .map(|t| t.metrics.leaf_count())
            .sum::<usize>(),
        details
            .tests
            .iter()
            .map(|t| t.plots.leaf_count())
            .sum::<usize>()
    );
    if let Some(ref scope) = details.session_scope_plots {
        println!("   Session scope plots: {}", scope.plots.len());
    }
    println!("   Duration: {:.3}s", report.metadata.duration_seconds);
    println!("\n✅ Control tree saved to: {}", output_path.display());

    Ok(())
}

/// Where the configuration came from.
enum ConfigSource {
    File(PathBuf),
    Defaults,
    /// The default file exists but could not be loaded.
    Fallback(anyhow::Error),
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so the outcome is returned for the
/// caller to log. An explicit `--config` that fails to load exits.
fn load_config(args: &Args) -> (Config, ConfigSource) {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return match Config::load(config_path) {
            Ok(config) => (config, ConfigSource::File(config_path.clone())),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        };
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => (config, ConfigSource::File(PathBuf::from(DEFAULT_CONFIG_FILE))),
        Ok(None) => (Config::default(), ConfigSource::Defaults),
        Err(e) => (Config::default(), ConfigSource::Fallback(e)),
    }
}
