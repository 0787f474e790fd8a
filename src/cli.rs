//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::ranking::RankingCriterion;
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// control-tree - navigation trees for performance test sessions
///
/// Builds the "Summary & Trends" and "Metrics" control trees of one or
/// more test sessions from a data snapshot.
///
/// Examples:
///   control-tree --sessions s1 --data snapshot.json
///   control-tree --sessions s1,s2 --data snapshot.json --format markdown
///   control-tree --sessions s1 --data snapshot.json --session-scope-plots
///   control-tree --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Session ids to aggregate (comma-separated)
    #[arg(
        short,
        long,
        value_name = "IDS",
        value_delimiter = ',',
        required_unless_present = "init_config"
    )]
    pub sessions: Vec<String>,

    /// Data snapshot to read sessions from
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "CONTROL_TREE_DATA",
        required_unless_present = "init_config"
    )]
    pub data: Option<PathBuf>,

    /// Output file path for the tree
    ///
    /// Defaults to general.output from the config file.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (json, markdown)
    #[arg(long, default_value = "json", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .control-tree.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum number of concurrent fetches
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Order of tests within each view
    #[arg(long, value_name = "CRITERION")]
    pub ranking: Option<RankingCriterion>,

    /// Include session-wide plots (single session only)
    #[arg(long)]
    pub session_scope_plots: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .control-tree.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Markdown outline
    Markdown,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The requested sessions, deduplicated and sorted.
    pub fn session_ids(&self) -> BTreeSet<String> {
        self.sessions
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.session_ids().is_empty() {
            return Err("At least one session id is required".to_string());
        }

        if let Some(concurrency) = self.concurrency {
            if concurrency == 0 {
                return Err("Concurrency must be at least 1".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match self.data {
            None => return Err("A data snapshot is required (--data)".to_string()),
            Some(ref path) if !path.is_file() => {
                return Err(format!("Data snapshot does not exist: {}", path.display()));
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `--quiet` wins over a config file asking for verbose output.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
