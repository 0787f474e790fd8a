//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.control-tree.toml` files.

use crate::correlate::MonitoringParameters;
use crate::ranking::RankingCriterion;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".control-tree.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Test ordering.
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Recognized monitoring parameters.
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Merge and grouping rules.
    #[serde(default)]
    pub rules: RulesConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of fetches allowed to run at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attach session-scope plots when a single session is requested.
    #[serde(default)]
    pub session_scope_plots: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
            session_scope_plots: false,
        }
    }
}

fn default_output() -> String {
    "control_tree.json".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Ordering of test nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default)]
    pub criterion: RankingCriterion,
}

/// Monitoring parameter groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Group key -> parameter names.
    #[serde(default = "default_monitoring_groups")]
    pub groups: BTreeMap<String, Vec<String>>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            groups: default_monitoring_groups(),
        }
    }
}

fn default_monitoring_groups() -> BTreeMap<String, Vec<String>> {
    let mut groups = BTreeMap::new();
    groups.insert(
        "os".to_string(),
        ["cpu", "memory", "disk", "network"]
            .into_iter()
            .map(String::from)
            .collect(),
    );
    groups.insert(
        "jvm".to_string(),
        ["heap", "non-heap", "gc", "threads"]
            .into_iter()
            .map(String::from)
            .collect(),
    );
    groups
}

/// Merge-stage rule: unites every leaf matching `pattern` into one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniteRuleConfig {
    pub id: String,
    pub display_name: String,
    pub pattern: String,
}

/// Shape-stage rule: a named group for leaves matching `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRuleConfig {
    pub id: String,
    pub display_name: String,
    pub pattern: String,
    #[serde(default)]
    pub children: Vec<GroupRuleConfig>,
}

/// Rule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_unite_rules")]
    pub unite: Vec<UniteRuleConfig>,

    #[serde(default = "default_group_rules")]
    pub groups: Vec<GroupRuleConfig>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            unite: default_unite_rules(),
            groups: default_group_rules(),
        }
    }
}

fn default_unite_rules() -> Vec<UniteRuleConfig> {
    vec![UniteRuleConfig {
        id: "latency-percentiles".to_string(),
        display_name: "Latency percentiles".to_string(),
        pattern: "^latency-p[0-9]+$".to_string(),
    }]
}

fn default_group_rules() -> Vec<GroupRuleConfig> {
    vec![
        GroupRuleConfig {
            id: "throughput".to_string(),
            display_name: "Throughput".to_string(),
            pattern: "throughput|tps".to_string(),
            children: Vec::new(),
        },
        GroupRuleConfig {
            id: "latency".to_string(),
            display_name: "Latency".to_string(),
            pattern: "latency".to_string(),
            children: vec![GroupRuleConfig {
                id: "percentiles".to_string(),
                display_name: "Percentiles".to_string(),
                pattern: "-p[0-9]+$|percentiles".to_string(),
                children: Vec::new(),
            }],
        },
        GroupRuleConfig {
            id: "errors".to_string(),
            display_name: "Errors".to_string(),
            pattern: "fail|error".to_string(),
            children: Vec::new(),
        },
    ]
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
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        if let Some(criterion) = args.ranking {
            self.ranking.criterion = criterion;
        }

        if args.session_scope_plots {
            self.general.session_scope_plots = true;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.general.concurrency == 0 {
            bail!("general.concurrency must be at least 1");
        }
        for (key, params) in &self.monitoring.groups {
            if params.is_empty() {
                bail!("monitoring group '{}' has no parameters", key);
            }
        }
        MonitoringParameters::try_new(&self.monitoring.groups)?;
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
