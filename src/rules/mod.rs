//! Rules that shape a flat leaf list into a tree.
//!
//! Grouping happens in two stages:
//! - a merge rule unites related leaves into composite leaves
//! - a shape rule distributes all leaves into a tree of groups
//!
//! Both are produced per request by a provider, and both work for any
//! [`Leaf`] type.

pub mod grouping;
pub mod unite;

use crate::correlate::AgentNames;
use crate::error::RuleError;
use crate::models::{Leaf, MetricGroupNode};
use regex::Regex;
use std::collections::BTreeMap;

pub use grouping::TreeGroupingRuleProvider;
pub use unite::UniteMetricsRuleProvider;

pub type RuleResult<T> = std::result::Result<T, RuleError>;

/// Merge stage: returns new composite leaves, never the inputs.
pub trait MergeRule<M: Leaf>: Send + Sync {
    fn filter(&self, root_id: &str, leaves: &[M]) -> RuleResult<Vec<M>>;
}

/// Shape stage: builds the grouped tree out of every leaf.
pub trait ShapeRule<M: Leaf>: Send + Sync {
    fn filter(&self, leaves: Vec<M>) -> RuleResult<MetricGroupNode<M>>;
}

pub trait MergeRuleProvider<M: Leaf>: Send + Sync {
    /// A merge rule for one tree; `agent_names` is absent for trees
    /// without monitoring data.
    fn provide(&self, agent_names: Option<&AgentNames>) -> RuleResult<Box<dyn MergeRule<M>>>;

    /// Monitoring parameter names by group key.
    fn monitoring_plot_groups(&self) -> BTreeMap<String, Vec<String>>;
}

pub trait ShapeRuleProvider<M: Leaf>: Send + Sync {
    /// A shape rule producing a root group with the given id and name.
    fn provide(&self, root_id: &str, root_name: &str) -> RuleResult<Box<dyn ShapeRule<M>>>;

    /// Monitoring parameter names by group key.
    fn monitoring_plot_groups(&self) -> BTreeMap<String, Vec<String>>;
}

/// Compiles a configured pattern, naming the rule on failure.
fn compile_pattern(rule: &str, pattern: &str) -> RuleResult<Regex> {
    Regex::new(pattern).map_err(|e| RuleError::InvalidPattern {
        rule: rule.to_string(),
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Whether any of a leaf's metric names, or its display name, matches.
fn leaf_matches<M: Leaf>(pattern: &Regex, leaf: &M) -> bool {
    pattern.is_match(leaf.display_name())
        || leaf
            .metric_names()
            .iter()
            .any(|name| pattern.is_match(&name.metric_name))
}
