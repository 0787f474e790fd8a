//! Data models for the control tree.
//!
//! This module contains the node types that make up a control tree
//! (summary and details views) along with the task and metric
//! descriptors they are built from.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Fixed node ids and id prefixes shared with the UI.
pub mod tokens {
    /// Prefix of a summary test subtree root id.
    pub const SUMMARY_PREFIX: &str = "summary-";
    /// Prefix of a details test subtree root id.
    pub const METRICS_PREFIX: &str = "metrics-";
    pub const TEST_INFO: &str = "Test Info";
    pub const SESSION_INFO: &str = "Session Info";
    pub const CONTROL_SUMMARY_TRENDS: &str = "Summary & Trends";
    pub const CONTROL_METRICS: &str = "Metrics";
    pub const SESSION_SCOPE_PLOTS: &str = "Session Scope Plots";
}

/// One executed test within a session.
///
/// Used as a map key by the data fetcher and as the source of the
/// deterministic root id of the test's subtrees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskData {
    /// Session the task ran in.
    #[serde(default)]
    pub session_id: String,
    /// Task identifier, unique within its session.
    pub task_id: String,
    /// Human-readable task name.
    pub task_name: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: String,
    /// Ranking priority; higher values surface first.
    #[serde(default)]
    pub priority: i32,
}

impl TaskData {
    /// Creates a task with no description and default priority.
    #[allow(dead_code)] // Convenience constructor, used by tests
    pub fn new(
        session_id: impl Into<String>,
        task_id: impl Into<String>,
        task_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            task_id: task_id.into(),
            task_name: task_name.into(),
            description: String::new(),
            priority: 0,
        }
    }

    /// Content digest of the task: hex of the first 8 bytes of a SHA-256
    /// over every field.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.session_id.as_str(),
            self.task_id.as_str(),
            self.task_name.as_str(),
            self.description.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.priority.to_be_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

impl fmt::Display for TaskData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}/{}]", self.task_name, self.session_id, self.task_id)
    }
}

/// Name of one underlying metric.
///
/// Monitoring metrics encode the producing agent in `metric_name`
/// as `"<parameter>@<agent>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricNameDescriptor {
    pub metric_name: String,
    #[serde(default)]
    pub display_name: String,
}

impl MetricNameDescriptor {
    pub fn new(metric_name: impl Into<String>) -> Self {
        let metric_name = metric_name.into();
        Self {
            display_name: metric_name.clone(),
            metric_name,
        }
    }
}

/// Capability shared by every leaf type the grouping pipeline handles.
pub trait Leaf: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn metric_names(&self) -> &[MetricNameDescriptor];

    /// Builds a composite leaf out of several existing ones.
    fn unite(id: String, display_name: String, members: &[&Self]) -> Self;
}

/// Collects member metric names in order, dropping duplicates.
fn united_metric_names<M: Leaf>(members: &[&M]) -> Vec<MetricNameDescriptor> {
    let mut names: Vec<MetricNameDescriptor> = Vec::new();
    for member in members {
        for name in member.metric_names() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

/// A summary leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricNode {
    pub id: String,
    pub display_name: String,
    pub metric_names: Vec<MetricNameDescriptor>,
}

impl MetricNode {
    #[allow(dead_code)] // Convenience constructor, used by tests
    pub fn new(id: impl Into<String>, metric_name: impl Into<String>) -> Self {
        let name = MetricNameDescriptor::new(metric_name);
        Self {
            id: id.into(),
            display_name: name.display_name.clone(),
            metric_names: vec![name],
        }
    }
}

impl Leaf for MetricNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn metric_names(&self) -> &[MetricNameDescriptor] {
        &self.metric_names
    }

    fn unite(id: String, display_name: String, members: &[&Self]) -> Self {
        Self {
            id,
            display_name,
            metric_names: united_metric_names(members),
        }
    }
}

/// Where a plot's data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlotSource {
    /// Test metrics (latency, throughput, ...)
    #[default]
    Metric,
    /// Host/agent monitoring
    Monitoring,
    /// Session-wide monitoring, not bound to a test
    SessionScope,
}

/// A details leaf: one chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotNode {
    pub id: String,
    pub display_name: String,
    pub metric_names: Vec<MetricNameDescriptor>,
    #[serde(default)]
    pub source: PlotSource,
}

impl PlotNode {
    #[allow(dead_code)] // Convenience constructor, used by tests
    pub fn new(id: impl Into<String>, metric_name: impl Into<String>, source: PlotSource) -> Self {
        let name = MetricNameDescriptor::new(metric_name);
        Self {
            id: id.into(),
            display_name: name.display_name.clone(),
            metric_names: vec![name],
            source,
        }
    }
}

impl Leaf for PlotNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn metric_names(&self) -> &[MetricNameDescriptor] {
        &self.metric_names
    }

    fn unite(id: String, display_name: String, members: &[&Self]) -> Self {
        let source = match members.first() {
            Some(first) if members.iter().all(|m| m.source == first.source) => first.source,
            _ => PlotSource::Metric,
        };
        Self {
            id,
            display_name,
            metric_names: united_metric_names(members),
            source,
        }
    }
}

/// A group of leaves and nested groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricGroupNode<M> {
    pub id: String,
    pub display_name: String,
    pub groups: Vec<MetricGroupNode<M>>,
    pub leaves: Vec<M>,
}

impl<M: Leaf> MetricGroupNode<M> {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            groups: Vec::new(),
            leaves: Vec::new(),
        }
    }

    /// True when neither this group nor any nested group holds a leaf.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.groups.iter().all(|g| g.is_empty())
    }

    /// Total number of leaves in this subtree.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len() + self.groups.iter().map(|g| g.leaf_count()).sum::<usize>()
    }

    /// Ids of this group and every nested group, depth first.
    #[allow(dead_code)] // Inspection utility, used by tests
    pub fn group_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.id.as_str()];
        for group in &self.groups {
            ids.extend(group.group_ids());
        }
        ids
    }

    /// Every leaf in this subtree, depth first.
    #[allow(dead_code)] // Inspection utility, used by tests
    pub fn all_leaves(&self) -> Vec<&M> {
        let mut leaves: Vec<&M> = self.leaves.iter().collect();
        for group in &self.groups {
            leaves.extend(group.all_leaves());
        }
        leaves
    }

    /// Finds a group by id anywhere in this subtree.
    #[allow(dead_code)] // Lookup utility, used by tests
    pub fn find_group(&self, id: &str) -> Option<&MetricGroupNode<M>> {
        if self.id == id {
            return Some(self);
        }
        self.groups.iter().find_map(|g| g.find_group(id))
    }

    /// Drops every nested group that holds no leaf.
    pub fn prune_empty(&mut self) {
        for group in &mut self.groups {
            group.prune_empty();
        }
        self.groups.retain(|g| !g.is_empty());
    }
}

/// A name/value info line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoLeaf {
    pub name: String,
    pub value: String,
}

/// Info lines describing one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInfoNode {
    pub id: String,
    pub display_name: String,
    pub info: Vec<InfoLeaf>,
}

/// Info lines describing the requested sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfoNode {
    pub id: String,
    pub display_name: String,
    pub info: Vec<InfoLeaf>,
}

impl SessionInfoNode {
    pub fn new(info: Vec<InfoLeaf>) -> Self {
        Self {
            id: tokens::SESSION_INFO.to_string(),
            display_name: tokens::SESSION_INFO.to_string(),
            info,
        }
    }
}

/// Summary subtree of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestNode {
    pub id: String,
    pub display_name: String,
    pub task: TaskData,
    pub test_info: TestInfoNode,
    pub metrics: MetricGroupNode<MetricNode>,
}

impl TestNode {
    /// Wraps a grouped metric tree; the test takes the tree's id.
    pub fn new(metrics: MetricGroupNode<MetricNode>, task: TaskData, info: Vec<InfoLeaf>) -> Self {
        let id = metrics.id.clone();
        Self {
            test_info: TestInfoNode {
                id: format!("{}{}", tokens::TEST_INFO, id),
                display_name: tokens::TEST_INFO.to_string(),
                info,
            },
            display_name: task.task_name.clone(),
            id,
            task,
            metrics,
        }
    }
}

/// Details subtree of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDetailsNode {
    pub id: String,
    pub display_name: String,
    pub task: TaskData,
    pub plots: MetricGroupNode<PlotNode>,
}

impl TestDetailsNode {
    pub fn new(plots: MetricGroupNode<PlotNode>, task: TaskData) -> Self {
        Self {
            id: plots.id.clone(),
            display_name: task.task_name.clone(),
            task,
            plots,
        }
    }
}

/// Session-wide plots, only offered for a single session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionScopePlotsNode {
    pub id: String,
    pub display_name: String,
    pub plots: Vec<PlotNode>,
}

impl SessionScopePlotsNode {
    pub fn new(plots: Vec<PlotNode>) -> Self {
        Self {
            id: tokens::SESSION_SCOPE_PLOTS.to_string(),
            display_name: tokens::SESSION_SCOPE_PLOTS.to_string(),
            plots,
        }
    }
}

/// Top-level summary container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryNode {
    pub id: String,
    pub display_name: String,
    pub session_info: SessionInfoNode,
    pub tests: Vec<TestNode>,
}

impl SummaryNode {
    pub fn new(session_info: SessionInfoNode) -> Self {
        Self {
            id: tokens::CONTROL_SUMMARY_TRENDS.to_string(),
            display_name: tokens::CONTROL_SUMMARY_TRENDS.to_string(),
            session_info,
            tests: Vec::new(),
        }
    }
}

/// Top-level details container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailsNode {
    pub id: String,
    pub display_name: String,
    pub tests: Vec<TestDetailsNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_scope_plots: Option<SessionScopePlotsNode>,
}

impl Default for DetailsNode {
    fn default() -> Self {
        Self {
            id: tokens::CONTROL_METRICS.to_string(),
            display_name: tokens::CONTROL_METRICS.to_string(),
            tests: Vec::new(),
            session_scope_plots: None,
        }
    }
}

/// The complete control tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootNode {
    pub summary: SummaryNode,
    pub details: DetailsNode,
}

impl RootNode {
    /// A structurally valid tree with no tests.
    pub fn empty() -> Self {
        Self {
            summary: SummaryNode::new(SessionInfoNode::new(Vec::new())),
            details: DetailsNode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_digest_is_stable_and_content_based() {
        let a = TaskData::new("s1", "t1", "login");
        let b = TaskData::new("s1", "t1", "login");
        let c = TaskData::new("s2", "t1", "login");

        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 16);
    }

    #[test]
    fn test_unite_dedupes_metric_names() {
        let a = MetricNode::new("a", "latency");
        let b = MetricNode::new("b", "latency");
        let c = MetricNode::new("c", "throughput");

        let united = MetricNode::unite("u".to_string(), "United".to_string(), &[&a, &b, &c]);

        assert_eq!(united.metric_names.len(), 2);
        assert_eq!(united.metric_names[0].metric_name, "latency");
        assert_eq!(united.metric_names[1].metric_name, "throughput");
    }

    #[test]
    fn test_plot_unite_keeps_common_source() {
        let a = PlotNode::new("a", "cpu@h1", PlotSource::Monitoring);
        let b = PlotNode::new("b", "cpu@h2", PlotSource::Monitoring);
        let c = PlotNode::new("c", "latency", PlotSource::Metric);

        let monitoring = PlotNode::unite("m".into(), "M".into(), &[&a, &b]);
        let mixed = PlotNode::unite("x".into(), "X".into(), &[&a, &c]);

        assert_eq!(monitoring.source, PlotSource::Monitoring);
        assert_eq!(mixed.source, PlotSource::Metric);
    }

    #[test]
    fn test_group_prune_and_counts() {
        let mut root: MetricGroupNode<MetricNode> = MetricGroupNode::new("root", "Root");
        let mut full = MetricGroupNode::new("root/full", "Full");
        full.leaves.push(MetricNode::new("l1", "latency"));
        root.groups.push(full);
        root.groups.push(MetricGroupNode::new("root/empty", "Empty"));

        root.prune_empty();

        assert_eq!(root.group_ids(), vec!["root", "root/full"]);
        assert_eq!(root.leaf_count(), 1);
        assert!(root.find_group("root/empty").is_none());
    }

    #[test]
    fn test_test_node_info_id() {
        let task = TaskData::new("s1", "t1", "login");
        let node = TestNode::new(MetricGroupNode::new("summary-abc", "summary-abc"), task, vec![]);

        assert_eq!(node.id, "summary-abc");
        assert_eq!(node.display_name, "login");
        assert_eq!(node.test_info.id, "Test Infosummary-abc");
    }

    #[test]
    fn test_empty_root() {
        let root = RootNode::empty();
        assert!(root.summary.tests.is_empty());
        assert!(root.details.tests.is_empty());
        assert!(root.details.session_scope_plots.is_none());
    }
}
