//! Shape stage: distributing leaves into named groups.

use super::{compile_pattern, leaf_matches, RuleResult, ShapeRule, ShapeRuleProvider};
use crate::config::GroupRuleConfig;
use crate::correlate::MonitoringParameters;
use crate::error::RuleError;
use crate::models::{Leaf, MetricGroupNode};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Id of the built-in group holding monitoring leaves.
pub const MONITORING_GROUP_ID: &str = "monitoring";
const MONITORING_GROUP_NAME: &str = "Monitoring";

#[derive(Debug)]
struct CompiledGroup {
    id: String,
    display_name: String,
    pattern: Regex,
    children: Vec<CompiledGroup>,
}

fn compile_groups(parent: &str, config: &[GroupRuleConfig]) -> RuleResult<Vec<CompiledGroup>> {
    let mut ids = HashSet::new();
    let mut groups = Vec::with_capacity(config.len());

    for group in config {
        if group.id.is_empty() || group.id.contains('/') {
            return Err(RuleError::InvalidGroupId {
                parent: parent.to_string(),
                id: group.id.clone(),
            });
        }
        let reserved = parent == "rules.groups" && group.id == MONITORING_GROUP_ID;
        if reserved || !ids.insert(group.id.as_str()) {
            return Err(RuleError::DuplicateGroup {
                parent: parent.to_string(),
                id: group.id.clone(),
            });
        }
        let path = format!("{}.{}", parent, group.id);
        groups.push(CompiledGroup {
            id: group.id.clone(),
            display_name: group.display_name.clone(),
            pattern: compile_pattern(&path, &group.pattern)?,
            children: compile_groups(&path, &group.children)?,
        });
    }

    Ok(groups)
}

/// Provides [`TreeGroupingRule`]s from the configured `[[rules.groups]]` tree.
pub struct TreeGroupingRuleProvider {
    groups: Arc<Vec<CompiledGroup>>,
    monitoring_groups: BTreeMap<String, Vec<String>>,
    monitoring: MonitoringParameters,
}

impl TreeGroupingRuleProvider {
    pub fn new(
        config: &[GroupRuleConfig],
        monitoring_groups: &BTreeMap<String, Vec<String>>,
    ) -> RuleResult<Self> {
        Ok(Self {
            groups: Arc::new(compile_groups("rules.groups", config)?),
            monitoring_groups: monitoring_groups.clone(),
            monitoring: MonitoringParameters::try_new(monitoring_groups)?,
        })
    }
}

impl<M: Leaf> ShapeRuleProvider<M> for TreeGroupingRuleProvider {
    fn provide(&self, root_id: &str, root_name: &str) -> RuleResult<Box<dyn ShapeRule<M>>> {
        Ok(Box::new(TreeGroupingRule {
            root_id: root_id.to_string(),
            root_name: root_name.to_string(),
            groups: Arc::clone(&self.groups),
            monitoring_keys: self.monitoring_groups.keys().cloned().collect(),
            monitoring: self.monitoring.clone(),
        }))
    }

    fn monitoring_plot_groups(&self) -> BTreeMap<String, Vec<String>> {
        self.monitoring_groups.clone()
    }
}

/// Groups monitoring leaves by group key and everything else by the
/// deepest matching configured group.
pub struct TreeGroupingRule {
    root_id: String,
    root_name: String,
    groups: Arc<Vec<CompiledGroup>>,
    monitoring_keys: Vec<String>,
    monitoring: MonitoringParameters,
}

fn skeleton<M: Leaf>(parent_id: &str, groups: &[CompiledGroup]) -> Vec<MetricGroupNode<M>> {
    groups
        .iter()
        .map(|g| {
            let id = format!("{}/{}", parent_id, g.id);
            let mut node = MetricGroupNode::new(id.clone(), g.display_name.clone());
            node.groups = skeleton(&id, &g.children);
            node
        })
        .collect()
}

/// Indices of the deepest matching group path, first match per level.
fn match_path<M: Leaf>(groups: &[CompiledGroup], leaf: &M) -> Vec<usize> {
    let mut path = Vec::new();
    let mut level = groups;
    while let Some(index) = level.iter().position(|g| leaf_matches(&g.pattern, leaf)) {
        path.push(index);
        level = &level[index].children;
    }
    path
}

impl TreeGroupingRule {
    /// Group key of a leaf whose metric names are all monitoring metrics.
    fn monitoring_key<M: Leaf>(&self, leaf: &M) -> Option<usize> {
        let names = leaf.metric_names();
        let first = self.monitoring.group_of_metric(&names.first()?.metric_name)?;
        if names
            .iter()
            .all(|n| self.monitoring.group_of_metric(&n.metric_name).is_some())
        {
            self.monitoring_keys.iter().position(|k| k == first)
        } else {
            None
        }
    }
}

impl<M: Leaf> ShapeRule<M> for TreeGroupingRule {
    fn filter(&self, leaves: Vec<M>) -> RuleResult<MetricGroupNode<M>> {
        let mut root = MetricGroupNode::new(self.root_id.clone(), self.root_name.clone());
        root.groups = skeleton(&self.root_id, &self.groups);

        let monitoring_id = format!("{}/{}", self.root_id, MONITORING_GROUP_ID);
        let mut monitoring = MetricGroupNode::new(monitoring_id.clone(), MONITORING_GROUP_NAME);
        monitoring.groups = self
            .monitoring_keys
            .iter()
            .map(|key| MetricGroupNode::new(format!("{}/{}", monitoring_id, key), key.clone()))
            .collect();

        let mut seen = HashSet::new();
        for leaf in leaves {
            if !seen.insert(leaf.id().to_string()) {
                return Err(RuleError::IdCollision {
                    root: self.root_id.clone(),
                    id: leaf.id().to_string(),
                });
            }

            if let Some(key) = self.monitoring_key(&leaf) {
                monitoring.groups[key].leaves.push(leaf);
                continue;
            }

            let path = match_path(&self.groups, &leaf);
            let mut target = &mut root;
            for index in path {
                target = &mut target.groups[index];
            }
            target.leaves.push(leaf);
        }

        root.groups.push(monitoring);
        root.prune_empty();
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricNode, PlotNode, PlotSource};

    fn group(id: &str, pattern: &str, children: Vec<GroupRuleConfig>) -> GroupRuleConfig {
        GroupRuleConfig {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            pattern: pattern.to_string(),
            children,
        }
    }

    fn provider() -> TreeGroupingRuleProvider {
        let config = vec![
            group("throughput", "throughput", vec![]),
            group(
                "latency",
                "latency",
                vec![group("percentiles", "-p[0-9]+$", vec![])],
            ),
        ];
        let mut monitoring = BTreeMap::new();
        monitoring.insert("os".to_string(), vec!["cpu".to_string()]);
        monitoring.insert("jvm".to_string(), vec!["heap".to_string()]);
        TreeGroupingRuleProvider::new(&config, &monitoring).unwrap()
    }

    #[test]
    fn test_leaves_land_in_deepest_matching_group() {
        let leaves = vec![
            MetricNode::new("tps", "throughput"),
            MetricNode::new("avg", "latency-avg"),
            MetricNode::new("p99", "latency-p99"),
            MetricNode::new("odd", "something-else"),
        ];
        let rule: Box<dyn ShapeRule<MetricNode>> = provider().provide("r", "r").unwrap();

        let tree = rule.filter(leaves).unwrap();

        assert_eq!(tree.id, "r");
        assert_eq!(tree.leaves[0].id, "odd");
        assert_eq!(tree.find_group("r/throughput").unwrap().leaves[0].id, "tps");
        assert_eq!(tree.find_group("r/latency").unwrap().leaves[0].id, "avg");
        assert_eq!(
            tree.find_group("r/latency/percentiles").unwrap().leaves[0].id,
            "p99"
        );
        assert_eq!(tree.leaf_count(), 4);
    }

    #[test]
    fn test_monitoring_leaves_grouped_by_key() {
        let leaves = vec![
            PlotNode::new("cpu", "cpu@hostA", PlotSource::Monitoring),
            PlotNode::new("heap", "heap@hostA", PlotSource::Monitoring),
            PlotNode::new("unknown", "disk@hostA", PlotSource::Monitoring),
        ];
        let rule: Box<dyn ShapeRule<PlotNode>> = provider().provide("r", "r").unwrap();

        let tree = rule.filter(leaves).unwrap();

        assert_eq!(tree.find_group("r/monitoring/os").unwrap().leaves[0].id, "cpu");
        assert_eq!(tree.find_group("r/monitoring/jvm").unwrap().leaves[0].id, "heap");
        assert_eq!(tree.leaves[0].id, "unknown");
    }

    #[test]
    fn test_empty_groups_are_pruned() {
        let rule: Box<dyn ShapeRule<MetricNode>> = provider().provide("r", "r").unwrap();
        let tree = rule.filter(vec![MetricNode::new("tps", "throughput")]).unwrap();
        assert_eq!(tree.group_ids(), vec!["r", "r/throughput"]);
    }

    #[test]
    fn test_group_ids_unique_and_deterministic() {
        let leaves = || {
            vec![
                MetricNode::new("tps", "throughput"),
                MetricNode::new("p99", "latency-p99"),
                MetricNode::new("cpu", "cpu@h1"),
            ]
        };
        let rule: Box<dyn ShapeRule<MetricNode>> = provider().provide("r", "r").unwrap();

        let first = rule.filter(leaves()).unwrap();
        let second = rule.filter(leaves()).unwrap();

        let ids = first.group_ids();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_leaf_id_is_collision() {
        let leaves = vec![
            MetricNode::new("same", "throughput"),
            MetricNode::new("same", "latency"),
        ];
        let rule: Box<dyn ShapeRule<MetricNode>> = provider().provide("r", "r").unwrap();
        assert!(matches!(
            rule.filter(leaves),
            Err(RuleError::IdCollision { .. })
        ));
    }

    #[test]
    fn test_duplicate_sibling_groups_rejected() {
        let config = vec![group("a", "a", vec![]), group("a", "b", vec![])];
        assert!(matches!(
            TreeGroupingRuleProvider::new(&config, &BTreeMap::new()),
            Err(RuleError::DuplicateGroup { .. })
        ));

        let reserved = vec![group(MONITORING_GROUP_ID, "x", vec![])];
        assert!(TreeGroupingRuleProvider::new(&reserved, &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_group_ids_with_separator_rejected() {
        let mut monitoring = BTreeMap::new();
        monitoring.insert("os".to_string(), vec!["cpu".to_string()]);

        let shadowing = vec![group("monitoring/os", "latency", vec![])];
        assert_eq!(
            TreeGroupingRuleProvider::new(&shadowing, &monitoring).err(),
            Some(RuleError::InvalidGroupId {
                parent: "rules.groups".to_string(),
                id: "monitoring/os".to_string(),
            })
        );

        let nested = vec![group("latency", "latency", vec![group("p/99", "p99", vec![])])];
        assert!(matches!(
            TreeGroupingRuleProvider::new(&nested, &monitoring),
            Err(RuleError::InvalidGroupId { .. })
        ));

        let empty = vec![group("", "latency", vec![])];
        assert!(matches!(
            TreeGroupingRuleProvider::new(&empty, &monitoring),
            Err(RuleError::InvalidGroupId { .. })
        ));
    }

    #[test]
    fn test_shared_monitoring_parameter_rejected() {
        let mut monitoring = BTreeMap::new();
        monitoring.insert("os".to_string(), vec!["gc".to_string()]);
        monitoring.insert("jvm".to_string(), vec!["gc".to_string()]);

        assert!(matches!(
            TreeGroupingRuleProvider::new(&[], &monitoring),
            Err(RuleError::SharedParameter { .. })
        ));
    }

    #[test]
    fn test_agent_composites_stay_under_their_group() {
        let rule: Box<dyn ShapeRule<PlotNode>> = provider().provide("r", "r").unwrap();
        let mut os = PlotNode::new("r:os@h1", "cpu@h1", PlotSource::Monitoring);
        os.display_name = "os on h1".to_string();
        let mut jvm = PlotNode::new("r:jvm@h1", "heap@h1", PlotSource::Monitoring);
        jvm.display_name = "jvm on h1".to_string();

        let tree = rule.filter(vec![os, jvm]).unwrap();

        let os_ids: Vec<&str> = tree
            .find_group("r/monitoring/os")
            .unwrap()
            .leaves
            .iter()
            .map(|l| l.id.as_str())
            .collect();
        let jvm_ids: Vec<&str> = tree
            .find_group("r/monitoring/jvm")
            .unwrap()
            .leaves
            .iter()
            .map(|l| l.id.as_str())
            .collect();
        assert_eq!(os_ids, vec!["r:os@h1"]);
        assert_eq!(jvm_ids, vec!["r:jvm@h1"]);
    }
}
