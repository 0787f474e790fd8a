//! Merge stage: uniting several leaves into one composite leaf.

use super::{compile_pattern, leaf_matches, MergeRule, MergeRuleProvider, RuleResult};
use crate::config::UniteRuleConfig;
use crate::correlate::{AgentNames, MonitoringParameters};
use crate::error::RuleError;
use crate::models::Leaf;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct CompiledUniteRule {
    id: String,
    display_name: String,
    pattern: Regex,
}

/// Provides [`UniteMetricsRule`]s from the configured `[[rules.unite]]` list.
pub struct UniteMetricsRuleProvider {
    rules: Arc<Vec<CompiledUniteRule>>,
    groups: BTreeMap<String, Vec<String>>,
    monitoring: MonitoringParameters,
}

impl UniteMetricsRuleProvider {
    pub fn new(
        config: &[UniteRuleConfig],
        groups: &BTreeMap<String, Vec<String>>,
    ) -> RuleResult<Self> {
        let mut ids = HashSet::new();
        let mut rules = Vec::with_capacity(config.len());

        for rule in config {
            if !ids.insert(rule.id.as_str()) {
                return Err(RuleError::DuplicateGroup {
                    parent: "rules.unite".to_string(),
                    id: rule.id.clone(),
                });
            }
            rules.push(CompiledUniteRule {
                id: rule.id.clone(),
                display_name: rule.display_name.clone(),
                pattern: compile_pattern(&rule.id, &rule.pattern)?,
            });
        }

        Ok(Self {
            rules: Arc::new(rules),
            groups: groups.clone(),
            monitoring: MonitoringParameters::try_new(groups)?,
        })
    }
}

impl<M: Leaf> MergeRuleProvider<M> for UniteMetricsRuleProvider {
    fn provide(&self, agent_names: Option<&AgentNames>) -> RuleResult<Box<dyn MergeRule<M>>> {
        Ok(Box::new(UniteMetricsRule {
            rules: Arc::clone(&self.rules),
            monitoring: self.monitoring.clone(),
            agent_names: agent_names.cloned(),
        }))
    }

    fn monitoring_plot_groups(&self) -> BTreeMap<String, Vec<String>> {
        self.groups.clone()
    }
}

/// Unites leaves by configured pattern and, with agent names, by
/// monitoring group and agent.
pub struct UniteMetricsRule {
    rules: Arc<Vec<CompiledUniteRule>>,
    monitoring: MonitoringParameters,
    agent_names: Option<AgentNames>,
}

impl<M: Leaf> MergeRule<M> for UniteMetricsRule {
    fn filter(&self, root_id: &str, leaves: &[M]) -> RuleResult<Vec<M>> {
        let mut sorted: Vec<&M> = leaves.iter().collect();
        sorted.sort_by(|a, b| a.id().cmp(b.id()));

        let mut united = Vec::new();

        for rule in self.rules.iter() {
            let members: Vec<&M> = sorted
                .iter()
                .copied()
                .filter(|leaf| leaf_matches(&rule.pattern, *leaf))
                .collect();
            if members.len() >= 2 {
                united.push(M::unite(
                    format!("{}:{}", root_id, rule.id),
                    rule.display_name.clone(),
                    &members,
                ));
            }
        }

        if let Some(agent_names) = &self.agent_names {
            for (group, agents) in agent_names {
                for agent in agents {
                    let members: Vec<&M> = sorted
                        .iter()
                        .copied()
                        .filter(|leaf| {
                            leaf.metric_names()
                                .iter()
                                .any(|n| self.monitoring.matches(group, agent, &n.metric_name))
                        })
                        .collect();
                    if !members.is_empty() {
                        united.push(M::unite(
                            format!("{}:{}@{}", root_id, group, agent),
                            format!("{} on {}", group, agent),
                            &members,
                        ));
                    }
                }
            }
        }

        let mut seen: HashSet<&str> = leaves.iter().map(|l| l.id()).collect();
        for node in &united {
            if !seen.insert(node.id()) {
                return Err(RuleError::IdCollision {
                    root: root_id.to_string(),
                    id: node.id().to_string(),
                });
            }
        }

        debug!("United {} composite nodes for {}", united.len(), root_id);
        Ok(united)
    }
}
