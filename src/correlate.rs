//! Agent-name correlation for monitoring parameters.
//!
//! Monitoring metric ids carry the agent that produced them
//! (`"cpu@host1"`). This module recovers, per monitoring group, the set
//! of agents seen in one request.

use crate::error::RuleError;
use crate::models::Leaf;
use std::collections::{BTreeMap, BTreeSet};

/// Separator between parameter and agent in a monitoring metric id.
pub const AGENT_DELIMITER: char = '@';

/// Monitoring group key -> agents observed producing its parameters.
pub type AgentNames = BTreeMap<String, BTreeSet<String>>;

/// Splits `"<parameter>@<agent>"`; ordinary metric names yield `None`.
pub fn split_monitoring_metric_id(metric_name: &str) -> Option<(&str, &str)> {
    let (parameter, agent) = metric_name.split_once(AGENT_DELIMITER)?;
    if parameter.is_empty() || agent.is_empty() {
        return None;
    }
    Some((parameter, agent))
}

/// Recognized monitoring parameters, by group key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoringParameters {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl MonitoringParameters {
    pub fn new(groups: &BTreeMap<String, Vec<String>>) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|(key, params)| (key.clone(), params.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Builds the table, rejecting malformed group keys and parameters
    /// listed under more than one group.
    pub fn try_new(groups: &BTreeMap<String, Vec<String>>) -> Result<Self, RuleError> {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for (key, params) in groups {
            if key.is_empty() || key.contains('/') {
                return Err(RuleError::InvalidGroupId {
                    parent: "monitoring.groups".to_string(),
                    id: key.clone(),
                });
            }
            for param in params {
                if let Some(first) = owners.insert(param.as_str(), key.as_str()) {
                    if first != key {
                        return Err(RuleError::SharedParameter {
                            parameter: param.clone(),
                            first: first.to_string(),
                            second: key.clone(),
                        });
                    }
                }
            }
        }
        Ok(Self::new(groups))
    }

    /// Group keys whose parameter table contains `parameter`.
    pub fn groups_of<'a>(&'a self, parameter: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.groups
            .iter()
            .filter(move |(_, params)| params.contains(parameter))
            .map(|(key, _)| key.as_str())
    }

    /// The group a metric name belongs to, if it is a recognized
    /// monitoring metric.
    pub fn group_of_metric(&self, metric_name: &str) -> Option<&str> {
        let (parameter, _) = split_monitoring_metric_id(metric_name)?;
        self.groups
            .iter()
            .find(|(_, params)| params.contains(parameter))
            .map(|(key, _)| key.as_str())
    }

    /// Whether `metric_name` is `parameter@agent` for a parameter of `group`.
    pub fn matches(&self, group: &str, agent: &str, metric_name: &str) -> bool {
        match split_monitoring_metric_id(metric_name) {
            Some((parameter, found)) => {
                found == agent
                    && self
                        .groups
                        .get(group)
                        .is_some_and(|params| params.contains(parameter))
            }
            None => false,
        }
    }

    #[allow(dead_code)] // Inspection utility, used by tests
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Builds the agent-name map for a set of leaves.
///
/// The result is a set union and does not depend on iteration order.
pub fn correlate_agents<'a, M, I>(params: &MonitoringParameters, leaves: I) -> AgentNames
where
    M: Leaf,
    I: IntoIterator<Item = &'a M>,
{
    let mut agent_names = AgentNames::new();

    for leaf in leaves {
        for name in leaf.metric_names() {
            let Some((parameter, agent)) = split_monitoring_metric_id(&name.metric_name) else {
                continue;
            };
            for group in params.groups_of(parameter) {
                agent_names
                    .entry(group.to_string())
                    .or_default()
                    .insert(agent.to_string());
            }
        }
    }

    agent_names
}
