//! The grouping pipeline: merge stage, then shape stage.

use crate::correlate::AgentNames;
use crate::models::{Leaf, MetricGroupNode};
use crate::rules::{MergeRuleProvider, RuleResult, ShapeRuleProvider};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Sequences a merge rule and a shape rule for one leaf type.
pub struct RulePipeline<M: Leaf> {
    merge: Arc<dyn MergeRuleProvider<M>>,
    shape: Arc<dyn ShapeRuleProvider<M>>,
}

impl<M: Leaf> Clone for RulePipeline<M> {
    fn clone(&self) -> Self {
        Self {
            merge: Arc::clone(&self.merge),
            shape: Arc::clone(&self.shape),
        }
    }
}

impl<M: Leaf> RulePipeline<M> {
    pub fn new(merge: Arc<dyn MergeRuleProvider<M>>, shape: Arc<dyn ShapeRuleProvider<M>>) -> Self {
        Self { merge, shape }
    }

    /// Monitoring groups known to either provider; parameter lists are unioned.
    pub fn monitoring_plot_groups(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups = self.merge.monitoring_plot_groups();
        for (key, params) in self.shape.monitoring_plot_groups() {
            let entry = groups.entry(key).or_default();
            for param in params {
                if !entry.contains(&param) {
                    entry.push(param);
                }
            }
        }
        groups
    }

    /// Groups one task's leaves into a tree rooted at `root_id`.
    ///
    /// Composite leaves from the merge stage are added next to the
    /// originals before the shape stage runs.
    pub fn group_tree(
        &self,
        root_id: &str,
        agent_names: Option<&AgentNames>,
        mut leaves: Vec<M>,
    ) -> RuleResult<MetricGroupNode<M>> {
        let united = self.merge.provide(agent_names)?.filter(root_id, &leaves)?;
        leaves.extend(united);

        self.shape.provide(root_id, root_id)?.filter(leaves)
    }
}
