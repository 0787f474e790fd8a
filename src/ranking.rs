//! Ordering of sibling test nodes.

use crate::models::{TaskData, TestDetailsNode, TestNode};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};

/// How test nodes are ranked.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum RankingCriterion {
    /// Highest task priority first (default)
    #[default]
    Priority,
    /// Task name, then session id
    Name,
    /// Keep the order tasks were fetched in
    FetchOrder,
}

/// A node that belongs to exactly one task.
pub trait TaskScoped {
    fn task(&self) -> &TaskData;
}

impl TaskScoped for TestNode {
    fn task(&self) -> &TaskData {
        &self.task
    }
}

impl TaskScoped for TestDetailsNode {
    fn task(&self) -> &TaskData {
        &self.task
    }
}

impl RankingCriterion {
    fn compare(self, a: &TaskData, b: &TaskData) -> Ordering {
        match self {
            RankingCriterion::Priority => Reverse(a.priority).cmp(&Reverse(b.priority)),
            RankingCriterion::Name => a
                .task_name
                .cmp(&b.task_name)
                .then_with(|| a.session_id.cmp(&b.session_id)),
            RankingCriterion::FetchOrder => Ordering::Equal,
        }
    }
}

/// Sorts task nodes in place; equal ranks keep their input order.
pub fn rank_and_sort<N: TaskScoped>(nodes: &mut [N], criterion: RankingCriterion) {
    nodes.sort_by(|a, b| criterion.compare(a.task(), b.task()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricGroupNode;
    use proptest::prelude::*;

    fn node(task_id: &str, name: &str, priority: i32) -> TestDetailsNode {
        let mut task = TaskData::new("s1", task_id, name);
        task.priority = priority;
        TestDetailsNode::new(MetricGroupNode::new(task_id, task_id), task)
    }

    fn ids(nodes: &[TestDetailsNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.task.task_id.as_str()).collect()
    }

    #[test]
    fn test_priority_highest_first() {
        let mut nodes = vec![node("a", "x", 1), node("b", "y", 5), node("c", "z", 3)];
        rank_and_sort(&mut nodes, RankingCriterion::Priority);
        assert_eq!(ids(&nodes), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_name_ties_broken_by_session() {
        let mut first = node("a", "login", 0);
        first.task.session_id = "s2".to_string();
        let mut nodes = vec![first, node("b", "login", 0), node("c", "checkout", 0)];

        rank_and_sort(&mut nodes, RankingCriterion::Name);

        assert_eq!(ids(&nodes), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_fetch_order_is_identity() {
        let mut nodes = vec![node("b", "y", 1), node("a", "x", 9)];
        rank_and_sort(&mut nodes, RankingCriterion::FetchOrder);
        assert_eq!(ids(&nodes), vec!["b", "a"]);
    }

    proptest! {
        #[test]
        fn prop_priority_sort_is_stable(priorities in proptest::collection::vec(0i32..3, 0..24)) {
            let mut nodes: Vec<TestDetailsNode> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| node(&format!("{:02}", i), "t", *p))
                .collect();

            rank_and_sort(&mut nodes, RankingCriterion::Priority);

            for pair in nodes.windows(2) {
                let (a, b) = (&pair[0].task, &pair[1].task);
                prop_assert!(a.priority >= b.priority);
                if a.priority == b.priority {
                    prop_assert!(a.task_id < b.task_id);
                }
            }
        }
    }
}
