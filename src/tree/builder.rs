//! Control tree assembly.
//!
//! One request fetches the task list once, then builds the summary and
//! details views concurrently. Each view fetches its own slices through
//! the worker pool, groups every task's leaves with the rule pipeline
//! and ranks the resulting test nodes. Any failure fails the request.

use super::pool::WorkerPool;
use crate::config::Config;
use crate::correlate::{correlate_agents, MonitoringParameters};
use crate::error::{AggregationError, Branch, ControlTreeError, Result};
use crate::fetcher::DataFetcher;
use crate::models::{
    tokens, DetailsNode, MetricNode, PlotNode, RootNode, SessionInfoNode, SessionScopePlotsNode,
    SummaryNode, TaskData, TestDetailsNode, TestNode,
};
use crate::pipeline::RulePipeline;
use crate::ranking::{rank_and_sort, RankingCriterion};
use crate::rules::{RuleResult, TreeGroupingRuleProvider, UniteMetricsRuleProvider};
use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Builds control trees for session sets.
pub struct ControlTreeBuilder {
    fetcher: Arc<dyn DataFetcher>,
    summary_rules: RulePipeline<MetricNode>,
    details_rules: RulePipeline<PlotNode>,
    monitoring: MonitoringParameters,
    pool: WorkerPool,
    ranking: RankingCriterion,
    session_scope_plots: bool,
}

impl ControlTreeBuilder {
    /// Creates a builder; the monitoring parameter table is read once from
    /// the details rule providers.
    pub fn new(
        fetcher: Arc<dyn DataFetcher>,
        summary_rules: RulePipeline<MetricNode>,
        details_rules: RulePipeline<PlotNode>,
        pool: WorkerPool,
    ) -> Self {
        let monitoring = MonitoringParameters::new(&details_rules.monitoring_plot_groups());
        debug!("Control tree builder with {} fetch permits", pool.size());
        Self {
            fetcher,
            summary_rules,
            details_rules,
            monitoring,
            pool,
            ranking: RankingCriterion::default(),
            session_scope_plots: false,
        }
    }

    /// Creates a builder with the configured rules, pool size and ranking.
    pub fn from_config(fetcher: Arc<dyn DataFetcher>, config: &Config) -> RuleResult<Self> {
        let groups = &config.monitoring.groups;
        let unite = Arc::new(UniteMetricsRuleProvider::new(&config.rules.unite, groups)?);
        let shape = Arc::new(TreeGroupingRuleProvider::new(&config.rules.groups, groups)?);

        let summary_rules: RulePipeline<MetricNode> =
            RulePipeline::new(unite.clone(), shape.clone());
        let details_rules: RulePipeline<PlotNode> = RulePipeline::new(unite, shape);

        Ok(Self::new(
            fetcher,
            summary_rules,
            details_rules,
            WorkerPool::new(config.general.concurrency),
        )
        .with_ranking(config.ranking.criterion)
        .with_session_scope_plots(config.general.session_scope_plots))
    }

    pub fn with_ranking(mut self, ranking: RankingCriterion) -> Self {
        self.ranking = ranking;
        self
    }

    /// Enables the session-scope plots section for single-session requests.
    pub fn with_session_scope_plots(mut self, enabled: bool) -> Self {
        self.session_scope_plots = enabled;
        self
    }

    /// Builds the control tree of a single session.
    #[allow(dead_code)] // Convenience entry point, used by tests
    pub async fn build_control_tree_for_session(
        &self,
        session_id: &str,
    ) -> std::result::Result<RootNode, AggregationError> {
        let session_ids = BTreeSet::from([session_id.to_string()]);
        self.build_control_tree(&session_ids).await
    }

    /// Builds the control tree of a set of sessions.
    pub async fn build_control_tree(
        &self,
        session_ids: &BTreeSet<String>,
    ) -> std::result::Result<RootNode, AggregationError> {
        let started = Instant::now();

        let tasks = self
            .fetch_task_data(session_ids)
            .await
            .map_err(|e| self.fail(session_ids, Branch::Tasks, e))?;

        if tasks.is_empty() {
            info!("No tests found for sessions {:?}", session_ids);
            return Ok(RootNode::empty());
        }

        let tasks: Arc<[TaskData]> = tasks.into();

        let summary = async {
            self.summary_node(session_ids, &tasks)
                .await
                .map_err(|e| (Branch::Summary, e))
        };
        let details = async {
            self.details_node(session_ids, &tasks)
                .await
                .map_err(|e| (Branch::Details, e))
        };
        let scope = async {
            self.session_scope_plots_node(session_ids)
                .await
                .map_err(|e| (Branch::SessionScope, e))
        };

        let (summary, mut details, scope) = tokio::try_join!(summary, details, scope)
            .map_err(|(branch, e)| self.fail(session_ids, branch, e))?;
        details.session_scope_plots = scope;

        info!(
            "Total time fetching all data for control tree: {} ms",
            started.elapsed().as_millis()
        );

        Ok(RootNode { summary, details })
    }

    fn fail(
        &self,
        session_ids: &BTreeSet<String>,
        branch: Branch,
        source: ControlTreeError,
    ) -> AggregationError {
        error!(
            "Error while creating control tree for sessions {:?} in {} branch: {}",
            session_ids, branch, source
        );
        AggregationError::new(session_ids, branch, source)
    }

    async fn fetch_task_data(&self, session_ids: &BTreeSet<String>) -> Result<Vec<TaskData>> {
        let started = Instant::now();
        let fetcher = Arc::clone(&self.fetcher);
        let ids = session_ids.clone();

        let tasks = self
            .pool
            .run(async move {
                fetcher
                    .get_task_data(&ids)
                    .await
                    .map_err(ControlTreeError::from)
            })
            .await?;

        debug!(
            "Loaded {} tests for sessions {:?} in {} ms",
            tasks.len(),
            session_ids,
            started.elapsed().as_millis()
        );
        Ok(tasks)
    }

    async fn summary_node(
        &self,
        session_ids: &BTreeSet<String>,
        tasks: &Arc<[TaskData]>,
    ) -> Result<SummaryNode> {
        let session_info = {
            let fetcher = Arc::clone(&self.fetcher);
            let ids = session_ids.clone();
            self.pool
                .run(async move {
                    fetcher
                        .get_session_info(&ids)
                        .await
                        .map_err(ControlTreeError::from)
                })
        };
        let metrics = {
            let fetcher = Arc::clone(&self.fetcher);
            let tasks = Arc::clone(tasks);
            self.pool
                .run(async move {
                    fetcher
                        .get_test_metrics_map(&tasks)
                        .await
                        .map_err(ControlTreeError::from)
                })
        };
        let test_info = try_join_all(tasks.iter().cloned().map(|task| {
            let fetcher = Arc::clone(&self.fetcher);
            self.pool
                .run(async move {
                    fetcher
                        .get_test_info(&task)
                        .await
                        .map_err(ControlTreeError::from)
                })
        }));

        let (session_info, mut metrics, test_info) =
            tokio::try_join!(session_info, metrics, test_info)?;

        let mut summary = SummaryNode::new(SessionInfoNode::new(session_info));
        for (task, info) in tasks.iter().zip(test_info) {
            let leaves = metrics.remove(task).unwrap_or_default();
            let root_id = format!("{}{}", tokens::SUMMARY_PREFIX, task.digest());

            let tree = self.summary_rules.group_tree(&root_id, None, leaves)?;
            summary.tests.push(TestNode::new(tree, task.clone(), info));
        }

        rank_and_sort(&mut summary.tests, self.ranking);
        Ok(summary)
    }

    async fn details_node(
        &self,
        session_ids: &BTreeSet<String>,
        tasks: &Arc<[TaskData]>,
    ) -> Result<DetailsNode> {
        let plots = {
            let fetcher = Arc::clone(&self.fetcher);
            let ids = session_ids.clone();
            let tasks = Arc::clone(tasks);
            self.pool
                .run(async move {
                    fetcher
                        .get_test_plots_map(&ids, &tasks)
                        .await
                        .map_err(ControlTreeError::from)
                })
        };
        let monitoring = {
            let fetcher = Arc::clone(&self.fetcher);
            let ids = session_ids.clone();
            let tasks = Arc::clone(tasks);
            self.pool
                .run(async move {
                    fetcher
                        .get_monitoring_plot_nodes(&ids, &tasks)
                        .await
                        .map_err(ControlTreeError::from)
                })
        };

        let (mut plots, mut monitoring) = tokio::try_join!(plots, monitoring)?;

        let agent_names = correlate_agents(
            &self.monitoring,
            plots.values().chain(monitoring.values()).flatten(),
        );
        debug!("Agent names for sessions {:?}: {:?}", session_ids, agent_names);

        let mut details = DetailsNode::default();
        for task in tasks.iter() {
            let mut leaves = plots.remove(task).unwrap_or_default();
            leaves.extend(monitoring.remove(task).unwrap_or_default());
            let root_id = format!("{}{}", tokens::METRICS_PREFIX, task.digest());

            let tree = self
                .details_rules
                .group_tree(&root_id, Some(&agent_names), leaves)?;
            details.tests.push(TestDetailsNode::new(tree, task.clone()));
        }

        rank_and_sort(&mut details.tests, self.ranking);
        Ok(details)
    }

    async fn session_scope_plots_node(
        &self,
        session_ids: &BTreeSet<String>,
    ) -> Result<Option<SessionScopePlotsNode>> {
        if !self.session_scope_plots || session_ids.len() != 1 {
            return Ok(None);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let ids = session_ids.clone();
        let plots = self
            .pool
            .run(async move {
                fetcher
                    .get_session_scope_plot_nodes(&ids)
                    .await
                    .map_err(ControlTreeError::from)
            })
            .await?;

        Ok((!plots.is_empty()).then(|| SessionScopePlotsNode::new(plots)))
    }
}
