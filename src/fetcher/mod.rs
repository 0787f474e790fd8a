//! Data access for the control tree.
//!
//! The engine never talks to a store directly; everything it needs
//! comes through the [`DataFetcher`] trait.

pub mod snapshot;

use crate::error::FetchError;
use crate::models::{InfoLeaf, MetricNode, PlotNode, TaskData};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

pub use snapshot::SnapshotFetcher;

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Source of tasks, metrics and plots for a set of sessions.
///
/// Every call is self-contained and may run concurrently with the others.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    /// Tasks executed in the given sessions.
    async fn get_task_data(&self, session_ids: &BTreeSet<String>) -> FetchResult<Vec<TaskData>>;

    /// Metric plots per task.
    async fn get_test_plots_map(
        &self,
        session_ids: &BTreeSet<String>,
        tasks: &[TaskData],
    ) -> FetchResult<HashMap<TaskData, Vec<PlotNode>>>;

    /// Monitoring plots per task.
    async fn get_monitoring_plot_nodes(
        &self,
        session_ids: &BTreeSet<String>,
        tasks: &[TaskData],
    ) -> FetchResult<HashMap<TaskData, Vec<PlotNode>>>;

    /// Summary metrics per task.
    async fn get_test_metrics_map(
        &self,
        tasks: &[TaskData],
    ) -> FetchResult<HashMap<TaskData, Vec<MetricNode>>>;

    /// Session-level info lines.
    async fn get_session_info(&self, _session_ids: &BTreeSet<String>) -> FetchResult<Vec<InfoLeaf>> {
        Ok(Vec::new())
    }

    /// Info lines of one test.
    async fn get_test_info(&self, _task: &TaskData) -> FetchResult<Vec<InfoLeaf>> {
        Ok(Vec::new())
    }

    /// Session-wide plots, not bound to any test.
    async fn get_session_scope_plot_nodes(
        &self,
        _session_ids: &BTreeSet<String>,
    ) -> FetchResult<Vec<PlotNode>> {
        Ok(Vec::new())
    }
}
