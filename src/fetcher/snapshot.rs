//! JSON snapshot data source.
//!
//! A snapshot is a dump of everything the store would return for a
//! handful of sessions. The CLI reads one from disk; tests build them
//! inline.

use super::{DataFetcher, FetchResult};
use crate::error::FetchError;
use crate::models::{InfoLeaf, MetricNode, PlotNode, PlotSource, TaskData};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::debug;

/// Root of a snapshot file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionSnapshot>,
    /// Operations that should fail when called (e.g. `["plots"]`).
    #[serde(default)]
    pub fail: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub info: Vec<InfoLeaf>,
    #[serde(default)]
    pub session_scope_plots: Vec<PlotNode>,
    #[serde(default)]
    pub tasks: Vec<TaskSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task: TaskData,
    #[serde(default)]
    pub info: Vec<InfoLeaf>,
    #[serde(default)]
    pub metrics: Vec<MetricNode>,
    #[serde(default)]
    pub plots: Vec<PlotNode>,
    #[serde(default)]
    pub monitoring: Vec<PlotNode>,
}

/// Operation names accepted in [`Snapshot::fail`].
const OPERATIONS: &[&str] = &[
    "tasks",
    "plots",
    "monitoring",
    "metrics",
    "session_info",
    "test_info",
    "session_scope_plots",
];

/// A [`DataFetcher`] serving a loaded snapshot.
pub struct SnapshotFetcher {
    snapshot: Snapshot,
    index: HashMap<TaskData, (String, usize)>,
}

impl SnapshotFetcher {
    /// Builds a fetcher, stamping every task with the session it is filed under.
    pub fn new(mut snapshot: Snapshot) -> FetchResult<Self> {
        if let Some(unknown) = snapshot
            .fail
            .iter()
            .find(|op| !OPERATIONS.contains(&op.as_str()))
        {
            return Err(FetchError::new(
                "load_snapshot",
                format!("unknown operation '{}' in fail list", unknown),
            ));
        }

        let mut index = HashMap::new();
        for (session_id, session) in snapshot.sessions.iter_mut() {
            for plot in &mut session.session_scope_plots {
                plot.source = PlotSource::SessionScope;
            }
            for (position, entry) in session.tasks.iter_mut().enumerate() {
                entry.task.session_id = session_id.clone();
                for plot in &mut entry.monitoring {
                    plot.source = PlotSource::Monitoring;
                }
                if index
                    .insert(entry.task.clone(), (session_id.clone(), position))
                    .is_some()
                {
                    return Err(FetchError::new(
                        "load_snapshot",
                        format!("task {} is listed twice", entry.task),
                    ));
                }
            }
        }

        Ok(Self { snapshot, index })
    }

    /// Parses a snapshot from JSON text.
    pub fn from_json(json: &str) -> FetchResult<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)
            .map_err(|e| FetchError::new("load_snapshot", e.to_string()))?;
        Self::new(snapshot)
    }

    /// Reads a snapshot file.
    pub fn load(path: &Path) -> FetchResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FetchError::new("load_snapshot", format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    fn check(&self, operation: &str) -> FetchResult<()> {
        if self.snapshot.fail.iter().any(|op| op == operation) {
            Err(FetchError::new(operation, "injected failure"))
        } else {
            Ok(())
        }
    }

    fn entry(&self, task: &TaskData) -> Option<&TaskSnapshot> {
        let (session_id, position) = self.index.get(task)?;
        self.snapshot.sessions.get(session_id)?.tasks.get(*position)
    }

    /// Collects one per-task list for every known task.
    fn per_task<T: Clone>(
        &self,
        tasks: &[TaskData],
        select: impl Fn(&TaskSnapshot) -> &Vec<T>,
    ) -> HashMap<TaskData, Vec<T>> {
        tasks
            .iter()
            .filter_map(|task| self.entry(task).map(|e| (task.clone(), select(e).clone())))
            .collect()
    }
}

#[async_trait]
impl DataFetcher for SnapshotFetcher {
    async fn get_task_data(&self, session_ids: &BTreeSet<String>) -> FetchResult<Vec<TaskData>> {
        self.check("tasks")?;
        let tasks: Vec<TaskData> = session_ids
            .iter()
            .filter_map(|id| self.snapshot.sessions.get(id))
            .flat_map(|s| s.tasks.iter().map(|e| e.task.clone()))
            .collect();
        debug!("Snapshot holds {} tasks for {} sessions", tasks.len(), session_ids.len());
        Ok(tasks)
    }

    async fn get_test_plots_map(
        &self,
        _session_ids: &BTreeSet<String>,
        tasks: &[TaskData],
    ) -> FetchResult<HashMap<TaskData, Vec<PlotNode>>> {
        self.check("plots")?;
        Ok(self.per_task(tasks, |e| &e.plots))
    }

    async fn get_monitoring_plot_nodes(
        &self,
        _session_ids: &BTreeSet<String>,
        tasks: &[TaskData],
    ) -> FetchResult<HashMap<TaskData, Vec<PlotNode>>> {
        self.check("monitoring")?;
        Ok(self.per_task(tasks, |e| &e.monitoring))
    }

    async fn get_test_metrics_map(
        &self,
        tasks: &[TaskData],
    ) -> FetchResult<HashMap<TaskData, Vec<MetricNode>>> {
        self.check("metrics")?;
        Ok(self.per_task(tasks, |e| &e.metrics))
    }

    async fn get_session_info(&self, session_ids: &BTreeSet<String>) -> FetchResult<Vec<InfoLeaf>> {
        self.check("session_info")?;
        Ok(session_ids
            .iter()
            .filter_map(|id| self.snapshot.sessions.get(id))
            .flat_map(|s| s.info.iter().cloned())
            .collect())
    }

    async fn get_test_info(&self, task: &TaskData) -> FetchResult<Vec<InfoLeaf>> {
        self.check("test_info")?;
        Ok(self.entry(task).map(|e| e.info.clone()).unwrap_or_default())
    }

    async fn get_session_scope_plot_nodes(
        &self,
        session_ids: &BTreeSet<String>,
    ) -> FetchResult<Vec<PlotNode>> {
        self.check("session_scope_plots")?;
        Ok(session_ids
            .iter()
            .filter_map(|id| self.snapshot.sessions.get(id))
            .flat_map(|s| s.session_scope_plots.iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "sessions": {
            "s1": {
                "info": [{ "name": "Start", "value": "2026-01-01" }],
                "tasks": [{
                    "task": { "task_id": "t1", "task_name": "login" },
                    "metrics": [{ "id": "m1", "display_name": "Latency",
                                  "metric_names": [{ "metric_name": "latency" }] }],
                    "monitoring": [{ "id": "p1", "display_name": "CPU",
                                     "metric_names": [{ "metric_name": "cpu@hostA" }] }]
                }]
            }
        }
    }"#;

    fn sessions(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_tasks_are_stamped_with_session() {
        let fetcher = SnapshotFetcher::from_json(SNAPSHOT).unwrap();
        let tasks = fetcher.get_task_data(&sessions(&["s1", "missing"])).await.unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].session_id, "s1");
        assert_eq!(tasks[0].task_name, "login");
    }

    #[tokio::test]
    async fn test_monitoring_plots_are_marked() {
        let fetcher = SnapshotFetcher::from_json(SNAPSHOT).unwrap();
        let ids = sessions(&["s1"]);
        let tasks = fetcher.get_task_data(&ids).await.unwrap();
        let map = fetcher.get_monitoring_plot_nodes(&ids, &tasks).await.unwrap();

        let plots = &map[&tasks[0]];
        assert_eq!(plots.len(), 1);
        assert_eq!(plots[0].source, PlotSource::Monitoring);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let mut snapshot: Snapshot = serde_json::from_str(SNAPSHOT).unwrap();
        snapshot.fail.push("plots".to_string());
        let fetcher = SnapshotFetcher::new(snapshot).unwrap();
        let ids = sessions(&["s1"]);

        let err = fetcher.get_test_plots_map(&ids, &[]).await.unwrap_err();
        assert_eq!(err.operation, "plots");
        assert!(fetcher.get_monitoring_plot_nodes(&ids, &[]).await.is_ok());
    }

    #[test]
    fn test_unknown_fail_operation_rejected() {
        let snapshot = Snapshot {
            fail: vec!["everything".to_string()],
            ..Snapshot::default()
        };
        assert!(SnapshotFetcher::new(snapshot).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let fetcher = SnapshotFetcher::load(&path).unwrap();
        let info = tokio_test::block_on(fetcher.get_session_info(&sessions(&["s1"]))).unwrap();
        assert_eq!(info[0].name, "Start");
    }
}
