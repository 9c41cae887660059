use crate::error::Result;
use crate::model::{FunctionMetric, TaskSnapshot, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Counts of persisted tasks by status
#[derive(Debug, Clone, Default)]
pub struct TaskCounts {
    pub total: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Insert or replace the snapshot for its task id.
    async fn upsert_task(&self, snapshot: &TaskSnapshot) -> Result<()>;

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskSnapshot>>;

    /// Most recently updated first.
    async fn list_tasks(&self, status: Option<TaskStatus>, limit: i64) -> Result<Vec<TaskSnapshot>>;

    /// Insert or replace the aggregate for its function name.
    async fn upsert_metric(&self, metric: &FunctionMetric) -> Result<()>;

    async fn get_metric(&self, name: &str) -> Result<Option<FunctionMetric>>;

    /// Most recently executed first.
    async fn list_metrics(&self, limit: i64) -> Result<Vec<FunctionMetric>>;

    async fn count_tasks_by_status(&self) -> Result<TaskCounts>;

    /// Delete terminal task rows older than the cutoff. Returns rows deleted.
    async fn prune_tasks_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete metric rows whose last execution is older than the cutoff.
    async fn prune_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
