//! SQLite-based durable store
//!
//! Provides durable storage for task progress snapshots and aggregated
//! function metrics. Uses SQLx for async database operations.

use crate::error::Result;
use crate::model::{FunctionMetric, TaskSnapshot, TaskStatus};
use crate::store::{ProgressStore, TaskCounts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

/// SQLite-backed store for task history and function metrics
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given database URL
    ///
    /// URL format: `sqlite:///path/to/db.sqlite` or `sqlite::memory:`
    pub async fn new(url: &str) -> Result<Self> {
        info!("Initializing SQLite progress store: {}", url);

        // Every pooled `:memory:` connection opens its own private database,
        // so the in-memory path must stay on a single connection.
        let max_connections = if url.contains(":memory:") || url.contains("mode=memory") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        info!("SQLite progress store initialized successfully");
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Initialize database schema
    async fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing database schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_progress (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL UNIQUE,
                task_name TEXT NOT NULL,
                start_time TEXT NOT NULL,
                estimated_duration REAL NOT NULL,
                current_step TEXT NOT NULL,
                progress_percent REAL NOT NULL,
                status TEXT NOT NULL,
                steps_completed INTEGER NOT NULL,
                total_steps INTEGER NOT NULL,
                last_update TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS function_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                function_name TEXT NOT NULL UNIQUE,
                execution_count INTEGER NOT NULL,
                success_count INTEGER NOT NULL,
                failure_count INTEGER NOT NULL,
                avg_duration REAL NOT NULL,
                last_execution TEXT NOT NULL,
                status TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indices for common dashboard queries
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status ON task_progress(status)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_updated ON task_progress(last_update)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_metrics_last_exec ON function_metrics(last_execution)",
        )
        .execute(&self.pool)
        .await?;

        debug!("Database schema initialized");
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for SqliteStore {
    async fn upsert_task(&self, snapshot: &TaskSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_progress (
                task_id, task_name, start_time, estimated_duration, current_step,
                progress_percent, status, steps_completed, total_steps, last_update
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(task_id) DO UPDATE SET
                task_name = excluded.task_name,
                start_time = excluded.start_time,
                estimated_duration = excluded.estimated_duration,
                current_step = excluded.current_step,
                progress_percent = excluded.progress_percent,
                status = excluded.status,
                steps_completed = excluded.steps_completed,
                total_steps = excluded.total_steps,
                last_update = excluded.last_update
            "#,
        )
        .bind(&snapshot.task_id)
        .bind(&snapshot.task_name)
        .bind(snapshot.start_time.to_rfc3339())
        .bind(snapshot.estimated_duration_secs)
        .bind(&snapshot.current_step)
        .bind(snapshot.progress_percent)
        .bind(snapshot.status.as_str())
        .bind(snapshot.steps_completed as i64)
        .bind(snapshot.total_steps as i64)
        .bind(snapshot.last_update.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!("Saved task snapshot {} ({})", snapshot.task_id, snapshot.status);
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskSnapshot>> {
        let row = sqlx::query(
            "SELECT task_id, task_name, start_time, estimated_duration, current_step, progress_percent, status, steps_completed, total_steps, last_update FROM task_progress WHERE task_id = ?",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_snapshot(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: i64,
    ) -> Result<Vec<TaskSnapshot>> {
        let rows = if let Some(status) = status {
            sqlx::query(
                "SELECT task_id, task_name, start_time, estimated_duration, current_step, progress_percent, status, steps_completed, total_steps, last_update FROM task_progress WHERE status = ? ORDER BY last_update DESC LIMIT ?",
            )
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT task_id, task_name, start_time, estimated_duration, current_step, progress_percent, status, steps_completed, total_steps, last_update FROM task_progress ORDER BY last_update DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row_to_snapshot(&row)?);
        }

        Ok(snapshots)
    }

    async fn upsert_metric(&self, metric: &FunctionMetric) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO function_metrics (
                function_name, execution_count, success_count, failure_count,
                avg_duration, last_execution, status
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(function_name) DO UPDATE SET
                execution_count = excluded.execution_count,
                success_count = excluded.success_count,
                failure_count = excluded.failure_count,
                avg_duration = excluded.avg_duration,
                last_execution = excluded.last_execution,
                status = excluded.status
            "#,
        )
        .bind(&metric.name)
        .bind(metric.execution_count as i64)
        .bind(metric.success_count as i64)
        .bind(metric.failure_count as i64)
        .bind(metric.avg_duration_secs)
        .bind(metric.last_execution.to_rfc3339())
        .bind(&metric.status)
        .execute(&self.pool)
        .await?;

        debug!("Saved metric for {}", metric.name);
        Ok(())
    }

    async fn get_metric(&self, name: &str) -> Result<Option<FunctionMetric>> {
        let row = sqlx::query(
            "SELECT function_name, execution_count, success_count, failure_count, avg_duration, last_execution, status FROM function_metrics WHERE function_name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_metric(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_metrics(&self, limit: i64) -> Result<Vec<FunctionMetric>> {
        let rows = sqlx::query(
            "SELECT function_name, execution_count, success_count, failure_count, avg_duration, last_execution, status FROM function_metrics ORDER BY last_execution DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut metrics = Vec::new();
        for row in rows {
            metrics.push(row_to_metric(&row)?);
        }

        Ok(metrics)
    }

    async fn count_tasks_by_status(&self) -> Result<TaskCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                SUM(CASE WHEN status = 'running' THEN 1 ELSE 0 END) as running,
                SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) as completed,
                SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) as failed
            FROM task_progress
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TaskCounts {
            total: row.get::<i64, _>("total") as u64,
            running: row.get::<Option<i64>, _>("running").unwrap_or(0) as u64,
            completed: row.get::<Option<i64>, _>("completed").unwrap_or(0) as u64,
            failed: row.get::<Option<i64>, _>("failed").unwrap_or(0) as u64,
        })
    }

    async fn prune_tasks_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let cutoff_str = cutoff.to_rfc3339();

        let result = sqlx::query(
            "DELETE FROM task_progress WHERE last_update < ? AND status IN ('completed', 'failed')",
        )
        .bind(&cutoff_str)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        info!("Deleted {} terminal tasks from before {}", deleted, cutoff_str);
        Ok(deleted)
    }

    async fn prune_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let cutoff_str = cutoff.to_rfc3339();

        let result = sqlx::query("DELETE FROM function_metrics WHERE last_execution < ?")
            .bind(&cutoff_str)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        info!("Deleted {} stale metrics from before {}", deleted, cutoff_str);
        Ok(deleted)
    }
}

/// Helper function to convert a database row to a TaskSnapshot
fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> Result<TaskSnapshot> {
    let status_str: String = row.get("status");

    Ok(TaskSnapshot {
        task_id: row.get("task_id"),
        task_name: row.get("task_name"),
        start_time: parse_timestamp(&row.get::<String, _>("start_time")),
        estimated_duration_secs: row.get("estimated_duration"),
        current_step: row.get("current_step"),
        progress_percent: row.get("progress_percent"),
        status: TaskStatus::parse(&status_str),
        steps_completed: row.get::<i64, _>("steps_completed") as u32,
        total_steps: row.get::<i64, _>("total_steps") as u32,
        last_update: parse_timestamp(&row.get::<String, _>("last_update")),
    })
}

/// Helper function to convert a database row to a FunctionMetric
fn row_to_metric(row: &sqlx::sqlite::SqliteRow) -> Result<FunctionMetric> {
    Ok(FunctionMetric {
        name: row.get("function_name"),
        execution_count: row.get::<i64, _>("execution_count") as u64,
        success_count: row.get::<i64, _>("success_count") as u64,
        failure_count: row.get::<i64, _>("failure_count") as u64,
        avg_duration_secs: row.get("avg_duration"),
        last_execution: parse_timestamp(&row.get::<String, _>("last_execution")),
        status: row.get("status"),
    })
}

/// RFC3339 parse with epoch fallback; rows are written by this crate, so a
/// malformed timestamp means external tampering and degrades to a stale read.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snapshot(task_id: &str, status: TaskStatus) -> TaskSnapshot {
        TaskSnapshot {
            task_id: task_id.to_string(),
            task_name: "build".to_string(),
            start_time: Utc::now(),
            estimated_duration_secs: 60.0,
            current_step: "Initializing".to_string(),
            progress_percent: 0.0,
            status,
            steps_completed: 0,
            total_steps: 4,
            last_update: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_task_snapshot_lifecycle() {
        let store = SqliteStore::in_memory().await.unwrap();

        let snap = snapshot("t1", TaskStatus::Running);
        store.upsert_task(&snap).await.unwrap();

        let retrieved = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(retrieved.task_id, "t1");
        assert_eq!(retrieved.task_name, "build");
        assert_eq!(retrieved.status, TaskStatus::Running);
        assert_eq!(retrieved.total_steps, 4);

        // Same id upserts in place
        let mut updated = snap.clone();
        updated.status = TaskStatus::Completed;
        updated.progress_percent = 100.0;
        updated.current_step = "done".to_string();
        store.upsert_task(&updated).await.unwrap();

        let retrieved = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(retrieved.status, TaskStatus::Completed);
        assert!((retrieved.progress_percent - 100.0).abs() < f64::EPSILON);

        let all = store.list_tasks(None, 10).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_task_missing_is_none() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.get_task("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_tasks_filters_by_status() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.upsert_task(&snapshot("a", TaskStatus::Running)).await.unwrap();
        store.upsert_task(&snapshot("b", TaskStatus::Completed)).await.unwrap();
        store.upsert_task(&snapshot("c", TaskStatus::Failed)).await.unwrap();

        let running = store.list_tasks(Some(TaskStatus::Running), 10).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].task_id, "a");

        let counts = store.count_tasks_by_status().await.unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
    }

    #[tokio::test]
    async fn test_metric_upsert_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();

        let mut metric = FunctionMetric::first("generate_report", 10.0, true);
        store.upsert_metric(&metric).await.unwrap();

        metric.observe(20.0, false);
        store.upsert_metric(&metric).await.unwrap();

        let retrieved = store.get_metric("generate_report").await.unwrap().unwrap();
        assert_eq!(retrieved.execution_count, 2);
        assert_eq!(retrieved.success_count, 1);
        assert_eq!(retrieved.failure_count, 1);
        assert!((retrieved.avg_duration_secs - 15.0).abs() < 1e-9);

        let all = store.list_metrics(10).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_running_tasks() {
        let store = SqliteStore::in_memory().await.unwrap();

        let old = Utc::now() - Duration::days(30);
        let mut stale_done = snapshot("done", TaskStatus::Completed);
        stale_done.last_update = old;
        let mut stale_running = snapshot("live", TaskStatus::Running);
        stale_running.last_update = old;

        store.upsert_task(&stale_done).await.unwrap();
        store.upsert_task(&stale_running).await.unwrap();

        let deleted = store.prune_tasks_before(Utc::now() - Duration::days(7)).await.unwrap();
        assert_eq!(deleted, 1);

        // Only terminal rows are pruned, however stale
        assert!(store.get_task("live").await.unwrap().is_some());
        assert!(store.get_task("done").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_pool_shares_one_database() {
        use std::sync::Arc;

        let store = Arc::new(SqliteStore::in_memory().await.unwrap());

        // Concurrent writers must all land on the database that holds the
        // schema, not on fresh pooled connections.
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .upsert_task(&snapshot(&format!("t{}", i), TaskStatus::Running))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let all = store.list_tasks(None, 20).await.unwrap();
        assert_eq!(all.len(), 8);
    }

    #[tokio::test]
    async fn test_prune_metrics_by_age() {
        let store = SqliteStore::in_memory().await.unwrap();

        let mut stale = FunctionMetric::first("old_fn", 1.0, true);
        stale.last_execution = Utc::now() - Duration::days(90);
        let fresh = FunctionMetric::first("new_fn", 1.0, true);

        store.upsert_metric(&stale).await.unwrap();
        store.upsert_metric(&fresh).await.unwrap();

        let deleted = store.prune_metrics_before(Utc::now() - Duration::days(30)).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_metric("old_fn").await.unwrap().is_none());
        assert!(store.get_metric("new_fn").await.unwrap().is_some());
    }
}
