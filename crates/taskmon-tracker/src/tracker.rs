use std::sync::Arc;

use taskmon_store::{FunctionMetric, ProgressStore, SqliteStore};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::function_metrics::FunctionAggregator;
use crate::metrics::TrackerMetrics;
use crate::persist::{spawn_writer, PersistHandle};
use crate::registry::{TaskEvent, TaskRegistry};
use crate::report::{ProgressReport, ReportAssembler};
use crate::task::TaskView;

/// The assembled tracking engine
///
/// Owns the registry, the function aggregator, the report assembler and the
/// write-behind writer. Constructed explicitly at service startup and torn
/// down with [`Tracker::shutdown`]; there is no ambient singleton.
pub struct Tracker {
    registry: TaskRegistry,
    aggregator: FunctionAggregator,
    assembler: ReportAssembler,
    metrics: Arc<TrackerMetrics>,
    store: Arc<dyn ProgressStore>,
    writer: JoinHandle<()>,
}

impl Tracker {
    /// Open the durable store at `config.database_url` and wire everything up
    pub async fn connect(config: TrackerConfig) -> Result<Self> {
        let store: Arc<dyn ProgressStore> = Arc::new(SqliteStore::new(&config.database_url).await?);
        Self::with_store(config, store)
    }

    /// Self-contained engine backed by an in-memory database, for tests and
    /// embedded use
    pub async fn in_memory() -> Result<Self> {
        let config = TrackerConfig {
            database_url: "sqlite::memory:".to_string(),
            ..Default::default()
        };
        Self::connect(config).await
    }

    /// Wire the engine onto an existing store implementation
    pub fn with_store(config: TrackerConfig, store: Arc<dyn ProgressStore>) -> Result<Self> {
        let metrics = Arc::new(TrackerMetrics::new()?);

        let (persist, receiver) = PersistHandle::channel(config.persist_queue_capacity);
        let writer = spawn_writer(Arc::clone(&store), receiver);

        let registry = TaskRegistry::new(
            persist.clone(),
            Arc::clone(&metrics),
            config.grace_window(),
            config.event_capacity,
        );
        let aggregator = FunctionAggregator::new(persist, Arc::clone(&metrics));
        let assembler = ReportAssembler::new(registry.clone(), aggregator.clone());

        info!(
            grace_secs = config.grace_window_secs,
            "Tracker engine started"
        );

        Ok(Self {
            registry,
            aggregator,
            assembler,
            metrics,
            store,
            writer,
        })
    }

    /// Begin tracking a task (duplicate ids silently overwrite)
    pub async fn start(&self, id: &str, name: &str, estimated_duration_secs: f64, total_steps: u32) {
        self.registry
            .start(id, name, estimated_duration_secs, total_steps)
            .await;
    }

    /// Report progress; unknown ids are a no-op
    pub async fn update_progress(
        &self,
        id: &str,
        step: &str,
        progress_percent: Option<f64>,
        steps_completed: Option<u32>,
    ) {
        self.registry
            .update_progress(id, step, progress_percent, steps_completed)
            .await;
    }

    /// Finish a task; unknown ids are a no-op
    pub async fn complete(&self, id: &str, success: bool) {
        self.registry.complete(id, success).await;
    }

    /// Report one completed unit of work for a named function
    pub async fn record(&self, name: &str, duration_secs: f64, success: bool) {
        self.aggregator.record(name, duration_secs, success).await;
    }

    pub async fn list_active(&self) -> Vec<TaskView> {
        self.registry.list_active().await
    }

    pub async fn get_function_metric(&self, name: &str) -> Option<FunctionMetric> {
        self.aggregator.get(name).await
    }

    pub async fn build_report(&self) -> ProgressReport {
        self.assembler.build_report().await
    }

    /// Subscribe to live task events
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.registry.subscribe()
    }

    /// Durable store handle, for retention jobs and historical reads
    pub fn store(&self) -> Arc<dyn ProgressStore> {
        Arc::clone(&self.store)
    }

    /// Prometheus registry for scraping
    pub fn metrics_registry(&self) -> prometheus::Registry {
        self.metrics.registry().clone()
    }

    /// Tear down: cancel pending reaps, then let the writer drain whatever is
    /// already queued.
    pub async fn shutdown(self) {
        self.registry.shutdown();

        let Self {
            registry,
            aggregator,
            assembler,
            writer,
            ..
        } = self;

        // Dropping every persist sender closes the channel; the writer exits
        // after flushing the queue.
        drop(assembler);
        drop(aggregator);
        drop(registry);
        let _ = writer.await;

        info!("Tracker engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use taskmon_store::TaskStatus;

    fn test_config() -> TrackerConfig {
        TrackerConfig {
            grace_window_secs: 1,
            ..Default::default()
        }
    }

    /// Honor RUST_LOG when debugging test failures
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    #[tokio::test]
    async fn end_to_end_lifecycle_with_durable_history() {
        init_tracing();
        let tracker = Tracker::connect(test_config()).await.unwrap();

        tracker.start("t1", "build", 60.0, 4).await;
        tracker.update_progress("t1", "compiling", None, Some(2)).await;

        let active = tracker.list_active().await;
        assert_eq!(active.len(), 1);
        assert!((active[0].progress_percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(active[0].current_step, "compiling");

        tracker.complete("t1", true).await;

        let active = tracker.list_active().await;
        assert_eq!(active[0].status, TaskStatus::Completed);
        assert!((active[0].progress_percent - 100.0).abs() < f64::EPSILON);

        // Reaped from the live view after the grace window
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert!(tracker.list_active().await.is_empty());

        // Still readable from the durable store
        let stored = tracker.store().get_task("t1").await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert!((stored.progress_percent - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn function_metrics_flow_into_reports_and_store() {
        let tracker = Tracker::in_memory().await.unwrap();

        tracker.record("generate_report", 10.0, true).await;
        tracker.record("generate_report", 20.0, true).await;
        tracker.record("backup", 5.0, false).await;

        let metric = tracker.get_function_metric("generate_report").await.unwrap();
        assert_eq!(metric.execution_count, 2);
        assert!((metric.avg_duration_secs - 15.0).abs() < 1e-9);

        let report = tracker.build_report().await;
        assert_eq!(report.function_metrics.len(), 2);
        // Most recent first
        assert_eq!(report.function_metrics[0].name, "backup");

        let store = tracker.store();
        tracker.shutdown().await;

        // Writer drained before shutdown returned
        let stored = store.get_metric("generate_report").await.unwrap().unwrap();
        assert_eq!(stored.execution_count, 2);
        let stored = store.get_metric("backup").await.unwrap().unwrap();
        assert_eq!(stored.failure_count, 1);
    }

    #[tokio::test]
    async fn store_outage_never_reaches_callers() {
        use chrono::{DateTime, Utc};
        use taskmon_store::error::Result as StoreResult;
        use taskmon_store::{StoreError, TaskCounts, TaskSnapshot};

        init_tracing();

        struct FailingStore;

        fn down<T>() -> StoreResult<T> {
            Err(StoreError::NotFound("store offline".into()))
        }

        #[async_trait::async_trait]
        impl ProgressStore for FailingStore {
            async fn upsert_task(&self, _: &TaskSnapshot) -> StoreResult<()> {
                down()
            }
            async fn get_task(&self, _: &str) -> StoreResult<Option<TaskSnapshot>> {
                down()
            }
            async fn list_tasks(
                &self,
                _: Option<TaskStatus>,
                _: i64,
            ) -> StoreResult<Vec<TaskSnapshot>> {
                down()
            }
            async fn upsert_metric(&self, _: &FunctionMetric) -> StoreResult<()> {
                down()
            }
            async fn get_metric(&self, _: &str) -> StoreResult<Option<FunctionMetric>> {
                down()
            }
            async fn list_metrics(&self, _: i64) -> StoreResult<Vec<FunctionMetric>> {
                down()
            }
            async fn count_tasks_by_status(&self) -> StoreResult<TaskCounts> {
                down()
            }
            async fn prune_tasks_before(&self, _: DateTime<Utc>) -> StoreResult<u64> {
                down()
            }
            async fn prune_metrics_before(&self, _: DateTime<Utc>) -> StoreResult<u64> {
                down()
            }
        }

        let tracker =
            Tracker::with_store(TrackerConfig::default(), Arc::new(FailingStore)).unwrap();

        // Every durable write fails; live state must keep advancing
        tracker.start("t1", "build", 60.0, 2).await;
        tracker.update_progress("t1", "step", None, Some(1)).await;
        tracker.record("f", 1.0, true).await;

        let active = tracker.list_active().await;
        assert_eq!(active.len(), 1);
        assert!((active[0].progress_percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(tracker.get_function_metric("f").await.unwrap().execution_count, 1);

        tracker.shutdown().await;
    }
}
