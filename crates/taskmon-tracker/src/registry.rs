use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::metrics::TrackerMetrics;
use crate::persist::{PersistHandle, PersistRequest};
use crate::task::{TaskRecord, TaskView};

/// Event emitted when live task state changes
#[derive(Clone, Debug)]
pub enum TaskEvent {
    Started(TaskRecord),
    Progressed(TaskRecord),
    Completed(TaskRecord),
    /// Task id evicted from the live view after the grace window
    Reaped(String),
}

/// Live task registry: the source of truth while a task is active
///
/// All handles share the same state; cloning is cheap. Each mutation holds the
/// write lock for the full update, so `list_active` never observes a record
/// mid-mutation.
#[derive(Clone)]
pub struct TaskRegistry {
    /// Live tasks by caller-assigned id
    tasks: Arc<RwLock<HashMap<String, TaskRecord>>>,

    /// Write-behind durable sink
    persist: PersistHandle,

    /// Prometheus instrumentation
    metrics: Arc<TrackerMetrics>,

    /// Event broadcaster
    event_sender: broadcast::Sender<TaskEvent>,

    /// Cancels pending reaps on shutdown
    shutdown: CancellationToken,

    /// Delay between terminal state and eviction from the live view
    grace_window: Duration,
}

impl TaskRegistry {
    pub fn new(
        persist: PersistHandle,
        metrics: Arc<TrackerMetrics>,
        grace_window: Duration,
        event_capacity: usize,
    ) -> Self {
        let (tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            persist,
            metrics,
            event_sender: tx,
            shutdown: CancellationToken::new(),
            grace_window,
        }
    }

    /// Subscribe to task events
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_sender.subscribe()
    }

    /// Begin tracking a task.
    ///
    /// An id that is already live is silently overwritten: progress resets to
    /// zero and status to running. Dashboards rely on this for "restart
    /// tracking resets state".
    #[instrument(skip(self), fields(id, name))]
    pub async fn start(&self, id: &str, name: &str, estimated_duration_secs: f64, total_steps: u32) {
        let record = TaskRecord::new(id, name, estimated_duration_secs, total_steps);

        {
            let mut tasks = self.tasks.write().await;
            match tasks.insert(id.to_string(), record.clone()) {
                Some(prior) => {
                    debug!(id = %id, prior_status = %prior.status, "Replacing existing task record");
                    self.metrics.task_overwritten();
                }
                None => self.metrics.task_started(),
            }
        }

        self.persist.submit(PersistRequest::TaskUpsert(record.snapshot()));
        let _ = self.event_sender.send(TaskEvent::Started(record));

        info!(id = %id, name = %name, total_steps = total_steps, "Tracking new task");
    }

    /// Apply a progress report. Unknown ids are a no-op, not an error: the
    /// tracker stays tolerant of out-of-order or duplicate signals.
    #[instrument(skip(self), fields(id, step))]
    pub async fn update_progress(
        &self,
        id: &str,
        step: &str,
        progress_percent: Option<f64>,
        steps_completed: Option<u32>,
    ) {
        let record = {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(id) {
                Some(record) => {
                    record.apply_progress(step, progress_percent, steps_completed);
                    record.clone()
                }
                None => {
                    warn!(id = %id, "Task not found for progress update");
                    return;
                }
            }
        };

        self.persist.submit(PersistRequest::TaskUpsert(record.snapshot()));
        let _ = self.event_sender.send(TaskEvent::Progressed(record.clone()));

        debug!(id = %id, step = %step, percent = record.progress_percent, "Task progress updated");
    }

    /// Move a task to its terminal state and schedule its eviction from the
    /// live view after the grace window. Unknown ids are a no-op.
    #[instrument(skip(self), fields(id, success))]
    pub async fn complete(&self, id: &str, success: bool) {
        let record = {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(id) {
                Some(record) if record.status.is_terminal() => {
                    // Duplicate completion signal; the first one already
                    // counted the task and scheduled its reap.
                    debug!(id = %id, status = %record.status, "Task already completed");
                    return;
                }
                Some(record) => {
                    record.finish(success);
                    record.clone()
                }
                None => {
                    warn!(id = %id, "Task not found for completion");
                    return;
                }
            }
        };

        let duration_secs =
            (record.last_update - record.start_time).num_milliseconds() as f64 / 1000.0;
        self.metrics.task_finished(success, duration_secs);

        self.persist.submit(PersistRequest::TaskUpsert(record.snapshot()));
        let _ = self.event_sender.send(TaskEvent::Completed(record.clone()));

        info!(id = %id, success = success, duration_secs = duration_secs, "Task completed");

        self.schedule_reap(id.to_string(), record.start_time);
    }

    /// Snapshot of every live task with derived timing fields
    pub async fn list_active(&self) -> Vec<TaskView> {
        let now = Utc::now();
        let tasks = self.tasks.read().await;
        tasks
            .values()
            .map(|record| TaskView::from_record(record, now))
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<TaskRecord> {
        let tasks = self.tasks.read().await;
        tasks.get(id).cloned()
    }

    /// Cancel pending reaps. Losing them only affects the in-memory
    /// convenience view; durable rows are already written.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Spawn the delayed eviction for a completed task. Never blocks the
    /// completing caller.
    fn schedule_reap(&self, id: String, started_at: DateTime<Utc>) {
        let tasks = Arc::clone(&self.tasks);
        let metrics = Arc::clone(&self.metrics);
        let event_sender = self.event_sender.clone();
        let shutdown = self.shutdown.clone();
        let grace = self.grace_window;

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(id = %id, "Reap cancelled by shutdown");
                    return;
                }
                _ = tokio::time::sleep(grace) => {}
            }

            let mut tasks = tasks.write().await;
            // The id may have been restarted during the grace window; only
            // evict the exact terminal record this reap was scheduled for.
            let evict = tasks
                .get(&id)
                .map(|record| record.status.is_terminal() && record.start_time == started_at)
                .unwrap_or(false);

            if evict {
                tasks.remove(&id);
                metrics.task_reaped();
                let _ = event_sender.send(TaskEvent::Reaped(id.clone()));
                debug!(id = %id, "Task evicted from live registry");
            }
        });
    }
}
