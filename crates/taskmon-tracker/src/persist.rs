//! Write-behind persistence
//!
//! The hot mutation path never touches the database. Mutations enqueue a
//! [`PersistRequest`] on a bounded channel via `try_send`; a spawned writer
//! loop drains the channel into the [`ProgressStore`]. A full or closed
//! channel, and any store error, degrade to a log line — in-memory state is
//! authoritative and persistence failures never reach the caller.

use std::sync::Arc;

use taskmon_store::{FunctionMetric, ProgressStore, TaskSnapshot};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One durable write, queued from the hot path
#[derive(Debug, Clone)]
pub enum PersistRequest {
    TaskUpsert(TaskSnapshot),
    MetricUpsert(FunctionMetric),
}

/// Cheap cloneable sender handed to the registry and the aggregator
#[derive(Clone)]
pub struct PersistHandle {
    sender: mpsc::Sender<PersistRequest>,
}

impl PersistHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PersistRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Enqueue without blocking. Dropping the write is acceptable: the durable
    /// copy goes stale, the live view does not.
    pub fn submit(&self, request: PersistRequest) {
        if let Err(err) = self.sender.try_send(request) {
            debug!("Dropping durable write: {}", err);
        }
    }
}

/// Spawn the writer loop. Returns the handle so the owner can await drain on
/// shutdown; the loop exits when every [`PersistHandle`] is dropped.
pub fn spawn_writer(
    store: Arc<dyn ProgressStore>,
    mut receiver: mpsc::Receiver<PersistRequest>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = receiver.recv().await {
            let result = match &request {
                PersistRequest::TaskUpsert(snapshot) => store.upsert_task(snapshot).await,
                PersistRequest::MetricUpsert(metric) => store.upsert_metric(metric).await,
            };

            if let Err(err) = result {
                warn!("Durable write failed (state kept in memory): {}", err);
            }
        }

        debug!("Persistence writer drained and stopped");
    })
}
