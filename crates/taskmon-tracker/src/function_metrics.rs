use std::collections::HashMap;
use std::sync::Arc;

use taskmon_store::FunctionMetric;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::metrics::TrackerMetrics;
use crate::persist::{PersistHandle, PersistRequest};

/// Rolling per-function statistics, owned for the process lifetime
///
/// Entries are created on first report and never deleted here; age-based
/// pruning of the durable copies is left to external retention jobs.
#[derive(Clone)]
pub struct FunctionAggregator {
    metrics_by_name: Arc<RwLock<HashMap<String, FunctionMetric>>>,
    persist: PersistHandle,
    metrics: Arc<TrackerMetrics>,
}

impl FunctionAggregator {
    pub fn new(persist: PersistHandle, metrics: Arc<TrackerMetrics>) -> Self {
        Self {
            metrics_by_name: Arc::new(RwLock::new(HashMap::new())),
            persist,
            metrics,
        }
    }

    /// Fold one completed unit of work into the aggregate for `name`
    #[instrument(skip(self), fields(name, success))]
    pub async fn record(&self, name: &str, duration_secs: f64, success: bool) {
        let updated = {
            let mut map = self.metrics_by_name.write().await;
            let metric = map
                .entry(name.to_string())
                .and_modify(|metric| metric.observe(duration_secs, success))
                .or_insert_with(|| FunctionMetric::first(name, duration_secs, success));
            metric.clone()
        };

        self.metrics.function_reported();
        self.persist.submit(PersistRequest::MetricUpsert(updated.clone()));

        debug!(
            name = %name,
            executions = updated.execution_count,
            avg_secs = updated.avg_duration_secs,
            "Function execution recorded"
        );
    }

    pub async fn get(&self, name: &str) -> Option<FunctionMetric> {
        let map = self.metrics_by_name.read().await;
        map.get(name).cloned()
    }

    /// All aggregates, most recently executed first
    pub async fn snapshot(&self) -> Vec<FunctionMetric> {
        let map = self.metrics_by_name.read().await;
        let mut metrics: Vec<FunctionMetric> = map.values().cloned().collect();
        metrics.sort_by(|a, b| b.last_execution.cmp(&a.last_execution));
        metrics
    }
}
