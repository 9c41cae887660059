use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskmon_store::FunctionMetric;

use crate::function_metrics::FunctionAggregator;
use crate::registry::TaskRegistry;
use crate::task::TaskView;

/// Point-in-time view handed to dashboards and report generators
///
/// System-resource enrichment (CPU/memory) is deliberately absent; callers
/// merge that from their own collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Live tasks with derived timing fields
    pub active_tasks: Vec<TaskView>,

    /// All function aggregates, most recently executed first
    pub function_metrics: Vec<FunctionMetric>,

    /// When this report was assembled
    pub report_timestamp: DateTime<Utc>,
}

/// Builds consistent snapshots from the live registry and the aggregator
#[derive(Clone)]
pub struct ReportAssembler {
    registry: TaskRegistry,
    aggregator: FunctionAggregator,
}

impl ReportAssembler {
    pub fn new(registry: TaskRegistry, aggregator: FunctionAggregator) -> Self {
        Self {
            registry,
            aggregator,
        }
    }

    pub async fn build_report(&self) -> ProgressReport {
        ProgressReport {
            active_tasks: self.registry.list_active().await,
            function_metrics: self.aggregator.snapshot().await,
            report_timestamp: Utc::now(),
        }
    }
}
