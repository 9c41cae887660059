//! Taskmon Tracker - Live Task Progress and Function Metrics Engine
//!
//! Exposes a real-time view of in-flight work and historical execution
//! quality for a set of named operations:
//! - Task registry: `start` / `update_progress` / `complete` / `list_active`
//! - Function aggregator: rolling success/failure/timing stats per name
//! - Reaper: evicts terminal tasks from the live view after a grace window
//! - Report assembler: point-in-time snapshot for dashboards
//!
//! The live maps are the source of truth; the durable store in
//! `taskmon-store` is a write-behind sink that never gates the hot path.
//! The engine does not schedule or execute the work itself — callers report
//! state transitions and durations to it.

pub mod config;
pub mod error;
pub mod function_metrics;
pub mod metrics;
pub mod persist;
pub mod registry;
pub mod report;
pub mod task;
pub mod tracker;

pub use config::TrackerConfig;
pub use error::TrackerError;
pub use function_metrics::FunctionAggregator;
pub use metrics::TrackerMetrics;
pub use registry::{TaskEvent, TaskRegistry};
pub use report::{ProgressReport, ReportAssembler};
pub use task::{TaskRecord, TaskView};
pub use tracker::Tracker;

pub use taskmon_store::{FunctionMetric, TaskSnapshot, TaskStatus};
