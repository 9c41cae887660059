use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker written to a metric's `status` column on every report. Reflects
/// "last recorded", not "last succeeded".
pub const METRIC_STATUS_RECORDED: &str = "completed";

/// Task lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task is in flight and reporting progress
    Running,

    /// Task finished successfully
    Completed,

    /// Task finished with an error
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            _ => TaskStatus::Running,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted form of a tracked task.
///
/// One row per task id; repeated writes for the same id upsert in place, so
/// the durable table always holds the latest observed state of each task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Caller-assigned task id
    pub task_id: String,

    /// Human-readable label
    pub task_name: String,

    /// Creation timestamp
    pub start_time: DateTime<Utc>,

    /// Informational estimate, never enforced
    pub estimated_duration_secs: f64,

    /// Free-text label of the current step
    pub current_step: String,

    /// Always within [0, 100]
    pub progress_percent: f64,

    /// Lifecycle status
    pub status: TaskStatus,

    pub steps_completed: u32,
    pub total_steps: u32,

    /// Refreshed on every mutation
    pub last_update: DateTime<Utc>,
}

/// Aggregated success/failure/timing statistics for a named operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionMetric {
    /// Unique function name
    pub name: String,

    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,

    /// Incremental mean over all reported durations
    pub avg_duration_secs: f64,

    /// Timestamp of the most recent report
    pub last_execution: DateTime<Utc>,

    /// Last-recorded marker (see [`METRIC_STATUS_RECORDED`])
    pub status: String,
}

impl FunctionMetric {
    /// Create a metric from the first report for a name.
    pub fn first(name: &str, duration_secs: f64, success: bool) -> Self {
        Self {
            name: name.to_string(),
            execution_count: 1,
            success_count: if success { 1 } else { 0 },
            failure_count: if success { 0 } else { 1 },
            avg_duration_secs: duration_secs,
            last_execution: Utc::now(),
            status: METRIC_STATUS_RECORDED.to_string(),
        }
    }

    /// Fold one more report into the aggregate. The mean is updated
    /// incrementally, so no per-execution history is retained.
    pub fn observe(&mut self, duration_secs: f64, success: bool) {
        let n = self.execution_count as f64;
        self.avg_duration_secs = (self.avg_duration_secs * n + duration_secs) / (n + 1.0);
        self.execution_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.last_execution = Utc::now();
        self.status = METRIC_STATUS_RECORDED.to_string();
    }

    /// Success percentage in [0, 100]; 0 when nothing has been recorded.
    pub fn success_rate(&self) -> f64 {
        if self.execution_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.execution_count as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_mean_matches_batch_mean() {
        let mut m = FunctionMetric::first("f", 10.0, true);
        m.observe(20.0, true);
        assert_eq!(m.execution_count, 2);
        assert!((m.avg_duration_secs - 15.0).abs() < f64::EPSILON);
        assert!((m.success_rate() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mixed_outcomes_split_counters() {
        let mut m = FunctionMetric::first("g", 5.0, false);
        m.observe(5.0, true);
        assert_eq!(m.execution_count, 2);
        assert_eq!(m.success_count, 1);
        assert_eq!(m.failure_count, 1);
        assert!((m.success_rate() - 50.0).abs() < f64::EPSILON);
        assert!((m.avg_duration_secs - 5.0).abs() < f64::EPSILON);
        assert_eq!(m.status, METRIC_STATUS_RECORDED);
    }

    #[test]
    fn status_roundtrip() {
        for status in [TaskStatus::Running, TaskStatus::Completed, TaskStatus::Failed] {
            assert_eq!(TaskStatus::parse(status.as_str()), status);
        }
        assert_eq!(TaskStatus::parse("garbage"), TaskStatus::Running);
    }
}
