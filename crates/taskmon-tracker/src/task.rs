use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskmon_store::{TaskSnapshot, TaskStatus};

/// Live record for a task being tracked
///
/// Owned exclusively by the registry while the task is in flight; readers only
/// ever see copies taken under the registry lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Caller-assigned task id
    pub id: String,

    /// Human-readable label
    pub name: String,

    /// Creation timestamp
    pub start_time: DateTime<Utc>,

    /// Informational estimate, never enforced
    pub estimated_duration_secs: f64,

    /// Free-text label of the current step
    pub current_step: String,

    /// Clamped to [0, 100] on every write
    pub progress_percent: f64,

    /// Lifecycle status
    pub status: TaskStatus,

    pub steps_completed: u32,
    pub total_steps: u32,

    /// Refreshed on every mutation
    pub last_update: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a fresh record in the running state
    pub fn new(id: &str, name: &str, estimated_duration_secs: f64, total_steps: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            start_time: now,
            estimated_duration_secs,
            current_step: "Initializing".to_string(),
            progress_percent: 0.0,
            status: TaskStatus::Running,
            steps_completed: 0,
            total_steps,
            last_update: now,
        }
    }

    /// Apply a progress report.
    ///
    /// A supplied step count wins over a supplied percent: when `total_steps`
    /// is known the percent is recomputed from the ratio.
    pub fn apply_progress(
        &mut self,
        step: &str,
        percent: Option<f64>,
        steps_completed: Option<u32>,
    ) {
        self.current_step = step.to_string();

        if let Some(percent) = percent {
            self.progress_percent = percent.clamp(0.0, 100.0);
        }

        if let Some(steps) = steps_completed {
            if self.total_steps > 0 {
                let steps = steps.min(self.total_steps);
                self.steps_completed = steps;
                self.progress_percent = steps as f64 / self.total_steps as f64 * 100.0;
            } else {
                self.steps_completed = steps;
            }
        }

        self.last_update = Utc::now();
    }

    /// Move to a terminal status. Success pins progress at 100; failure keeps
    /// the last reported value.
    pub fn finish(&mut self, success: bool) {
        if success {
            self.status = TaskStatus::Completed;
            self.progress_percent = 100.0;
        } else {
            self.status = TaskStatus::Failed;
        }
        self.last_update = Utc::now();
    }

    /// Persisted form for the durable sink
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.id.clone(),
            task_name: self.name.clone(),
            start_time: self.start_time,
            estimated_duration_secs: self.estimated_duration_secs,
            current_step: self.current_step.clone(),
            progress_percent: self.progress_percent,
            status: self.status,
            steps_completed: self.steps_completed,
            total_steps: self.total_steps,
            last_update: self.last_update,
        }
    }
}

/// Read model served to dashboards: the stored fields plus derived timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    pub id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub estimated_duration_secs: f64,
    pub current_step: String,
    pub progress_percent: f64,
    pub status: TaskStatus,
    pub steps_completed: u32,
    pub total_steps: u32,
    pub last_update: DateTime<Utc>,

    /// Seconds since the task started
    pub elapsed_secs: f64,

    /// `max(0, estimated_duration - elapsed)`
    pub estimated_remaining_secs: f64,
}

impl TaskView {
    pub fn from_record(record: &TaskRecord, now: DateTime<Utc>) -> Self {
        let elapsed = (now - record.start_time).num_milliseconds() as f64 / 1000.0;
        let elapsed = elapsed.max(0.0);
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            start_time: record.start_time,
            estimated_duration_secs: record.estimated_duration_secs,
            current_step: record.current_step.clone(),
            progress_percent: record.progress_percent,
            status: record.status,
            steps_completed: record.steps_completed,
            total_steps: record.total_steps,
            last_update: record.last_update,
            elapsed_secs: elapsed,
            estimated_remaining_secs: (record.estimated_duration_secs - elapsed).max(0.0),
        }
    }
}
