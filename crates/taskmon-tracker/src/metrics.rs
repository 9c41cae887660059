use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

/// Tracker instrumentation for scraping by outer layers
#[derive(Clone)]
pub struct TrackerMetrics {
    /// Total tasks started
    tasks_started: IntCounter,

    /// Currently tracked live tasks
    active_tasks: IntGauge,

    /// Tasks completed successfully
    tasks_completed: IntCounter,

    /// Tasks failed
    tasks_failed: IntCounter,

    /// Wall-clock task duration, observed at completion
    task_duration: Histogram,

    /// Function metric reports received
    function_reports: IntCounter,

    /// Registry for scraping
    registry: Registry,
}

impl TrackerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tasks_started = IntCounter::new(
            "taskmon_tasks_started_total",
            "Total number of tasks started",
        )?;
        registry.register(Box::new(tasks_started.clone()))?;

        let active_tasks = IntGauge::new(
            "taskmon_active_tasks",
            "Number of tasks currently tracked in the live registry",
        )?;
        registry.register(Box::new(active_tasks.clone()))?;

        let tasks_completed = IntCounter::new(
            "taskmon_tasks_completed_total",
            "Total number of tasks completed successfully",
        )?;
        registry.register(Box::new(tasks_completed.clone()))?;

        let tasks_failed = IntCounter::new(
            "taskmon_tasks_failed_total",
            "Total number of failed tasks",
        )?;
        registry.register(Box::new(tasks_failed.clone()))?;

        let task_duration = Histogram::with_opts(
            HistogramOpts::new(
                "taskmon_task_duration_seconds",
                "Task duration from start to completion in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
        )?;
        registry.register(Box::new(task_duration.clone()))?;

        let function_reports = IntCounter::new(
            "taskmon_function_reports_total",
            "Total number of function metric reports received",
        )?;
        registry.register(Box::new(function_reports.clone()))?;

        Ok(Self {
            tasks_started,
            active_tasks,
            tasks_completed,
            tasks_failed,
            task_duration,
            function_reports,
            registry,
        })
    }

    pub fn task_started(&self) {
        self.tasks_started.inc();
        self.active_tasks.inc();
    }

    /// Silent overwrite of a live id replaces a record without a reap, so the
    /// gauge must not grow.
    pub fn task_overwritten(&self) {
        self.tasks_started.inc();
    }

    pub fn task_finished(&self, success: bool, duration_secs: f64) {
        if success {
            self.tasks_completed.inc();
        } else {
            self.tasks_failed.inc();
        }
        self.task_duration.observe(duration_secs.max(0.0));
    }

    pub fn task_reaped(&self) {
        self.active_tasks.dec();
    }

    pub fn function_reported(&self) {
        self.function_reports.inc();
    }

    /// Get metrics registry for scraping
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
