//! Tracker configuration
//!
//! All knobs come from `TASKMON_*` environment variables with sane defaults,
//! so embedding services can configure the tracker without a config file.
//! Malformed values are logged and fall back to the default rather than
//! failing startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default delay between a terminal state and eviction from the live view
pub const DEFAULT_GRACE_WINDOW_SECS: u64 = 5;

/// Default bound on the write-behind queue
pub const DEFAULT_PERSIST_QUEUE_CAPACITY: usize = 1024;

/// Default capacity of the task event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// SQLite URL for the durable store, e.g. `sqlite:///var/lib/taskmon/taskmon.db`
    pub database_url: String,

    /// Grace window in seconds
    pub grace_window_secs: u64,

    /// Write-behind queue capacity; overflow drops durable writes, never blocks
    pub persist_queue_capacity: usize,

    /// Task event broadcast capacity
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            grace_window_secs: DEFAULT_GRACE_WINDOW_SECS,
            persist_queue_capacity: DEFAULT_PERSIST_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl TrackerConfig {
    /// Build a config from `TASKMON_*` environment variables.
    ///
    /// Recognized variables:
    /// - `TASKMON_DATABASE_URL`
    /// - `TASKMON_GRACE_WINDOW_SECS`
    /// - `TASKMON_PERSIST_QUEUE_CAPACITY`
    /// - `TASKMON_EVENT_CAPACITY`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("TASKMON_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(secs) = parse_env("TASKMON_GRACE_WINDOW_SECS") {
            config.grace_window_secs = secs;
        }
        if let Some(capacity) = parse_env("TASKMON_PERSIST_QUEUE_CAPACITY") {
            config.persist_queue_capacity = capacity;
        }
        if let Some(capacity) = parse_env("TASKMON_EVENT_CAPACITY") {
            config.event_capacity = capacity;
        }

        config
    }

    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}", name, raw);
            None
        }
    }
}
