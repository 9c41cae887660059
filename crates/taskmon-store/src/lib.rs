//! Taskmon Durable Store - Task History and Function Metrics Ledger
//!
//! Provides persistent storage for task progress snapshots and aggregated
//! function metrics:
//! RUNNING → COMPLETED/FAILED
//!
//! Features:
//! - SQLite persistent storage (pooled, async)
//! - Upsert semantics keyed by task id / function name
//! - Age-based pruning for external retention jobs
//!
//! The store is a write-behind sink: the live tracker in `taskmon-tracker`
//! remains the source of truth while a task is active, and store failures are
//! never allowed to gate in-memory progress.

pub mod error;
pub mod model;
pub mod sqlite_store;
pub mod store;

pub use error::StoreError;
pub use model::{FunctionMetric, TaskSnapshot, TaskStatus};
pub use sqlite_store::SqliteStore;
pub use store::{ProgressStore, TaskCounts};
