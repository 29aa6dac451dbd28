//! Persistence for the monitoring pipeline
//!
//! - **memory**: the aggregator's per-category retention windows
//! - **backend**: the `SnapshotStore` trait and an in-memory store
//! - **snapshot**: JSON snapshot files with time-based pruning
//! - **alert_log**: the append-only JSON Lines alert history

pub mod alert_log;
pub mod backend;
pub mod memory;
pub mod snapshot;

pub use alert_log::AlertLog;
pub use backend::{MemorySnapshotStore, Snapshot, SnapshotStore};
pub use memory::RetentionWindows;
pub use snapshot::JsonSnapshotStore;
