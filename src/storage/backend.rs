//! Snapshot store trait definition
//!
//! The aggregator persists its full in-memory state through a
//! [`SnapshotStore`]. The production store writes JSON files
//! ([`super::snapshot::JsonSnapshotStore`]); [`MemorySnapshotStore`] keeps
//! snapshots in memory for tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::memory::RetentionWindows;
use crate::error::PersistenceError;

/// Point-in-time copy of every retention window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub windows: RetentionWindows,
}

impl Snapshot {
    pub fn new(windows: RetentionWindows) -> Self {
        Self {
            taken_at: Utc::now(),
            windows,
        }
    }
}

/// Durable storage for aggregator snapshots
///
/// Implementations must be `Send + Sync`; the aggregator calls them from
/// its own task and is the only writer.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Write one snapshot. A write that has started always completes.
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;

    /// Delete snapshots older than the store's retention relative to `now`.
    ///
    /// Returns the number of snapshots deleted.
    async fn prune(&self, now: DateTime<Utc>) -> Result<usize, PersistenceError>;

    /// The most recent readable snapshot, if any.
    async fn load_latest(&self) -> Result<Option<Snapshot>, PersistenceError>;

    /// Where snapshots end up (for logging).
    fn location(&self) -> PathBuf;
}

/// In-memory snapshot store
///
/// Clones share the same storage, so a test can hand one clone to the
/// aggregator and inspect the other.
#[derive(Debug, Clone)]
pub struct MemorySnapshotStore {
    snapshots: Arc<Mutex<Vec<Snapshot>>>,
    retention: Duration,
}

impl MemorySnapshotStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(Vec::new())),
            retention,
        }
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(7 * 86_400))
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        if let Ok(mut guard) = self.snapshots.lock() {
            guard.push(snapshot.clone());
        }
        Ok(())
    }

    async fn prune(&self, now: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let Some(cutoff) = TimeDelta::from_std(self.retention)
            .ok()
            .and_then(|delta| now.checked_sub_signed(delta))
        else {
            return Ok(0);
        };

        let Ok(mut guard) = self.snapshots.lock() else {
            return Ok(0);
        };
        let before = guard.len();
        guard.retain(|s| s.taken_at >= cutoff);
        Ok(before - guard.len())
    }

    async fn load_latest(&self) -> Result<Option<Snapshot>, PersistenceError> {
        Ok(self
            .snapshots
            .lock()
            .ok()
            .and_then(|guard| guard.iter().max_by_key(|s| s.taken_at).cloned()))
    }

    fn location(&self) -> PathBuf {
        PathBuf::from("<memory>")
    }
}
