//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Records**: [`crate::MetricRecord`] and [`crate::AlertRecord`] travel
//!    over the two bounded buses and are consumed exactly once
//! 2. **Commands**: read-only queries sent to a specific consumer actor via
//!    mpsc, answered through a oneshot channel
//! 3. **Outputs**: what an actor hands back to the controller when it exits

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::{AlertRecord, Category, Severity, storage::memory::RetentionWindows};

/// Commands that can be sent to the AggregatorActor
#[derive(Debug)]
pub enum AggregatorCommand {
    /// Copy of the current retention windows plus counters
    Snapshot {
        respond_to: oneshot::Sender<AggregatorState>,
    },
}

/// Commands that can be sent to the AlertActor
#[derive(Debug)]
pub enum AlertCommand {
    /// Cumulative alert counts since startup
    GetCounts {
        respond_to: oneshot::Sender<AlertCounts>,
    },
}

/// Aggregator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorStats {
    /// Records pulled off the metric bus
    pub records_processed: u64,

    /// Records removed by retention
    pub records_purged: u64,

    /// Processing cycles that handled at least one record
    pub cycles: u64,

    /// Successful snapshot writes
    pub snapshots_written: u64,

    /// Failed snapshot writes (in-memory state kept)
    pub snapshot_failures: u64,
}

/// Everything the report needs from the aggregator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatorState {
    pub windows: RetentionWindows,
    pub stats: AggregatorStats,
    pub last_snapshot_at: Option<DateTime<Utc>>,
}

/// Alert counts for one severity breakdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u64,
    pub warning: u64,
    pub info: u64,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Warning => self.warning += 1,
            Severity::Info => self.info += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.critical + self.warning + self.info
    }

    /// Critical plus warning alerts
    pub fn actionable(&self) -> u64 {
        self.critical + self.warning
    }
}

/// Cumulative alert counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub total: u64,
    pub by_severity: SeverityCounts,
    pub by_category: BTreeMap<Category, SeverityCounts>,
}

impl AlertCounts {
    pub fn record(&mut self, alert: &AlertRecord) {
        self.total += 1;
        self.by_severity.record(alert.severity);
        self.by_category
            .entry(alert.category)
            .or_default()
            .record(alert.severity);
    }

    pub fn category(&self, category: Category) -> SeverityCounts {
        self.by_category.get(&category).copied().unwrap_or_default()
    }
}

/// Value an actor task resolves to once it has exited its loop
#[derive(Debug)]
pub enum TaskOutput {
    Sampler(Category),
    Aggregator(AggregatorState),
    AlertHandler(AlertCounts),
}
