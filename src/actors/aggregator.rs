//! AggregatorActor - Owns the retention windows
//!
//! Single consumer of the metric bus. Every cycle it takes a bounded batch
//! off the bus, appends it to the per-category windows, purges records that
//! fell out of retention and, if the batch was not empty, persists a
//! snapshot of every window.
//!
//! ## Message Flow
//!
//! ```text
//! Metric Bus ──► batch (≤ max_batch) ──► RetentionWindows ──► purge
//!                                              │
//!                                              └─► SnapshotStore::persist + prune
//!
//! AggregatorCommand::Snapshot ──► copy of the current state
//! ```
//!
//! Once deactivated it keeps draining until the bus closes, which happens
//! when the last sampler holding a sender is gone. Snapshot failures are
//! logged and counted; the in-memory windows are never rolled back.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace, warn};

use crate::{
    MetricRecord,
    config::Settings,
    storage::{RetentionWindows, Snapshot, SnapshotStore},
};

use super::{
    active::ActiveFlag,
    messages::{AggregatorCommand, AggregatorState, AggregatorStats, TaskOutput},
};

pub struct AggregatorActor {
    metric_rx: mpsc::Receiver<MetricRecord>,

    command_rx: mpsc::Receiver<AggregatorCommand>,

    store: Arc<dyn SnapshotStore>,

    active: ActiveFlag,

    windows: RetentionWindows,

    stats: AggregatorStats,

    last_snapshot_at: Option<DateTime<Utc>>,

    retention: Duration,

    drain_interval: Duration,

    max_batch: usize,
}

impl AggregatorActor {
    pub fn new(
        metric_rx: mpsc::Receiver<MetricRecord>,
        command_rx: mpsc::Receiver<AggregatorCommand>,
        store: Arc<dyn SnapshotStore>,
        active: ActiveFlag,
        settings: &Settings,
    ) -> Self {
        Self {
            metric_rx,
            command_rx,
            store,
            active,
            windows: RetentionWindows::new(),
            stats: AggregatorStats::default(),
            last_snapshot_at: None,
            retention: settings.retention,
            drain_interval: settings.drain_interval,
            max_batch: settings.max_batch,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) -> TaskOutput {
        debug!(
            "starting aggregator actor, snapshots go to {}",
            self.store.location().display()
        );

        loop {
            if !self.active.is_active() {
                break;
            }

            let mut batch = Vec::new();
            tokio::select! {
                maybe_record = self.metric_rx.recv() => match maybe_record {
                    Some(record) => batch.push(record),
                    None => {
                        warn!("metric bus closed, shutting down");
                        break;
                    }
                },

                Some(cmd) = self.command_rx.recv() => {
                    self.handle_command(cmd);
                    continue;
                }

                _ = tokio::time::sleep(self.drain_interval) => {}

                _ = self.active.deactivated() => break,
            }

            self.fill_batch(&mut batch);
            self.process_batch(batch).await;
        }

        let mut drained = 0;
        while let Some(record) = self.metric_rx.recv().await {
            let mut batch = vec![record];
            self.fill_batch(&mut batch);
            drained += batch.len();
            self.process_batch(batch).await;
        }
        if drained > 0 {
            debug!("drained {drained} records after deactivation");
        }

        debug!(
            "aggregator actor stopped after {} records",
            self.stats.records_processed
        );
        TaskOutput::Aggregator(self.state())
    }

    fn handle_command(&self, cmd: AggregatorCommand) {
        match cmd {
            AggregatorCommand::Snapshot { respond_to } => {
                trace!("received Snapshot command");
                let _ = respond_to.send(self.state());
            }
        }
    }

    /// Top `batch` up with whatever is already queued, up to `max_batch`.
    fn fill_batch(&mut self, batch: &mut Vec<MetricRecord>) {
        while batch.len() < self.max_batch {
            match self.metric_rx.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }
    }

    async fn process_batch(&mut self, batch: Vec<MetricRecord>) {
        let processed = batch.len();
        for record in batch {
            self.windows.ingest(record);
        }

        let now = Utc::now();
        let purged = self.windows.purge(now, self.retention);
        self.stats.records_processed += processed as u64;
        self.stats.records_purged += purged as u64;

        if purged > 0 {
            trace!("purged {purged} records past retention");
        }
        if processed == 0 {
            return;
        }
        self.stats.cycles += 1;

        let snapshot = Snapshot {
            taken_at: now,
            windows: self.windows.clone(),
        };
        match self.store.persist(&snapshot).await {
            Ok(()) => {
                self.stats.snapshots_written += 1;
                self.last_snapshot_at = Some(now);
                trace!("persisted snapshot with {} records", self.windows.total_len());
            }
            Err(e) => {
                self.stats.snapshot_failures += 1;
                error!("failed to persist snapshot: {e}");
            }
        }

        match self.store.prune(now).await {
            Ok(0) => {}
            Ok(pruned) => debug!("pruned {pruned} expired snapshots"),
            Err(e) => error!("failed to prune snapshots: {e}"),
        }
    }

    fn state(&self) -> AggregatorState {
        AggregatorState {
            windows: self.windows.clone(),
            stats: self.stats,
            last_snapshot_at: self.last_snapshot_at,
        }
    }
}

/// Handle for querying the AggregatorActor
#[derive(Clone)]
pub struct AggregatorHandle {
    sender: mpsc::Sender<AggregatorCommand>,
}

impl AggregatorHandle {
    /// Spawn the actor; its join handle yields the final state.
    pub fn spawn(
        metric_rx: mpsc::Receiver<MetricRecord>,
        store: Arc<dyn SnapshotStore>,
        active: ActiveFlag,
        settings: &Settings,
    ) -> (Self, JoinHandle<TaskOutput>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let actor = AggregatorActor::new(metric_rx, cmd_rx, store, active, settings);
        let join = tokio::spawn(actor.run());
        (Self { sender: cmd_tx }, join)
    }

    /// Current windows and counters; `None` once the actor has exited.
    pub async fn state(&self) -> Option<AggregatorState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AggregatorCommand::Snapshot { respond_to: tx })
            .await
            .ok()?;
        rx.await.ok()
    }
}
