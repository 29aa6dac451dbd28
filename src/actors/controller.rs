//! Lifecycle controller
//!
//! Starts one sampler per collector plus the aggregator and the alert
//! handler, and on stop joins them with a bounded timeout and writes the
//! final report.
//!
//! Samplers are joined before the consumers. The buses close when the last
//! sampler is gone, and the consumers drain them to the end, so every
//! record a sampler managed to publish is consumed. A sampler that misses
//! its join window is aborted; it can only be parked on its collector call
//! at that point, and aborting it releases its bus senders.
//!
//! ## State Machine
//!
//! ```text
//! Idle ──start()──► Running ──stop()──► Stopping ──joins done──► Stopped
//!   │                                                              ▲
//!   └─────────────────────────stop()───────────────────────────────┘
//! ```
//!
//! All transitions happen under one lock, so a second `stop()` waits for
//! the first to finish and then returns without a report.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    collectors::CollectorSet,
    config::Settings,
    error::{ControllerError, PersistenceError, ShutdownTimeoutError},
    report::{DropSummary, FINAL_REPORT_PREFIX, MonitoringReport, ReportSource, write_report},
    storage::{AlertLog, JsonSnapshotStore, RetentionWindows, SnapshotStore},
};

use super::{
    active::ActiveSwitch,
    aggregator::AggregatorHandle,
    alert::AlertHandle,
    bus::{DropCounter, bus},
    messages::{AlertCounts, TaskOutput},
    sampler::{SamplerConfig, SamplerHandle},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Handles of a running pipeline
struct Pipeline {
    started_at: DateTime<Utc>,
    switch: ActiveSwitch,
    samplers: Vec<SamplerHandle>,
    aggregator: AggregatorHandle,
    aggregator_join: JoinHandle<TaskOutput>,
    alerts: AlertHandle,
    alert_join: JoinHandle<TaskOutput>,
    metric_drops: DropCounter,
    alert_drops: DropCounter,
}

pub struct Controller {
    settings: Arc<Settings>,
    store: Arc<dyn SnapshotStore>,
    state_tx: watch::Sender<LifecycleState>,
    pipeline: Mutex<Option<Pipeline>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Controller persisting snapshots as JSON files below the state directory.
    pub fn new(settings: Settings) -> Result<Self, ControllerError> {
        let store = JsonSnapshotStore::new(settings.snapshot_dir(), settings.snapshot_retention);
        Self::with_store(settings, Arc::new(store))
    }

    pub fn with_store(
        settings: Settings,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self, ControllerError> {
        settings.validate()?;
        let (state_tx, _) = watch::channel(LifecycleState::Idle);
        Ok(Self {
            settings: Arc::new(settings),
            store,
            state_tx,
            pipeline: Mutex::new(None),
        })
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Spawn every task. Only valid while `Idle`.
    #[instrument(skip(self, collectors))]
    pub async fn start(&self, collectors: CollectorSet) -> Result<(), ControllerError> {
        let mut pipeline = self.pipeline.lock().await;
        if self.state() != LifecycleState::Idle {
            return Err(ControllerError::AlreadyStarted);
        }

        for dir in [&self.settings.state_dir, &self.settings.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| PersistenceError::io(dir, e))?;
        }

        let switch = ActiveSwitch::new();
        let (metric_tx, metric_rx) = bus("metric", self.settings.metric_bus_capacity);
        let (alert_tx, alert_rx) = bus("alert", self.settings.alert_bus_capacity);

        let (aggregator, aggregator_join) = AggregatorHandle::spawn(
            metric_rx,
            Arc::clone(&self.store),
            switch.subscribe(),
            &self.settings,
        );
        let (alerts, alert_join) = AlertHandle::spawn(
            alert_rx,
            AlertLog::new(self.settings.alert_log_path()),
            switch.subscribe(),
            &self.settings,
        );

        let thresholds = Arc::new(self.settings.thresholds.clone());
        let samplers: Vec<_> = collectors
            .into_inner()
            .into_iter()
            .map(|collector| {
                let config = SamplerConfig {
                    interval: self.settings.interval(collector.category()),
                    collect_timeout: self.settings.collect_timeout,
                    thresholds: Arc::clone(&thresholds),
                };
                SamplerHandle::spawn(
                    collector,
                    config,
                    metric_tx.clone(),
                    alert_tx.clone(),
                    switch.subscribe(),
                )
            })
            .collect();

        info!(
            "monitoring started with {} samplers, state in {}",
            samplers.len(),
            self.settings.state_dir.display()
        );

        *pipeline = Some(Pipeline {
            started_at: Utc::now(),
            switch,
            samplers,
            aggregator,
            aggregator_join,
            alerts,
            alert_join,
            metric_drops: metric_tx.drop_counter(),
            alert_drops: alert_tx.drop_counter(),
        });
        self.state_tx.send_replace(LifecycleState::Running);
        Ok(())
    }

    /// Stop every task and write the final report.
    ///
    /// Returns the report only for the call that stopped a running pipeline.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Option<MonitoringReport> {
        let mut guard = self.pipeline.lock().await;
        match self.state() {
            LifecycleState::Running => {}
            LifecycleState::Idle => {
                debug!("stop requested before start");
                self.state_tx.send_replace(LifecycleState::Stopped);
                return None;
            }
            LifecycleState::Stopping | LifecycleState::Stopped => return None,
        }

        let Some(pipeline) = guard.take() else {
            self.state_tx.send_replace(LifecycleState::Stopped);
            return None;
        };

        self.state_tx.send_replace(LifecycleState::Stopping);
        info!("stopping monitoring");
        pipeline.switch.deactivate();

        let timeout = self.settings.join_timeout;
        let sampler_joins = pipeline.samplers.into_iter().map(move |handle| async move {
            let name = handle.task_name();
            let mut join = handle.into_join();
            if join_task(name, &mut join, timeout).await.is_none() {
                join.abort();
            }
        });
        join_all(sampler_joins).await;

        let mut aggregator_join = pipeline.aggregator_join;
        let mut alert_join = pipeline.alert_join;
        let (aggregator_output, alert_output) = tokio::join!(
            join_task("aggregator".to_string(), &mut aggregator_join, timeout),
            join_task("alert-handler".to_string(), &mut alert_join, timeout),
        );

        let windows = match aggregator_output {
            Some(TaskOutput::Aggregator(state)) => state.windows,
            _ => self.last_persisted_windows().await,
        };
        let alerts = match alert_output {
            Some(TaskOutput::AlertHandler(counts)) => counts,
            _ => self.logged_alert_counts().await,
        };
        let drops = DropSummary {
            metrics: pipeline.metric_drops.get(),
            alerts: pipeline.alert_drops.get(),
        };
        if drops.metrics > 0 || drops.alerts > 0 {
            warn!(
                "dropped {} metric records and {} alerts on full buses",
                drops.metrics, drops.alerts
            );
        }

        let report = MonitoringReport::build(
            &windows,
            alerts,
            drops,
            Some(pipeline.started_at),
            ReportSource::Live,
        );
        if let Err(e) = write_report(&report, &self.settings.output_dir, FINAL_REPORT_PREFIX).await
        {
            error!("failed to write final report: {e}");
        }

        self.state_tx.send_replace(LifecycleState::Stopped);
        info!("monitoring stopped");
        Some(report)
    }

    /// Provisional report while running.
    ///
    /// The pipeline lock is released before the actors are queried, so a
    /// concurrent `stop()` never waits behind a slow snapshot write.
    pub async fn report(&self) -> Option<MonitoringReport> {
        let (aggregator, alerts, metric_drops, alert_drops, started_at) = {
            let guard = self.pipeline.lock().await;
            let pipeline = guard.as_ref()?;
            (
                pipeline.aggregator.clone(),
                pipeline.alerts.clone(),
                pipeline.metric_drops.clone(),
                pipeline.alert_drops.clone(),
                pipeline.started_at,
            )
        };

        let windows = aggregator.state().await?.windows;
        let alerts = alerts.counts().await?;
        let drops = DropSummary {
            metrics: metric_drops.get(),
            alerts: alert_drops.get(),
        };

        Some(MonitoringReport::build(
            &windows,
            alerts,
            drops,
            Some(started_at),
            ReportSource::Live,
        ))
    }

    async fn last_persisted_windows(&self) -> RetentionWindows {
        match self.store.load_latest().await {
            Ok(Some(snapshot)) => snapshot.windows,
            Ok(None) => RetentionWindows::new(),
            Err(e) => {
                error!("failed to load latest snapshot: {e}");
                RetentionWindows::new()
            }
        }
    }

    async fn logged_alert_counts(&self) -> AlertCounts {
        match AlertLog::new(self.settings.alert_log_path()).tally().await {
            Ok(counts) => counts,
            Err(e) => {
                error!("failed to read alert log: {e}");
                AlertCounts::default()
            }
        }
    }
}

/// Wait for a task to exit; an overdue task is abandoned.
async fn join_task(
    name: String,
    join: &mut JoinHandle<TaskOutput>,
    timeout: Duration,
) -> Option<TaskOutput> {
    match tokio::time::timeout(timeout, join).await {
        Ok(Ok(output)) => {
            debug!("{name} exited");
            Some(output)
        }
        Ok(Err(e)) => {
            error!("{name} failed: {e}");
            None
        }
        Err(_) => {
            warn!("{}, abandoning it", ShutdownTimeoutError { task: name, timeout });
            None
        }
    }
}
