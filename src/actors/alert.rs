//! AlertActor - Logs and records every alert
//!
//! Single consumer of the alert bus. Each alert is logged at the level of
//! its severity, counted, and appended to the alert log:
//!
//! ```text
//! Severity::Critical → error!
//! Severity::Warning  → warn!
//! Severity::Info     → info!
//! ```
//!
//! Once deactivated the actor keeps handling alerts until the bus closes.
//! A failed append is logged; the alert is still counted.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{AlertRecord, Severity, config::Settings, storage::AlertLog};

use super::{
    active::ActiveFlag,
    messages::{AlertCommand, AlertCounts, TaskOutput},
};

pub struct AlertActor {
    alert_rx: mpsc::Receiver<AlertRecord>,

    command_rx: mpsc::Receiver<AlertCommand>,

    log: AlertLog,

    active: ActiveFlag,

    counts: AlertCounts,

    write_failures: u64,

    poll_interval: Duration,
}

impl AlertActor {
    pub fn new(
        alert_rx: mpsc::Receiver<AlertRecord>,
        command_rx: mpsc::Receiver<AlertCommand>,
        log: AlertLog,
        active: ActiveFlag,
        settings: &Settings,
    ) -> Self {
        Self {
            alert_rx,
            command_rx,
            log,
            active,
            counts: AlertCounts::default(),
            write_failures: 0,
            poll_interval: settings.alert_poll_interval,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) -> TaskOutput {
        debug!("starting alert actor, logging to {}", self.log.path().display());

        loop {
            if !self.active.is_active() {
                break;
            }

            tokio::select! {
                maybe_alert = self.alert_rx.recv() => match maybe_alert {
                    Some(alert) => self.handle_alert(alert).await,
                    None => {
                        warn!("alert bus closed, shutting down");
                        break;
                    }
                },

                Some(cmd) = self.command_rx.recv() => match cmd {
                    AlertCommand::GetCounts { respond_to } => {
                        trace!("received GetCounts command");
                        let _ = respond_to.send(self.counts.clone());
                    }
                },

                _ = tokio::time::sleep(self.poll_interval) => {}

                _ = self.active.deactivated() => break,
            }
        }

        let mut drained = 0;
        while let Some(alert) = self.alert_rx.recv().await {
            self.handle_alert(alert).await;
            drained += 1;
        }
        if drained > 0 {
            debug!("drained {drained} alerts after deactivation");
        }

        debug!(
            "alert actor stopped after {} alerts ({} write failures)",
            self.counts.total, self.write_failures
        );
        TaskOutput::AlertHandler(self.counts)
    }

    async fn handle_alert(&mut self, alert: AlertRecord) {
        match alert.severity {
            Severity::Critical => error!(category = %alert.category, "CRITICAL: {}", alert.message),
            Severity::Warning => warn!(category = %alert.category, "WARNING: {}", alert.message),
            Severity::Info => info!(category = %alert.category, "INFO: {}", alert.message),
        }

        self.counts.record(&alert);

        if let Err(e) = self.log.append(&alert).await {
            self.write_failures += 1;
            error!("failed to append alert to log: {e}");
        }
    }
}

/// Handle for querying the AlertActor
#[derive(Clone)]
pub struct AlertHandle {
    sender: mpsc::Sender<AlertCommand>,
}

impl AlertHandle {
    /// Spawn the actor; its join handle yields the final counts.
    pub fn spawn(
        alert_rx: mpsc::Receiver<AlertRecord>,
        log: AlertLog,
        active: ActiveFlag,
        settings: &Settings,
    ) -> (Self, JoinHandle<TaskOutput>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let actor = AlertActor::new(alert_rx, cmd_rx, log, active, settings);
        let join = tokio::spawn(actor.run());
        (Self { sender: cmd_tx }, join)
    }

    /// Counts so far; `None` once the actor has exited.
    pub async fn counts(&self) -> Option<AlertCounts> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AlertCommand::GetCounts { respond_to: tx })
            .await
            .ok()?;
        rx.await.ok()
    }
}
