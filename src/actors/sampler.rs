//! SamplerActor - Periodically measures one category
//!
//! One sampler per category. Each tick collects a payload, publishes it on
//! the metric bus and publishes an alert for every breached threshold.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → Collect (blocking pool, timeout) → MetricRecord → Metric Bus
//!                                                     │
//!                                                     └─ Thresholds → AlertRecord(s) → Alert Bus
//! ```
//!
//! A failed tick is logged and skipped. The collector keeps its state
//! across ticks; a collection that outlives its timeout keeps the collector
//! busy and later ticks fail with [`CollectionError::Busy`] until it returns.

use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    AlertRecord, Category, MetricRecord, Payload,
    collectors::Collector,
    error::{BusError, CollectionError},
    monitors::thresholds::ThresholdTable,
};

use super::{active::ActiveFlag, bus::BusSender, messages::TaskOutput};

/// Consecutive failed ticks after which failures are logged as warnings
pub const DEGRADED_AFTER: u32 = 3;

/// Everything a sampler needs besides its collector
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub interval: Duration,
    pub collect_timeout: Duration,
    pub thresholds: Arc<ThresholdTable>,
}

pub struct SamplerActor {
    category: Category,

    /// Shared with the blocking task running the current collection
    collector: Arc<Mutex<Box<dyn Collector>>>,

    config: SamplerConfig,

    metric_tx: BusSender<MetricRecord>,

    alert_tx: BusSender<AlertRecord>,

    active: ActiveFlag,

    consecutive_failures: u32,

    ticks: u64,
}

impl SamplerActor {
    pub fn new(
        collector: Box<dyn Collector>,
        config: SamplerConfig,
        metric_tx: BusSender<MetricRecord>,
        alert_tx: BusSender<AlertRecord>,
        active: ActiveFlag,
    ) -> Self {
        Self {
            category: collector.category(),
            collector: Arc::new(Mutex::new(collector)),
            config,
            metric_tx,
            alert_tx,
            active,
            consecutive_failures: 0,
            ticks: 0,
        }
    }

    #[instrument(skip(self), fields(category = %self.category))]
    pub async fn run(mut self) -> TaskOutput {
        debug!("starting sampler actor");

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if !self.active.is_active() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.active.deactivated() => break,
            }

            self.ticks += 1;
            match self.tick().await {
                Ok(alerts) => {
                    if self.consecutive_failures > 0 {
                        info!(
                            "collector recovered after {} failed ticks",
                            self.consecutive_failures
                        );
                    }
                    self.consecutive_failures = 0;
                    trace!("tick {} raised {alerts} alerts", self.ticks);
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    if self.consecutive_failures >= DEGRADED_AFTER {
                        warn!(
                            "tick {} skipped ({} in a row): {e}",
                            self.ticks, self.consecutive_failures
                        );
                    } else {
                        error!("tick {} skipped: {e}", self.ticks);
                    }
                }
            }
        }

        debug!("sampler actor stopped after {} ticks", self.ticks);
        TaskOutput::Sampler(self.category)
    }

    /// One sampling step; returns the number of alerts raised.
    async fn tick(&self) -> Result<usize, CollectionError> {
        let record = MetricRecord::new(self.category, self.collect().await?);
        let alerts = self
            .config
            .thresholds
            .evaluate(self.category, &record.payload);

        publish(&self.metric_tx, record);

        let raised = alerts.len();
        for alert in alerts {
            publish(&self.alert_tx, alert);
        }
        Ok(raised)
    }

    async fn collect(&self) -> Result<Payload, CollectionError> {
        let collector = Arc::clone(&self.collector);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = match collector.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return Err(CollectionError::Busy),
            };
            guard.collect()
        });

        match tokio::time::timeout(self.config.collect_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(CollectionError::Panicked(join_error.to_string())),
            Err(_) => Err(CollectionError::Timeout(self.config.collect_timeout)),
        }
    }
}

fn publish<T>(bus: &BusSender<T>, item: T) {
    match bus.try_publish(item) {
        Ok(()) => {}
        Err(e @ BusError::Full(_)) => debug!("{e}"),
        Err(e @ BusError::Closed(_)) => trace!("{e}"),
    }
}

/// Handle for a running SamplerActor
pub struct SamplerHandle {
    pub category: Category,
    join: JoinHandle<TaskOutput>,
}

impl SamplerHandle {
    pub fn spawn(
        collector: Box<dyn Collector>,
        config: SamplerConfig,
        metric_tx: BusSender<MetricRecord>,
        alert_tx: BusSender<AlertRecord>,
        active: ActiveFlag,
    ) -> Self {
        let actor = SamplerActor::new(collector, config, metric_tx, alert_tx, active);
        let category = actor.category;
        let join = tokio::spawn(actor.run());
        Self { category, join }
    }

    pub fn task_name(&self) -> String {
        format!("{}-sampler", self.category)
    }

    pub fn into_join(self) -> JoinHandle<TaskOutput> {
        self.join
    }
}
