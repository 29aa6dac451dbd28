//! Helper functions for integration tests

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deploy_monitor::{
    Category, Payload,
    collectors::Collector,
    config::Settings,
    error::{CollectionError, PersistenceError},
    storage::{MemorySnapshotStore, Snapshot, SnapshotStore},
};

/// What a scripted collector does on one call
#[derive(Debug, Clone)]
pub enum Step {
    Emit(serde_json::Value),
    Fail,
    Hang(Duration),
}

/// Collector replaying a fixed script; every call past the end fails.
pub struct ScriptedCollector {
    category: Category,
    script: Vec<Step>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedCollector {
    pub fn new(category: Category, script: Vec<Step>) -> Self {
        Self {
            category,
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter, readable after the collector moved into a sampler.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Collector for ScriptedCollector {
    fn category(&self) -> Category {
        self.category
    }

    fn collect(&mut self) -> Result<Payload, CollectionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(call) {
            Some(Step::Emit(value)) => Ok(value.as_object().cloned().unwrap_or_default()),
            Some(Step::Hang(duration)) => {
                std::thread::sleep(*duration);
                Ok(Payload::new())
            }
            Some(Step::Fail) | None => Err(CollectionError::Unavailable(format!(
                "scripted failure on call {}",
                call + 1
            ))),
        }
    }
}

/// In-memory snapshot store whose writes take `delay`
pub struct SlowStore {
    pub inner: MemorySnapshotStore,
    pub delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemorySnapshotStore::default(),
            delay,
        }
    }
}

#[async_trait]
impl SnapshotStore for SlowStore {
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.persist(snapshot).await
    }

    async fn prune(&self, now: DateTime<Utc>) -> Result<usize, PersistenceError> {
        self.inner.prune(now).await
    }

    async fn load_latest(&self) -> Result<Option<Snapshot>, PersistenceError> {
        self.inner.load_latest().await
    }

    fn location(&self) -> std::path::PathBuf {
        self.inner.location()
    }
}

/// Settings with millisecond timings and every path inside `dir`.
pub fn fast_settings(dir: &Path) -> Settings {
    let mut settings = Settings {
        state_dir: dir.join("state"),
        output_dir: dir.join("reports"),
        builds_dir: dir.join("Builds"),
        logs_dir: dir.join("logs"),
        drain_interval: Duration::from_millis(20),
        alert_poll_interval: Duration::from_millis(10),
        join_timeout: Duration::from_secs(1),
        collect_timeout: Duration::from_millis(200),
        ..Settings::default()
    };
    for category in Category::ALL {
        settings
            .intervals
            .insert(category, Duration::from_millis(20));
    }
    settings
}

/// Wait until `calls` reaches `n`; panics after `timeout`.
pub async fn wait_for_calls(calls: &AtomicUsize, n: usize, timeout: Duration) {
    tokio::time::timeout(timeout, async {
        while calls.load(Ordering::SeqCst) < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("collector was called fewer than {n} times"));
}

/// Files in `dir` whose name starts with `prefix`.
pub fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<std::path::PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return vec![];
    };
    entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect()
}

pub fn cpu(value: f64) -> Step {
    Step::Emit(serde_json::json!({ "cpu_percent": value }))
}
