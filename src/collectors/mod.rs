//! Host collectors consumed by the samplers
//!
//! A collector is a plain synchronous measurement of one category. The
//! sampler owning it runs every call on the blocking pool under a timeout,
//! so a collector is free to walk directories or shell out to a tool.
//!
//! - **system**: CPU, load, memory, disk and network totals
//! - **build**: build tool processes tracked across ticks
//! - **deployment**: packaged build artifacts on disk
//! - **performance**: editor processes, GPU and temperature sensors
//! - **errors**: error pattern counts in recently written log files

pub mod build;
pub mod deployment;
pub mod errors;
pub mod performance;
pub mod system;

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::trace;

use crate::{Category, Payload, config::Settings, error::CollectionError};

pub use build::BuildCollector;
pub use deployment::DeploymentCollector;
pub use errors::ErrorLogCollector;
pub use performance::PerformanceCollector;
pub use system::SystemCollector;

/// One synchronous measurement source
pub trait Collector: Send {
    /// The category every payload of this collector belongs to.
    fn category(&self) -> Category;

    /// Take one measurement.
    fn collect(&mut self) -> Result<Payload, CollectionError>;
}

/// The collectors a controller starts one sampler each for
#[derive(Default)]
pub struct CollectorSet {
    collectors: Vec<Box<dyn Collector>>,
}

impl CollectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All five host collectors configured from `settings`.
    pub fn host(settings: &Settings) -> Self {
        Self::new()
            .with(SystemCollector::new())
            .with(BuildCollector::new(settings.build_keywords.clone()))
            .with(DeploymentCollector::new(
                settings.builds_dir.clone(),
                settings.recent_build_window,
            ))
            .with(PerformanceCollector::new(
                settings.editor_keywords.clone(),
                settings.subprocess_timeout,
            ))
            .with(ErrorLogCollector::new(
                settings.logs_dir.clone(),
                settings.recent_log_window,
                &settings.error_patterns,
            ))
    }

    pub fn with(mut self, collector: impl Collector + 'static) -> Self {
        self.push(Box::new(collector));
        self
    }

    pub fn push(&mut self, collector: Box<dyn Collector>) {
        self.collectors.push(collector);
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.collectors.iter().map(|c| c.category()).collect()
    }

    pub fn into_inner(self) -> Vec<Box<dyn Collector>> {
        self.collectors
    }
}

/// Run an external tool and capture its stdout.
///
/// Returns `Ok(None)` when the tool is not installed or exits unsuccessfully.
/// A tool still running after `timeout` is killed and reported as
/// [`CollectionError::Timeout`].
pub fn run_tool(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<Option<String>, CollectionError> {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            trace!("{program} not installed");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CollectionError::Timeout(timeout));
        }
        std::thread::sleep(Duration::from_millis(20));
    };

    if !status.success() {
        trace!("{program} exited with {status}");
        return Ok(None);
    }

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout.read_to_string(&mut output)?;
    }
    Ok(Some(output))
}

/// Build a payload from `(key, value)` pairs.
pub(crate) fn payload<I, K>(entries: I) -> Payload
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
