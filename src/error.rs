//! Error taxonomy for the monitoring pipeline
//!
//! Only [`ConfigError`] and [`ControllerError`] ever escape to the caller.
//! Everything else is raised inside an actor loop, logged there, and the
//! loop moves on to its next cycle.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A collector call failed; the sampler skips the tick.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("collector unavailable: {0}")]
    Unavailable(String),

    #[error("collector did not respond within {0:?}")]
    Timeout(Duration),

    #[error("previous collection is still running")]
    Busy,

    #[error("collector task failed: {0}")]
    Panicked(String),

    #[error("I/O error during collection: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-blocking publish on a bus did not go through.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// The bus is saturated; the record has been dropped and counted.
    #[error("{0} bus is full, record dropped")]
    Full(&'static str),

    /// The consumer is gone (shutdown in progress).
    #[error("{0} bus is closed")]
    Closed(&'static str),
}

/// A snapshot, alert-log, or report write failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A task did not observe the stop flag within its join window.
#[derive(Debug, Error)]
#[error("task {task} did not exit within {timeout:?}")]
pub struct ShutdownTimeoutError {
    pub task: String,
    pub timeout: Duration,
}

/// Startup-time configuration problem; always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file provided: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid threshold {name}: {reason}")]
    InvalidThreshold { name: String, reason: String },

    #[error("invalid setting {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("monitor has already been started")]
    AlreadyStarted,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to prepare state directory: {0}")]
    Startup(#[from] PersistenceError),
}
