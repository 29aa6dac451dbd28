pub mod actors;
pub mod collectors;
pub mod config;
pub mod error;
pub mod monitors;
pub mod report;
pub mod storage;
pub mod util;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Measured values of a single tick, keyed by field name.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// The signal domain a sampler measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    System,
    Build,
    Deployment,
    Performance,
    Error,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::System,
        Category::Build,
        Category::Deployment,
        Category::Performance,
        Category::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::System => "system",
            Category::Build => "build",
            Category::Deployment => "deployment",
            Category::Performance => "performance",
            Category::Error => "error",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Critical => f.write_str("critical"),
        }
    }
}

/// One sample produced by a sampler tick.
///
/// Records are immutable once built; the aggregator owns them after they
/// have crossed the metric bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub category: Category,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
}

impl MetricRecord {
    pub fn new(category: Category, payload: Payload) -> Self {
        Self {
            category,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Look up a numeric field by dotted path (`"cpu.usage_percent"`).
    pub fn number(&self, path: &str) -> Option<f64> {
        lookup(&self.payload, path)?.as_f64()
    }
}

/// A threshold breach raised by a sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub category: Category,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertRecord {
    pub fn new(category: Category, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Resolve a dotted path inside a payload.
pub fn lookup<'a>(payload: &'a Payload, path: &str) -> Option<&'a serde_json::Value> {
    let mut parts = path.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
