//! Threshold evaluation
//!
//! A threshold describes the *healthy* direction of a value: `lte 90` on
//! `cpu_percent` means "CPU usage should stay at or below 90". A breach is
//! raised whenever that comparison does not hold.
//!
//! ```text
//! gte: passes iff actual >= limit
//! lte: passes iff actual <= limit
//! eq:  passes iff |actual - limit| < 0.001
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{AlertRecord, Category, Payload, Severity, error::ConfigError, lookup};

/// Tolerance used by [`Comparison::Eq`].
pub const EQ_TOLERANCE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gte,
    Lte,
    Eq,
}

impl Comparison {
    pub fn passes(&self, actual: f64, limit: f64) -> bool {
        match self {
            Comparison::Gte => actual >= limit,
            Comparison::Lte => actual <= limit,
            Comparison::Eq => (actual - limit).abs() < EQ_TOLERANCE,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Gte => f.write_str(">="),
            Comparison::Lte => f.write_str("<="),
            Comparison::Eq => f.write_str("=="),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdEvaluation {
    Pass,
    Breach,
}

fn default_severity() -> Severity {
    Severity::Warning
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Dotted path into the sampled payload.
    pub name: String,
    pub comparison: Comparison,
    pub limit: f64,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    /// Human readable name used in alert messages.
    #[serde(default)]
    pub label: Option<String>,
}

impl Threshold {
    pub fn new(name: impl Into<String>, comparison: Comparison, limit: f64) -> Self {
        Self {
            name: name.into(),
            comparison,
            limit,
            severity: default_severity(),
            label: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    pub fn evaluate(&self, actual: f64) -> ThresholdEvaluation {
        if self.comparison.passes(actual, self.limit) {
            ThresholdEvaluation::Pass
        } else {
            ThresholdEvaluation::Breach
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidThreshold {
                name: self.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }

        if !self.limit.is_finite() {
            return Err(ConfigError::InvalidThreshold {
                name: self.name.clone(),
                reason: format!("limit {} is not a finite number", self.limit),
            });
        }

        Ok(())
    }

    fn breach_message(&self, key: Option<&str>, actual: f64) -> String {
        match key {
            Some(key) => format!(
                "{} breached for {key}: {actual} (expected {} {})",
                self.label(),
                self.comparison,
                self.limit
            ),
            None => format!(
                "{} breached: {actual} (expected {} {})",
                self.label(),
                self.comparison,
                self.limit
            ),
        }
    }

    /// Compare the payload field this threshold watches.
    ///
    /// A numeric field yields at most one alert. An object field yields one
    /// alert per numeric entry that breaches. A missing field yields none.
    pub fn check(&self, category: Category, payload: &Payload) -> Vec<AlertRecord> {
        let Some(value) = lookup(payload, &self.name) else {
            trace!("{category}: field {} not present, skipping", self.name);
            return vec![];
        };

        let mut alerts = vec![];

        if let Some(actual) = value.as_f64() {
            if self.evaluate(actual) == ThresholdEvaluation::Breach {
                alerts.push(AlertRecord::new(
                    category,
                    self.severity,
                    self.breach_message(None, actual),
                ));
            }
        } else if let Some(entries) = value.as_object() {
            for (key, entry) in entries {
                let Some(actual) = entry.as_f64() else {
                    continue;
                };
                if self.evaluate(actual) == ThresholdEvaluation::Breach {
                    alerts.push(AlertRecord::new(
                        category,
                        self.severity,
                        self.breach_message(Some(key), actual),
                    ));
                }
            }
        }

        alerts
    }
}

/// Read-only threshold configuration shared by all samplers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    by_category: BTreeMap<Category, Vec<Threshold>>,
}

impl ThresholdTable {
    pub fn new(by_category: BTreeMap<Category, Vec<Threshold>>) -> Result<Self, ConfigError> {
        for threshold in by_category.values().flatten() {
            threshold.validate()?;
        }
        Ok(Self { by_category })
    }

    /// An empty table; no sampler will ever alert.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: Category, threshold: Threshold) -> Self {
        self.by_category.entry(category).or_default().push(threshold);
        self
    }

    /// Replace the thresholds of every category present in `overrides`.
    pub fn merge(mut self, overrides: ThresholdTable) -> Result<Self, ConfigError> {
        for (category, thresholds) in overrides.by_category {
            for threshold in &thresholds {
                threshold.validate()?;
            }
            self.by_category.insert(category, thresholds);
        }
        Ok(self)
    }

    pub fn for_category(&self, category: Category) -> &[Threshold] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn evaluate(&self, category: Category, payload: &Payload) -> Vec<AlertRecord> {
        self.for_category(category)
            .iter()
            .flat_map(|threshold| threshold.check(category, payload))
            .collect()
    }
}

/// The alert thresholds the monitor ships with.
pub fn default_thresholds() -> ThresholdTable {
    ThresholdTable::empty()
        .with(
            Category::System,
            Threshold::new("cpu_percent", Comparison::Lte, 90.0).with_label("CPU usage"),
        )
        .with(
            Category::System,
            Threshold::new("memory_percent", Comparison::Lte, 85.0).with_label("memory usage"),
        )
        .with(
            Category::System,
            Threshold::new("disk_percent", Comparison::Lte, 90.0)
                .with_severity(Severity::Critical)
                .with_label("disk usage"),
        )
        .with(
            Category::Build,
            Threshold::new("completed_build_max_minutes", Comparison::Lte, 60.0)
                .with_label("build duration (minutes)"),
        )
        .with(
            Category::Error,
            Threshold::new("error_counts_by_type", Comparison::Lte, 5.0)
                .with_severity(Severity::Critical)
                .with_label("error count"),
        )
}
