//! Monitoring reports
//!
//! A [`MonitoringReport`] is built on demand from the retention windows and
//! the cumulative alert counts: live from the running actors, at shutdown
//! from their final state, or offline from the newest snapshot plus the
//! alert log (report-only mode).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{
    Category, Payload,
    actors::messages::AlertCounts,
    config::Settings,
    error::PersistenceError,
    storage::{AlertLog, JsonSnapshotStore, RetentionWindows, SnapshotStore},
    util::file_timestamp,
};

pub const REPORT_VERSION: &str = "1.0.0";

pub const FINAL_REPORT_PREFIX: &str = "deployment-monitoring-final";
pub const SNAPSHOT_REPORT_PREFIX: &str = "deployment-monitoring-report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    /// Built from the state of a running (or just stopped) pipeline
    Live,
    /// Built from persisted snapshots without starting the pipeline
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportInfo {
    pub generated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub monitoring_duration_secs: Option<i64>,
    pub report_version: String,
    pub source: ReportSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub sample_count: usize,
    pub first_sample_at: Option<DateTime<Utc>>,
    pub latest_sample_at: Option<DateTime<Utc>>,
    pub latest: Option<Payload>,
    pub summary: Payload,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropSummary {
    pub metrics: u64,
    pub alerts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub report_info: ReportInfo,
    pub categories: BTreeMap<Category, CategorySummary>,
    pub alerts: AlertCounts,
    pub drops: DropSummary,
    pub recommendations: Vec<String>,
}

impl MonitoringReport {
    pub fn build(
        windows: &RetentionWindows,
        alerts: AlertCounts,
        drops: DropSummary,
        started_at: Option<DateTime<Utc>>,
        source: ReportSource,
    ) -> Self {
        let generated_at = Utc::now();
        let categories: BTreeMap<_, _> = Category::ALL
            .iter()
            .map(|&category| (category, summarize(category, windows)))
            .collect();
        let recommendations = recommendations(&categories);

        Self {
            report_info: ReportInfo {
                generated_at,
                started_at,
                monitoring_duration_secs: started_at
                    .map(|started| (generated_at - started).num_seconds()),
                report_version: REPORT_VERSION.to_string(),
                source,
            },
            categories,
            alerts,
            drops,
            recommendations,
        }
    }

    pub fn category(&self, category: Category) -> Option<&CategorySummary> {
        self.categories.get(&category)
    }

    /// Critical plus warning alerts raised for `category`.
    pub fn actionable_alerts(&self, category: Category) -> u64 {
        self.alerts.category(category).actionable()
    }
}

fn summarize(category: Category, windows: &RetentionWindows) -> CategorySummary {
    let latest = windows.latest(category);
    let summary = match latest {
        Some(record) => highlights(category, &record.payload, windows),
        None => Payload::new(),
    };

    CategorySummary {
        sample_count: windows.len(category),
        first_sample_at: windows.first(category).map(|r| r.timestamp),
        latest_sample_at: latest.map(|r| r.timestamp),
        latest: latest.map(|r| r.payload.clone()),
        summary,
    }
}

/// The headline numbers of a category, taken from its latest payload.
fn highlights(category: Category, latest: &Payload, windows: &RetentionWindows) -> Payload {
    let copy = |pairs: &[(&str, &str)]| -> Payload {
        pairs
            .iter()
            .filter_map(|(to, from)| {
                let value = latest.get(*from).filter(|v| !v.is_null())?;
                Some((to.to_string(), value.clone()))
            })
            .collect()
    };
    let array_len = |field: &str| latest.get(field).and_then(Value::as_array).map(Vec::len);

    match category {
        Category::System => copy(&[
            ("cpu_usage_current", "cpu_percent"),
            ("memory_usage_current", "memory_percent"),
            ("disk_usage_current", "disk_percent"),
            ("load_average", "load_avg_1m"),
            ("memory_available_gb", "memory_available_gb"),
            ("disk_free_gb", "disk_free_gb"),
        ]),
        Category::Build => {
            let total_monitored: u64 = windows
                .window(Category::Build)
                .filter_map(|r| r.payload.get("active_build_count").and_then(Value::as_u64))
                .sum();
            let mut summary = copy(&[("current_active_builds", "active_build_count")]);
            summary.insert("total_monitored_builds".to_string(), json!(total_monitored));
            summary
        }
        Category::Deployment => {
            let mut summary = copy(&[
                ("total_builds", "total_builds"),
                ("total_size_mb", "total_size_mb"),
            ]);
            if let Some(recent) = array_len("recent_builds") {
                summary.insert("recent_builds_count".to_string(), json!(recent));
            }
            summary
        }
        Category::Performance => {
            let gpu = latest.get("gpu_info").filter(|v| !v.is_null());
            let mut summary = Payload::new();
            if let Some(editors) = array_len("process_list") {
                summary.insert("editor_processes_running".to_string(), json!(editors));
            }
            summary.insert("gpu_available".to_string(), json!(gpu.is_some()));
            if let Some(utilization) = gpu.and_then(|g| g.get("utilization_percent")) {
                summary.insert("gpu_utilization".to_string(), utilization.clone());
            }
            summary
        }
        Category::Error => copy(&[("total_errors", "total_errors")]),
    }
}

fn recommendations(categories: &BTreeMap<Category, CategorySummary>) -> Vec<String> {
    let number = |category: Category, field: &str| {
        categories
            .get(&category)
            .and_then(|c| c.summary.get(field))
            .and_then(Value::as_f64)
    };

    let mut recommendations = vec![];

    if number(Category::System, "cpu_usage_current").is_some_and(|cpu| cpu > 80.0) {
        recommendations.push("Consider upgrading CPU or reducing concurrent builds".to_string());
    }
    if number(Category::System, "memory_usage_current").is_some_and(|mem| mem > 80.0) {
        recommendations.push("Monitor memory usage during builds - may need more RAM".to_string());
    }
    if number(Category::System, "disk_free_gb").is_some_and(|free| free < 10.0) {
        recommendations
            .push("Low disk space - clean up build artifacts or add storage".to_string());
    }
    if number(Category::Build, "current_active_builds").is_some_and(|builds| builds > 3.0) {
        recommendations
            .push("Multiple concurrent builds detected - may impact performance".to_string());
    }
    let gpu_missing = categories
        .get(&Category::Performance)
        .and_then(|c| c.summary.get("gpu_available"))
        .and_then(Value::as_bool)
        == Some(false);
    if gpu_missing {
        recommendations.push("No GPU detected - rendering may be slower".to_string());
    }

    if recommendations.is_empty() {
        recommendations.push("System appears to be running optimally".to_string());
    }
    recommendations
}

/// Write `report` as `<dir>/<prefix>-<YYYYMMDD_HHMMSS>.json`.
pub async fn write_report(
    report: &MonitoringReport,
    dir: &Path,
    prefix: &str,
) -> Result<PathBuf, PersistenceError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PersistenceError::io(dir, e))?;

    let path = dir.join(format!("{prefix}-{}.json", file_timestamp()));
    let bytes = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| PersistenceError::io(&path, e))?;

    info!("report written to {}", path.display());
    Ok(path)
}

/// Report from the newest snapshot and the alert log, without running the
/// pipeline.
pub async fn report_from_state_dir(
    settings: &Settings,
) -> Result<MonitoringReport, PersistenceError> {
    let store = JsonSnapshotStore::new(settings.snapshot_dir(), settings.snapshot_retention);
    let windows = match store.load_latest().await? {
        Some(snapshot) => {
            debug!("building report from snapshot taken at {}", snapshot.taken_at);
            snapshot.windows
        }
        None => {
            info!("no snapshots found in {}", store.location().display());
            RetentionWindows::new()
        }
    };
    let alerts = AlertLog::new(settings.alert_log_path()).tally().await?;

    Ok(MonitoringReport::build(
        &windows,
        alerts,
        DropSummary::default(),
        None,
        ReportSource::Snapshot,
    ))
}
