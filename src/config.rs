use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::trace;

use crate::{
    Category,
    error::ConfigError,
    monitors::thresholds::{ThresholdTable, default_thresholds},
};

/// Sampling intervals in seconds, one per category.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct IntervalConfig {
    #[serde(default = "default_system_interval")]
    pub system: u64,
    #[serde(default = "default_build_interval")]
    pub build: u64,
    #[serde(default = "default_deployment_interval")]
    pub deployment: u64,
    #[serde(default = "default_performance_interval")]
    pub performance: u64,
    #[serde(default = "default_error_interval")]
    pub error: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            system: default_system_interval(),
            build: default_build_interval(),
            deployment: default_deployment_interval(),
            performance: default_performance_interval(),
            error: default_error_interval(),
        }
    }
}

impl IntervalConfig {
    fn get(&self, category: Category) -> u64 {
        match category {
            Category::System => self.system,
            Category::Build => self.build,
            Category::Deployment => self.deployment,
            Category::Performance => self.performance,
            Category::Error => self.error,
        }
    }
}

/// Configuration file contents
///
/// Every field is optional; an empty JSON object yields the defaults the
/// monitor ships with.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Directory holding snapshots, the alert log and the log files
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Directory reports are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_builds_dir")]
    pub builds_dir: PathBuf,

    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// How long metric records stay in the in-memory history
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Snapshot files older than this are deleted
    #[serde(default = "default_snapshot_retention_days")]
    pub snapshot_retention_days: u64,

    #[serde(default = "default_metric_bus_capacity")]
    pub metric_bus_capacity: usize,

    #[serde(default = "default_alert_bus_capacity")]
    pub alert_bus_capacity: usize,

    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,

    /// Maximum records pulled off the metric bus per drain cycle
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    #[serde(default = "default_alert_poll_millis")]
    pub alert_poll_millis: u64,

    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,

    #[serde(default = "default_collect_timeout_secs")]
    pub collect_timeout_secs: u64,

    #[serde(default = "default_subprocess_timeout_secs")]
    pub subprocess_timeout_secs: u64,

    #[serde(default = "default_recent_build_window_hours")]
    pub recent_build_window_hours: u64,

    #[serde(default = "default_recent_log_window_minutes")]
    pub recent_log_window_minutes: u64,

    #[serde(default)]
    pub intervals: IntervalConfig,

    /// Per-category overrides; categories not listed keep the defaults
    #[serde(default)]
    pub thresholds: Option<ThresholdTable>,

    #[serde(default = "default_build_keywords")]
    pub build_keywords: Vec<String>,

    #[serde(default = "default_editor_keywords")]
    pub editor_keywords: Vec<String>,

    #[serde(default = "default_error_patterns")]
    pub error_patterns: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            output_dir: default_output_dir(),
            builds_dir: default_builds_dir(),
            logs_dir: default_logs_dir(),
            retention_hours: default_retention_hours(),
            snapshot_retention_days: default_snapshot_retention_days(),
            metric_bus_capacity: default_metric_bus_capacity(),
            alert_bus_capacity: default_alert_bus_capacity(),
            drain_interval_secs: default_drain_interval_secs(),
            max_batch: default_max_batch(),
            alert_poll_millis: default_alert_poll_millis(),
            join_timeout_secs: default_join_timeout_secs(),
            collect_timeout_secs: default_collect_timeout_secs(),
            subprocess_timeout_secs: default_subprocess_timeout_secs(),
            recent_build_window_hours: default_recent_build_window_hours(),
            recent_log_window_minutes: default_recent_log_window_minutes(),
            intervals: IntervalConfig::default(),
            thresholds: None,
            build_keywords: default_build_keywords(),
            editor_keywords: default_editor_keywords(),
            error_patterns: default_error_patterns(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("logs/deployment-monitoring")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_builds_dir() -> PathBuf {
    PathBuf::from("Builds")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_retention_hours() -> u64 {
    24
}

fn default_snapshot_retention_days() -> u64 {
    7
}

fn default_metric_bus_capacity() -> usize {
    1024
}

fn default_alert_bus_capacity() -> usize {
    256
}

fn default_drain_interval_secs() -> u64 {
    5
}

fn default_max_batch() -> usize {
    512
}

fn default_alert_poll_millis() -> u64 {
    1000
}

fn default_join_timeout_secs() -> u64 {
    5
}

fn default_collect_timeout_secs() -> u64 {
    10
}

fn default_subprocess_timeout_secs() -> u64 {
    10
}

fn default_recent_build_window_hours() -> u64 {
    24
}

fn default_recent_log_window_minutes() -> u64 {
    60
}

fn default_system_interval() -> u64 {
    10
}

fn default_build_interval() -> u64 {
    15
}

fn default_deployment_interval() -> u64 {
    30
}

fn default_performance_interval() -> u64 {
    20
}

fn default_error_interval() -> u64 {
    60
}

fn default_build_keywords() -> Vec<String> {
    [
        "unrealbuildtool",
        "unrealheadertool",
        "unrealcooker",
        "msbuild",
        "clang",
        "gcc",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_editor_keywords() -> Vec<String> {
    vec!["unrealeditor".to_string()]
}

fn default_error_patterns() -> BTreeMap<String, Vec<String>> {
    let patterns: [(&str, &[&str]); 3] = [
        ("build_errors", &["error:", "failed:", "exception:"]),
        ("system_errors", &["segfault", "kernel panic", "out of memory"]),
        (
            "deployment_errors",
            &["deploy failed", "artifact missing", "validation failed"],
        ),
    ];

    patterns
        .into_iter()
        .map(|(kind, list)| {
            (
                kind.to_string(),
                list.iter().map(|p| p.to_string()).collect(),
            )
        })
        .collect()
}

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 3600;
const SECS_PER_DAY: u64 = 86_400;

fn scaled(value: u64, unit_secs: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(unit_secs))
}

/// Runtime settings with every duration resolved
///
/// Built from a [`Config`] via [`Config::resolve`]. Tests construct it
/// directly to run the pipeline at millisecond cadence.
#[derive(Debug, Clone)]
pub struct Settings {
    pub state_dir: PathBuf,
    pub output_dir: PathBuf,
    pub builds_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub retention: Duration,
    pub snapshot_retention: Duration,
    pub metric_bus_capacity: usize,
    pub alert_bus_capacity: usize,
    pub drain_interval: Duration,
    pub max_batch: usize,
    pub alert_poll_interval: Duration,
    pub join_timeout: Duration,
    pub collect_timeout: Duration,
    pub subprocess_timeout: Duration,
    pub recent_build_window: Duration,
    pub recent_log_window: Duration,
    pub intervals: BTreeMap<Category, Duration>,
    pub thresholds: ThresholdTable,
    pub build_keywords: Vec<String>,
    pub editor_keywords: Vec<String>,
    pub error_patterns: BTreeMap<String, Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from_parts(Config::default(), default_thresholds())
    }
}

impl Settings {
    fn from_parts(config: Config, thresholds: ThresholdTable) -> Self {
        let intervals = Category::ALL
            .iter()
            .map(|c| (*c, Duration::from_secs(config.intervals.get(*c))))
            .collect();

        Self {
            state_dir: config.state_dir,
            output_dir: config.output_dir,
            builds_dir: config.builds_dir,
            logs_dir: config.logs_dir,
            retention: scaled(config.retention_hours, SECS_PER_HOUR),
            snapshot_retention: scaled(config.snapshot_retention_days, SECS_PER_DAY),
            metric_bus_capacity: config.metric_bus_capacity,
            alert_bus_capacity: config.alert_bus_capacity,
            drain_interval: Duration::from_secs(config.drain_interval_secs),
            max_batch: config.max_batch,
            alert_poll_interval: Duration::from_millis(config.alert_poll_millis),
            join_timeout: Duration::from_secs(config.join_timeout_secs),
            collect_timeout: Duration::from_secs(config.collect_timeout_secs),
            subprocess_timeout: Duration::from_secs(config.subprocess_timeout_secs),
            recent_build_window: scaled(config.recent_build_window_hours, SECS_PER_HOUR),
            recent_log_window: scaled(config.recent_log_window_minutes, SECS_PER_MINUTE),
            intervals,
            thresholds,
            build_keywords: config.build_keywords,
            editor_keywords: config.editor_keywords,
            error_patterns: config.error_patterns,
        }
    }

    /// Sampling interval of a category (falls back to ten seconds).
    pub fn interval(&self, category: Category) -> Duration {
        self.intervals
            .get(&category)
            .copied()
            .unwrap_or(Duration::from_secs(default_system_interval()))
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.state_dir.join("metrics")
    }

    pub fn alert_log_path(&self) -> PathBuf {
        self.state_dir.join("alerts.jsonl")
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metric_bus_capacity == 0 || self.alert_bus_capacity == 0 {
            return Err(ConfigError::Invalid(
                "bus capacities must be greater than zero".to_string(),
            ));
        }

        if self.max_batch == 0 {
            return Err(ConfigError::Invalid(
                "max_batch must be greater than zero".to_string(),
            ));
        }

        let zero_durations = [
            ("drain_interval", self.drain_interval),
            ("alert_poll_interval", self.alert_poll_interval),
            ("join_timeout", self.join_timeout),
            ("collect_timeout", self.collect_timeout),
        ];
        if let Some((name, _)) = zero_durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid(format!(
                "{name} must be greater than zero"
            )));
        }

        if let Some((category, _)) = self.intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid(format!(
                "sampling interval for {category} must be greater than zero"
            )));
        }

        Ok(())
    }
}

impl Config {
    /// Turn the file representation into validated runtime settings.
    pub fn resolve(mut self) -> Result<Settings, ConfigError> {
        self.check_ranges()?;
        let thresholds = match self.thresholds.take() {
            Some(overrides) => default_thresholds().merge(overrides)?,
            None => default_thresholds(),
        };

        let settings = Settings::from_parts(self, thresholds);
        settings.validate()?;
        Ok(settings)
    }

    /// Values that are converted to seconds must not overflow.
    fn check_ranges(&self) -> Result<(), ConfigError> {
        let scaled_fields = [
            ("retention_hours", self.retention_hours, SECS_PER_HOUR),
            (
                "snapshot_retention_days",
                self.snapshot_retention_days,
                SECS_PER_DAY,
            ),
            (
                "recent_build_window_hours",
                self.recent_build_window_hours,
                SECS_PER_HOUR,
            ),
            (
                "recent_log_window_minutes",
                self.recent_log_window_minutes,
                SECS_PER_MINUTE,
            ),
        ];

        for (name, value, unit_secs) in scaled_fields {
            if value.checked_mul(unit_secs).is_none() {
                return Err(ConfigError::Invalid(format!("{name} = {value} is out of range")));
            }
        }
        Ok(())
    }
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = serde_json::from_str(&file_content)?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
