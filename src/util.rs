use std::path::PathBuf;

const MONITOR_CONFIG: &str = "DEPLOY_MONITOR_CONFIG";

pub fn get_config_path() -> Option<PathBuf> {
    std::env::var(MONITOR_CONFIG).ok().map(PathBuf::from)
}

const MONITOR_STATE_DIR: &str = "DEPLOY_MONITOR_STATE_DIR";

pub fn get_state_dir() -> Option<PathBuf> {
    std::env::var(MONITOR_STATE_DIR)
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
}

/// Timestamp fragment used in report file names.
pub fn file_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Convert a byte count to gigabytes rounded to two decimals.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

/// Convert a byte count to megabytes rounded to two decimals.
pub fn bytes_to_mb(bytes: u64) -> f64 {
    round2(bytes as f64 / (1024.0 * 1024.0))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
