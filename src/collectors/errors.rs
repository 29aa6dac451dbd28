use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use regex::{Regex, RegexBuilder};
use serde_json::json;
use tracing::{trace, warn};
use walkdir::WalkDir;

use super::{Collector, payload};
use crate::{Category, Payload, error::CollectionError};

/// Error pattern counts in log files written within the recent window
pub struct ErrorLogCollector {
    logs_dir: PathBuf,
    recent_window: Duration,
    patterns: Vec<(String, Regex)>,
}

impl ErrorLogCollector {
    pub fn new(
        logs_dir: impl Into<PathBuf>,
        recent_window: Duration,
        patterns: &BTreeMap<String, Vec<String>>,
    ) -> Self {
        let patterns = patterns
            .iter()
            .filter(|(_, needles)| !needles.is_empty())
            .filter_map(|(error_type, needles)| {
                let alternation = needles
                    .iter()
                    .map(|n| regex::escape(n))
                    .collect::<Vec<_>>()
                    .join("|");
                match RegexBuilder::new(&alternation).case_insensitive(true).build() {
                    Ok(regex) => Some((error_type.clone(), regex)),
                    Err(e) => {
                        warn!("ignoring error patterns for {error_type}: {e}");
                        None
                    }
                }
            })
            .collect();

        Self {
            logs_dir: logs_dir.into(),
            recent_window,
            patterns,
        }
    }

    fn recent_logs(&self) -> Vec<PathBuf> {
        let now = SystemTime::now();
        WalkDir::new(&self.logs_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "log"))
            .filter(|entry| {
                entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|modified| now.duration_since(modified).ok())
                    .is_some_and(|age| age <= self.recent_window)
            })
            .map(|entry| entry.into_path())
            .collect()
    }
}

impl Collector for ErrorLogCollector {
    fn category(&self) -> Category {
        Category::Error
    }

    fn collect(&mut self) -> Result<Payload, CollectionError> {
        let mut counts: BTreeMap<String, u64> = self
            .patterns
            .iter()
            .map(|(error_type, _)| (error_type.clone(), 0))
            .collect();

        for path in self.recent_logs() {
            let content = match std::fs::read(&path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    trace!("skipping {}: {e}", path.display());
                    continue;
                }
            };

            for (error_type, regex) in &self.patterns {
                let found = regex.find_iter(&content).count() as u64;
                if let Some(count) = counts.get_mut(error_type) {
                    *count += found;
                }
            }
        }

        let total: u64 = counts.values().sum();
        Ok(payload([
            ("error_counts_by_type", json!(counts)),
            ("total_errors", json!(total)),
        ]))
    }
}
