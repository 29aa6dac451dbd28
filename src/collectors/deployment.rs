use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use walkdir::WalkDir;

use super::{Collector, payload};
use crate::{Category, Payload, error::CollectionError, util::bytes_to_mb};

const ARCHIVE_SUFFIXES: [&str; 2] = [".tar.gz", ".zip"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildArtifact {
    pub name: String,
    pub size_mb: f64,
    pub modified: DateTime<Utc>,
}

/// Packaged build archives below the builds directory
pub struct DeploymentCollector {
    builds_dir: PathBuf,
    recent_window: Duration,
}

impl DeploymentCollector {
    pub fn new(builds_dir: impl Into<PathBuf>, recent_window: Duration) -> Self {
        Self {
            builds_dir: builds_dir.into(),
            recent_window,
        }
    }

    fn artifacts(&self) -> Vec<(BuildArtifact, SystemTime, u64)> {
        WalkDir::new(&self.builds_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
            })
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                let modified = metadata.modified().ok()?;
                let size = metadata.len();
                Some((
                    BuildArtifact {
                        name: entry.file_name().to_string_lossy().into_owned(),
                        size_mb: bytes_to_mb(size),
                        modified: modified.into(),
                    },
                    modified,
                    size,
                ))
            })
            .collect()
    }
}

impl Collector for DeploymentCollector {
    fn category(&self) -> Category {
        Category::Deployment
    }

    fn collect(&mut self) -> Result<Payload, CollectionError> {
        if !self.builds_dir.is_dir() {
            debug!("builds directory {} not found", self.builds_dir.display());
            return Ok(payload([
                ("builds_directory_exists", json!(false)),
                ("total_builds", json!(0)),
                ("total_size_mb", json!(0.0)),
                ("recent_builds", json!([])),
            ]));
        }

        let artifacts = self.artifacts();
        let total_size: u64 = artifacts.iter().map(|(_, _, size)| size).sum();

        let now = SystemTime::now();
        let mut recent: Vec<BuildArtifact> = artifacts
            .iter()
            .filter(|(_, modified, _)| {
                now.duration_since(*modified)
                    .map(|age| age <= self.recent_window)
                    .unwrap_or(true)
            })
            .map(|(artifact, _, _)| artifact.clone())
            .collect();
        recent.sort_by(|a, b| b.modified.cmp(&a.modified));

        Ok(payload([
            ("builds_directory_exists", json!(true)),
            ("total_builds", json!(artifacts.len())),
            ("total_size_mb", json!(bytes_to_mb(total_size))),
            ("recent_builds", json!(recent)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_builds_dir_is_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector =
            DeploymentCollector::new(dir.path().join("Builds"), Duration::from_secs(3600));

        let payload = collector.collect().unwrap();
        assert_eq!(payload["builds_directory_exists"], json!(false));
        assert_eq!(payload["total_builds"], json!(0));
    }

    #[test]
    fn test_archives_are_found_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("linux/shipping");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("game-1.0.zip"), vec![0u8; 2048]).unwrap();
        std::fs::write(nested.join("game-1.1.tar.gz"), vec![0u8; 1024]).unwrap();
        std::fs::write(nested.join("notes.txt"), "not an archive").unwrap();

        let mut collector = DeploymentCollector::new(dir.path(), Duration::from_secs(3600));
        let payload = collector.collect().unwrap();

        assert_eq!(payload["builds_directory_exists"], json!(true));
        assert_eq!(payload["total_builds"], json!(2));
        assert_eq!(payload["recent_builds"].as_array().unwrap().len(), 2);

        let names: Vec<_> = payload["recent_builds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["name"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"game-1.1.tar.gz".to_string()));
        assert!(!names.contains(&"notes.txt".to_string()));
    }
}
