//! Append-only alert log (JSON Lines)
//!
//! One [`AlertRecord`] per line. The alert handler is the only writer and
//! never rewrites or compacts the file.

use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::trace;

use crate::{AlertRecord, actors::messages::AlertCounts, error::PersistenceError};

#[derive(Debug, Clone)]
pub struct AlertLog {
    path: PathBuf,
}

impl AlertLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one alert as a single line.
    pub async fn append(&self, alert: &AlertRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistenceError::io(parent, e))?;
        }

        let mut line = serde_json::to_vec(alert)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PersistenceError::io(&self.path, e))?;

        file.write_all(&line)
            .await
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| PersistenceError::io(&self.path, e))?;

        trace!("appended alert to {}", self.path.display());
        Ok(())
    }

    /// Every parseable alert in the log, in file order.
    pub async fn read_all(&self) -> Result<Vec<AlertRecord>, PersistenceError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(PersistenceError::io(&self.path, e)),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Alert counts reconstructed from the log; malformed lines are skipped.
    pub async fn tally(&self) -> Result<AlertCounts, PersistenceError> {
        let mut counts = AlertCounts::default();
        for alert in self.read_all().await? {
            counts.record(&alert);
        }
        Ok(counts)
    }
}
