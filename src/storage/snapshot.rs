//! JSON snapshot files
//!
//! One file per persist cycle, named `metrics-YYYYMMDD-HHMMSS-mmm.json`
//! after the snapshot's UTC timestamp. Files are written under a temporary
//! name and renamed into place, so readers never see a partial document.
//! A temporary file is removed when its write fails; any left over from a
//! crash is removed by the next prune.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use tokio::fs;
use tracing::{debug, trace, warn};

use super::backend::{Snapshot, SnapshotStore};
use crate::error::PersistenceError;

const PREFIX: &str = "metrics-";
const SUFFIX: &str = ".json";
const TMP_SUFFIX: &str = ".json.tmp";
const NAME_FORMAT: &str = "%Y%m%d-%H%M%S-%3f";

/// Snapshot store backed by a directory of JSON files
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    dir: PathBuf,
    retention: Duration,
}

impl JsonSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            dir: dir.into(),
            retention,
        }
    }

    pub fn file_name(taken_at: DateTime<Utc>) -> String {
        format!("{PREFIX}{}{SUFFIX}", taken_at.format(NAME_FORMAT))
    }

    /// Timestamp encoded in a snapshot file name.
    pub fn parse_file_name(name: &str) -> Option<DateTime<Utc>> {
        let stamp = name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
        NaiveDateTime::parse_from_str(stamp, NAME_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Snapshot files in the directory with their encoded timestamps,
    /// newest first.
    async fn list(&self) -> Result<Vec<(DateTime<Utc>, PathBuf)>, PersistenceError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(PersistenceError::io(&self.dir, e)),
        };

        let mut files = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistenceError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(taken_at) = name.to_str().and_then(Self::parse_file_name) else {
                continue;
            };
            files.push((taken_at, entry.path()));
        }

        files.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(files)
    }

    /// Temporary files of writes that never completed.
    async fn leftover_tmp_files(&self) -> Result<Vec<PathBuf>, PersistenceError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(PersistenceError::io(&self.dir, e)),
        };

        let mut files = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistenceError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            if name
                .to_str()
                .is_some_and(|n| n.starts_with(PREFIX) && n.ends_with(TMP_SUFFIX))
            {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    async fn discard(tmp_path: &Path) {
        match fs::remove_file(tmp_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {e}", tmp_path.display()),
        }
    }

    async fn read(path: &Path) -> Result<Snapshot, PersistenceError> {
        let content = fs::read(path)
            .await
            .map_err(|e| PersistenceError::io(path, e))?;
        Ok(serde_json::from_slice(&content)?)
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PersistenceError::io(&self.dir, e))?;

        let path = self.dir.join(Self::file_name(snapshot.taken_at));
        let tmp_path = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(snapshot)?;

        if let Err(e) = fs::write(&tmp_path, &body).await {
            Self::discard(&tmp_path).await;
            return Err(PersistenceError::io(&tmp_path, e));
        }
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            Self::discard(&tmp_path).await;
            return Err(PersistenceError::io(&path, e));
        }

        trace!("wrote snapshot {} ({} bytes)", path.display(), body.len());
        Ok(())
    }

    async fn prune(&self, now: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let Some(cutoff) = TimeDelta::from_std(self.retention)
            .ok()
            .and_then(|delta| now.checked_sub_signed(delta))
        else {
            return Ok(0);
        };

        let mut deleted = 0;
        for (taken_at, path) in self.list().await? {
            if taken_at >= cutoff {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!("failed to delete old snapshot {}: {e}", path.display()),
            }
        }

        if deleted > 0 {
            debug!("pruned {deleted} snapshots older than {cutoff}");
        }

        // the aggregator is the only writer and never prunes mid-write
        for tmp_path in self.leftover_tmp_files().await? {
            debug!("removing leftover {}", tmp_path.display());
            Self::discard(&tmp_path).await;
        }
        Ok(deleted)
    }

    async fn load_latest(&self) -> Result<Option<Snapshot>, PersistenceError> {
        for (_, path) in self.list().await? {
            match Self::read(&path).await {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(e) => warn!("skipping unreadable snapshot {}: {e}", path.display()),
            }
        }
        Ok(None)
    }

    fn location(&self) -> PathBuf {
        self.dir.clone()
    }
}
