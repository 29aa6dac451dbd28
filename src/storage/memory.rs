//! In-memory retention windows
//!
//! One ordered deque of [`MetricRecord`]s per category. Records are kept in
//! non-decreasing timestamp order, so expiring old entries only ever pops
//! from the front of a deque and costs O(expired) rather than a scan of the
//! whole window.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{Category, MetricRecord};

/// Rolling per-category history owned by the aggregator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetentionWindows {
    windows: BTreeMap<Category, VecDeque<MetricRecord>>,
}

impl RetentionWindows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to its category, keeping the window sorted.
    pub fn ingest(&mut self, record: MetricRecord) {
        let window = self.windows.entry(record.category).or_default();

        match window.back() {
            Some(last) if last.timestamp > record.timestamp => {
                let index = window.partition_point(|r| r.timestamp <= record.timestamp);
                window.insert(index, record);
            }
            _ => window.push_back(record),
        }
    }

    /// Drop every record older than `retention` relative to `now`.
    ///
    /// Returns the number of records removed.
    pub fn purge(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let Some(cutoff) = TimeDelta::from_std(retention)
            .ok()
            .and_then(|delta| now.checked_sub_signed(delta))
        else {
            return 0;
        };

        let mut removed = 0;
        for window in self.windows.values_mut() {
            while window.front().is_some_and(|r| r.timestamp < cutoff) {
                window.pop_front();
                removed += 1;
            }
        }
        removed
    }

    pub fn window(&self, category: Category) -> impl Iterator<Item = &MetricRecord> {
        self.windows.get(&category).into_iter().flatten()
    }

    pub fn len(&self, category: Category) -> usize {
        self.windows.get(&category).map_or(0, VecDeque::len)
    }

    pub fn total_len(&self) -> usize {
        self.windows.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    pub fn first(&self, category: Category) -> Option<&MetricRecord> {
        self.windows.get(&category)?.front()
    }

    pub fn latest(&self, category: Category) -> Option<&MetricRecord> {
        self.windows.get(&category)?.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_at(category: Category, timestamp: DateTime<Utc>) -> MetricRecord {
        MetricRecord {
            category,
            timestamp,
            payload: json!({"value": 1}).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_ingest_keeps_time_order() {
        let now = Utc::now();
        let mut windows = RetentionWindows::new();

        windows.ingest(record_at(Category::System, now));
        windows.ingest(record_at(Category::System, now + TimeDelta::seconds(10)));
        // late arrival is slotted into place
        windows.ingest(record_at(Category::System, now + TimeDelta::seconds(5)));

        let stamps: Vec<_> = windows.window(Category::System).map(|r| r.timestamp).collect();
        assert_eq!(
            stamps,
            vec![
                now,
                now + TimeDelta::seconds(5),
                now + TimeDelta::seconds(10)
            ]
        );
    }

    #[test]
    fn test_purge_removes_only_expired() {
        let now = Utc::now();
        let mut windows = RetentionWindows::new();

        windows.ingest(record_at(Category::Build, now - TimeDelta::hours(30)));
        windows.ingest(record_at(Category::Build, now - TimeDelta::hours(25)));
        windows.ingest(record_at(Category::Build, now - TimeDelta::hours(2)));
        windows.ingest(record_at(Category::Error, now - TimeDelta::hours(48)));
        windows.ingest(record_at(Category::Error, now));

        let removed = windows.purge(now, Duration::from_secs(24 * 3600));

        assert_eq!(removed, 3);
        assert_eq!(windows.len(Category::Build), 1);
        assert_eq!(windows.len(Category::Error), 1);
        assert_eq!(windows.latest(Category::Error).unwrap().timestamp, now);
    }

    #[test]
    fn test_record_exactly_at_cutoff_is_kept() {
        let now = Utc::now();
        let mut windows = RetentionWindows::new();
        windows.ingest(record_at(Category::System, now - TimeDelta::hours(24)));

        assert_eq!(windows.purge(now, Duration::from_secs(24 * 3600)), 0);
        assert_eq!(windows.len(Category::System), 1);
    }

    #[test]
    fn test_huge_retention_purges_nothing() {
        let now = Utc::now();
        let mut windows = RetentionWindows::new();
        windows.ingest(record_at(Category::System, now - TimeDelta::days(365)));

        assert_eq!(windows.purge(now, Duration::MAX), 0);
        assert_eq!(windows.total_len(), 1);
    }

    #[test]
    fn test_serializes_as_category_map() {
        let now = Utc::now();
        let mut windows = RetentionWindows::new();
        windows.ingest(record_at(Category::Deployment, now));

        let value = serde_json::to_value(&windows).unwrap();
        assert!(value["deployment"].is_array());
        assert_eq!(value["deployment"].as_array().unwrap().len(), 1);
    }
}
