//! Persistence tests: snapshots, the alert log, and report-only mode

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use deploy_monitor::{
    Category, MetricRecord, Payload,
    actors::Controller,
    collectors::CollectorSet,
    report::{ReportSource, report_from_state_dir},
    storage::{AlertLog, JsonSnapshotStore, RetentionWindows, Snapshot, SnapshotStore},
};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::helpers::*;

fn record(category: Category, seconds_ago: i64, value: i64) -> MetricRecord {
    let payload: Payload = json!({ "value": value }).as_object().cloned().unwrap();
    MetricRecord {
        category,
        timestamp: Utc::now() - TimeDelta::seconds(seconds_ago),
        payload,
    }
}

#[tokio::test]
async fn test_snapshot_round_trip_preserves_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonSnapshotStore::new(dir.path(), Duration::from_secs(7 * 86_400));

    let mut windows = RetentionWindows::new();
    for (i, seconds_ago) in [50, 40, 30, 20, 10].iter().enumerate() {
        windows.ingest(record(Category::System, *seconds_ago, i as i64));
    }
    windows.ingest(record(Category::Error, 5, 99));

    store.persist(&Snapshot::new(windows.clone())).await.unwrap();
    let loaded = store.load_latest().await.unwrap().unwrap();

    assert_eq!(loaded.windows, windows);
    let values: Vec<_> = loaded
        .windows
        .window(Category::System)
        .map(|r| r.payload["value"].as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_snapshot_pruning_keeps_recent_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonSnapshotStore::new(dir.path(), Duration::from_secs(86_400));

    let mut old = Snapshot::new(RetentionWindows::new());
    old.taken_at = Utc::now() - TimeDelta::days(3);
    store.persist(&old).await.unwrap();
    store
        .persist(&Snapshot::new(RetentionWindows::new()))
        .await
        .unwrap();
    std::fs::write(dir.path().join("unrelated.json"), "{}").unwrap();

    assert_eq!(store.prune(Utc::now()).await.unwrap(), 1);
    assert!(dir.path().join("unrelated.json").exists());
    assert!(store.load_latest().await.unwrap().is_some());
}

#[tokio::test]
async fn test_report_only_matches_final_report() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());

    let collector = ScriptedCollector::new(Category::System, vec![cpu(99.0), cpu(42.0)]);
    let calls = collector.calls();

    let controller = Controller::new(settings.clone()).unwrap();
    controller
        .start(CollectorSet::new().with(collector))
        .await
        .unwrap();
    wait_for_calls(&calls, 3, Duration::from_secs(5)).await;
    let live = controller.stop().await.unwrap();

    let offline = report_from_state_dir(&settings).await.unwrap();
    assert_eq!(offline.report_info.source, ReportSource::Snapshot);
    assert_eq!(offline.report_info.started_at, None);
    assert_eq!(
        offline.category(Category::System),
        live.category(Category::System)
    );
    assert_eq!(offline.alerts, live.alerts);
    assert_eq!(offline.alerts.total, 1);

    let logged = AlertLog::new(settings.alert_log_path())
        .read_all()
        .await
        .unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].category, Category::System);
}

#[tokio::test]
async fn test_alert_log_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());
    let log = AlertLog::new(settings.alert_log_path());

    for _ in 0..2 {
        let collector = ScriptedCollector::new(Category::System, vec![cpu(95.0)]);
        let calls = collector.calls();
        let controller = Controller::new(settings.clone()).unwrap();
        controller
            .start(CollectorSet::new().with(collector))
            .await
            .unwrap();
        wait_for_calls(&calls, 2, Duration::from_secs(5)).await;
        controller.stop().await.unwrap();
    }

    assert_eq!(log.read_all().await.unwrap().len(), 2);
    assert_eq!(log.tally().await.unwrap().category(Category::System).warning, 2);
}
