//! Concurrency tests for the lifecycle controller and the buses

use std::time::Duration;

use deploy_monitor::{
    Category, MetricRecord, Payload,
    actors::{Controller, LifecycleState, bus::bus},
    collectors::CollectorSet,
    report::FINAL_REPORT_PREFIX,
};
use tokio::sync::mpsc::error::TryRecvError;

use crate::helpers::*;

#[tokio::test]
async fn test_concurrent_stops_write_one_report() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());

    let collector = ScriptedCollector::new(Category::System, vec![cpu(1.0), cpu(2.0)]);
    let calls = collector.calls();

    let controller = Controller::new(settings).unwrap();
    controller
        .start(CollectorSet::new().with(collector))
        .await
        .unwrap();
    wait_for_calls(&calls, 2, Duration::from_secs(5)).await;

    let (first, second) = tokio::join!(controller.stop(), controller.stop());
    assert_eq!(
        [first.is_some(), second.is_some()]
            .iter()
            .filter(|s| **s)
            .count(),
        1
    );
    assert!(controller.stop().await.is_none());
    assert_eq!(controller.state(), LifecycleState::Stopped);

    let reports = files_with_prefix(&dir.path().join("reports"), FINAL_REPORT_PREFIX);
    assert_eq!(reports.len(), 1);
}

#[tokio::test]
async fn test_state_changes_are_observable() {
    let dir = tempfile::tempdir().unwrap();
    let controller = Controller::new(fast_settings(dir.path())).unwrap();
    let mut states = controller.subscribe();

    controller
        .start(CollectorSet::new().with(ScriptedCollector::new(Category::Error, vec![])))
        .await
        .unwrap();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), LifecycleState::Running);

    controller.stop().await.unwrap();
    assert_eq!(*states.borrow_and_update(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_many_producers_never_block() {
    let (tx, mut rx) = bus::<MetricRecord>("metric", 16);

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let tx = tx.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    let _ = tx.try_publish(MetricRecord::new(Category::Build, Payload::new()));
                }
            })
        })
        .collect();

    tokio::time::timeout(Duration::from_secs(1), futures::future::join_all(producers))
        .await
        .unwrap();

    let mut delivered = 0;
    loop {
        match rx.try_recv() {
            Ok(_) => delivered += 1,
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        }
    }
    assert_eq!(delivered, 16);
    assert_eq!(tx.drop_counter().get(), 400 - 16);
}

#[tokio::test]
async fn test_records_within_category_are_time_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());

    let script = (0..8).map(|i| cpu(i as f64)).collect();
    let collector = ScriptedCollector::new(Category::System, script);
    let calls = collector.calls();

    let controller = Controller::new(settings).unwrap();
    controller
        .start(CollectorSet::new().with(collector))
        .await
        .unwrap();
    wait_for_calls(&calls, 9, Duration::from_secs(5)).await;
    controller.stop().await.unwrap();

    let snapshot_report =
        deploy_monitor::report::report_from_state_dir(&fast_settings(dir.path()))
            .await
            .unwrap();
    let system = snapshot_report.category(Category::System).unwrap();
    assert_eq!(system.sample_count, 8);
    assert_eq!(system.latest.as_ref().unwrap()["cpu_percent"], 7.0);
}
