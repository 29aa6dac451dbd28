//! Failure tests for the pipeline
//!
//! These tests verify that the system degrades instead of halting:
//! - Failing collector ticks
//! - Hung collectors
//! - Tasks that miss their join window
//! - Ticks still running when the pipeline stops
//! - Unwritable state directories

use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use deploy_monitor::{
    Category,
    actors::{Controller, LifecycleState},
    collectors::CollectorSet,
    error::ControllerError,
    report::FINAL_REPORT_PREFIX,
};

use crate::helpers::*;

#[tokio::test]
async fn test_failed_tick_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());

    let collector = ScriptedCollector::new(
        Category::System,
        vec![cpu(10.0), Step::Fail, cpu(20.0), cpu(30.0), cpu(40.0)],
    );
    let calls = collector.calls();

    let controller = Controller::new(settings).unwrap();
    controller
        .start(CollectorSet::new().with(collector))
        .await
        .unwrap();

    // the sixth call runs past the script, so all five ticks are done
    wait_for_calls(&calls, 6, Duration::from_secs(5)).await;
    let report = controller.stop().await.unwrap();

    let system = report.category(Category::System).unwrap();
    assert_eq!(system.sample_count, 4);
    assert_eq!(system.latest.as_ref().unwrap()["cpu_percent"], 40.0);
}

#[tokio::test]
async fn test_sampler_keeps_retrying_after_repeated_failures() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());

    let mut script = vec![Step::Fail; 6];
    script.push(cpu(50.0));
    let collector = ScriptedCollector::new(Category::Build, script);
    let calls = collector.calls();

    let controller = Controller::new(settings).unwrap();
    controller
        .start(CollectorSet::new().with(collector))
        .await
        .unwrap();

    wait_for_calls(&calls, 8, Duration::from_secs(5)).await;
    let report = controller.stop().await.unwrap();

    assert_eq!(report.category(Category::Build).unwrap().sample_count, 1);
}

#[tokio::test]
async fn test_hung_collector_does_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = fast_settings(dir.path());
    settings.collect_timeout = Duration::from_millis(50);

    let hung = ScriptedCollector::new(
        Category::Performance,
        vec![Step::Hang(Duration::from_millis(400))],
    );
    let healthy = ScriptedCollector::new(
        Category::System,
        vec![cpu(10.0), cpu(11.0), cpu(12.0)],
    );
    let healthy_calls = healthy.calls();

    let controller = Controller::new(settings).unwrap();
    controller
        .start(CollectorSet::new().with(hung).with(healthy))
        .await
        .unwrap();

    wait_for_calls(&healthy_calls, 4, Duration::from_secs(5)).await;
    let report = controller.stop().await.unwrap();

    assert_eq!(report.category(Category::System).unwrap().sample_count, 3);
    assert_eq!(report.category(Category::Performance).unwrap().sample_count, 0);
}

#[tokio::test]
async fn test_overdue_task_is_abandoned() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = fast_settings(dir.path());
    settings.collect_timeout = Duration::from_secs(5);
    settings.join_timeout = Duration::from_millis(100);

    let stuck = ScriptedCollector::new(
        Category::Deployment,
        vec![Step::Hang(Duration::from_millis(800))],
    );
    let calls = stuck.calls();

    let controller = Controller::new(settings).unwrap();
    controller
        .start(CollectorSet::new().with(stuck))
        .await
        .unwrap();
    wait_for_calls(&calls, 1, Duration::from_secs(5)).await;

    let started = Instant::now();
    let report = controller.stop().await;
    assert!(started.elapsed() < Duration::from_millis(600));
    assert!(report.is_some());
    assert_eq!(controller.state(), LifecycleState::Stopped);

    let reports = files_with_prefix(&dir.path().join("reports"), FINAL_REPORT_PREFIX);
    assert_eq!(reports.len(), 1);
}

#[tokio::test]
async fn test_unusable_state_dir_is_fatal_at_start() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let mut settings = fast_settings(dir.path());
    settings.state_dir = blocker.join("state");

    let controller = Controller::new(settings).unwrap();
    let result = controller
        .start(CollectorSet::new().with(ScriptedCollector::new(Category::System, vec![])))
        .await;

    assert_matches!(result, Err(ControllerError::Startup(_)));
    assert_eq!(controller.state(), LifecycleState::Idle);
}

#[tokio::test]
async fn test_records_from_running_ticks_survive_stop() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = fast_settings(dir.path());
    settings.collect_timeout = Duration::from_secs(1);
    settings.join_timeout = Duration::from_secs(2);

    let system = ScriptedCollector::new(
        Category::System,
        vec![cpu(10.0), Step::Hang(Duration::from_millis(150))],
    );
    let build = ScriptedCollector::new(
        Category::Build,
        vec![cpu(20.0), Step::Hang(Duration::from_millis(450))],
    );
    let (system_calls, build_calls) = (system.calls(), build.calls());

    let store = Arc::new(SlowStore::new(Duration::from_millis(300)));
    let controller = Controller::with_store(settings, store).unwrap();
    controller
        .start(CollectorSet::new().with(system).with(build))
        .await
        .unwrap();

    // both second ticks are in flight when the flag flips
    wait_for_calls(&system_calls, 2, Duration::from_secs(5)).await;
    wait_for_calls(&build_calls, 2, Duration::from_secs(5)).await;
    let report = controller.stop().await.unwrap();

    assert_eq!(report.drops.metrics, 0);
    assert_eq!(report.category(Category::System).unwrap().sample_count, 2);
    assert_eq!(report.category(Category::Build).unwrap().sample_count, 2);
}
