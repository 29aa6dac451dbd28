//! End-to-end tests of the sampler → bus → aggregator / alert handler pipeline

use std::time::Duration;

use deploy_monitor::{
    Category, Severity,
    actors::{Controller, LifecycleState},
    collectors::CollectorSet,
    storage::AlertLog,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn test_cpu_breach_raises_one_warning_per_tick() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());
    let alert_log = AlertLog::new(settings.alert_log_path());

    let collector = ScriptedCollector::new(Category::System, vec![cpu(95.0), cpu(95.0), cpu(95.0)]);
    let calls = collector.calls();

    let controller = Controller::new(settings).unwrap();
    controller
        .start(CollectorSet::new().with(collector))
        .await
        .unwrap();

    wait_for_calls(&calls, 4, Duration::from_secs(5)).await;
    let report = controller.stop().await.unwrap();

    let alerts = alert_log.read_all().await.unwrap();
    assert_eq!(alerts.len(), 3);
    assert!(alerts.iter().all(|a| a.severity == Severity::Warning));
    assert!(alerts.iter().all(|a| a.message.contains("CPU usage")));

    assert_eq!(report.actionable_alerts(Category::System), 3);
    assert_eq!(report.alerts.total, 3);
    assert_eq!(report.category(Category::System).unwrap().sample_count, 3);
}

#[tokio::test]
async fn test_every_category_reaches_the_aggregator() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());

    let mut set = CollectorSet::new();
    let mut counters = vec![];
    for category in Category::ALL {
        let script = (0..5)
            .map(|i| Step::Emit(json!({ "tick": i })))
            .collect();
        let collector = ScriptedCollector::new(category, script);
        counters.push(collector.calls());
        set = set.with(collector);
    }

    let controller = Controller::new(settings).unwrap();
    controller.start(set).await.unwrap();
    for calls in &counters {
        wait_for_calls(calls, 6, Duration::from_secs(5)).await;
    }

    let live = controller.report().await.unwrap();
    assert_eq!(controller.state(), LifecycleState::Running);
    assert!(live.category(Category::Error).unwrap().sample_count <= 5);

    let report = controller.stop().await.unwrap();
    for category in Category::ALL {
        let summary = report.category(category).unwrap();
        assert_eq!(summary.sample_count, 5, "{category}");
        assert_eq!(summary.latest.as_ref().unwrap()["tick"], json!(4));
        assert!(summary.first_sample_at <= summary.latest_sample_at);
    }
    assert_eq!(report.drops.metrics, 0);
}

#[tokio::test]
async fn test_clean_run_recommends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());

    let collector = ScriptedCollector::new(
        Category::System,
        vec![Step::Emit(json!({
            "cpu_percent": 20.0,
            "memory_percent": 30.0,
            "disk_percent": 40.0,
            "disk_free_gb": 500.0,
        }))],
    );
    let calls = collector.calls();

    let controller = Controller::new(settings).unwrap();
    controller
        .start(CollectorSet::new().with(collector))
        .await
        .unwrap();
    wait_for_calls(&calls, 2, Duration::from_secs(5)).await;

    let report = controller.stop().await.unwrap();
    assert_eq!(report.alerts.total, 0);
    assert_eq!(
        report.recommendations,
        vec!["System appears to be running optimally"]
    );
    assert_eq!(
        report.category(Category::System).unwrap().summary["disk_usage_current"],
        json!(40.0)
    );
}
