//! End-to-end ingestion tests: JSON payloads in, persisted rows, event log
//! entries, and composite anomaly status out. Runs entirely against the
//! in-memory repository.

use std::sync::Arc;

use chrono::Duration;

use motor_monitor::config::Topics;
use motor_monitor::db::models::{MetricKind, Severity};
use motor_monitor::ingest::aggregate::composite_status;
use motor_monitor::ingest::deviation::DeviationDetector;
use motor_monitor::ingest::messages::TopicMap;
use motor_monitor::ingest::prediction::PredictionTracker;
use motor_monitor::ingest::router::IngestionRouter;
use motor_monitor::repo::memory::MemoryRepository;
use motor_monitor::repo::Repository;
use motor_monitor::ws::Broadcaster;

fn topics() -> Topics {
    Topics {
        live: "iot/motor/live".into(),
        twin: "iot/motor/twin".into(),
        malfunction_info: "iot/motor/malfunction/info".into(),
        malfunction_warning: "iot/motor/malfunction/warning".into(),
        malfunction_error: "iot/motor/malfunction/error".into(),
        raw_temperature: "raw/temperature".into(),
        raw_current: "raw/current".into(),
        raw_torque: "raw/torque".into(),
        feature_temperature: "feature/temperature".into(),
        feature_current: "feature/current".into(),
        feature_torque: "feature/torque".into(),
        prediction_temperature: "prediction/temperature".into(),
        prediction_current: "prediction/current".into(),
        prediction_torque: "prediction/torque".into(),
    }
}

fn router(repo: Arc<MemoryRepository>) -> IngestionRouter {
    IngestionRouter::new(
        repo,
        Broadcaster::new(),
        TopicMap::new(&topics()),
        10.0,
        10,
        Duration::seconds(10),
    )
}

/// Publish fresh raw samples for every metric so the staleness rule passes.
async fn feed_fresh_raw(router: &mut IngestionRouter) {
    for topic in ["raw/current", "raw/temperature", "raw/torque"] {
        router.handle_message(topic, br#"{"value": 1.0}"#).await;
    }
}

#[tokio::test]
async fn deviation_round_trip_warning_then_recovery() {
    let repo = Arc::new(MemoryRepository::new());
    let mut router = router(repo.clone());

    feed_fresh_raw(&mut router).await;
    router
        .handle_message("iot/motor/twin", br#"{"current": 10.0, "rpm": 1500.0}"#)
        .await;

    // 100% off on current, rpm in agreement.
    router
        .handle_message("iot/motor/live", br#"{"current": 20.0, "rpm": 1500.0}"#)
        .await;

    let logs = repo.all_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].severity, Severity::Warning);
    assert!(logs[0].description.contains("Current deviation"));

    // Recovery: a single INFO entry, and the warning is auto-acknowledged so
    // the dashboard returns to normal immediately.
    router
        .handle_message("iot/motor/live", br#"{"current": 10.0, "rpm": 1500.0}"#)
        .await;

    let logs = repo.all_logs().await;
    assert_eq!(logs.len(), 2);
    assert!(logs[0].acknowledged);
    assert_eq!(logs[1].severity, Severity::Info);
    assert!(logs[1].description.contains("running normally"));

    let status = composite_status(
        repo.as_ref(),
        Duration::seconds(10),
        &DeviationDetector::new(10.0),
        &PredictionTracker::new(10),
    )
    .await
    .unwrap();
    assert!(!status.detected);
    assert_eq!(status.message, "Motor operating normally.");
}

#[tokio::test]
async fn unacknowledged_error_drives_critical_status() {
    let repo = Arc::new(MemoryRepository::new());
    let mut router = router(repo.clone());

    feed_fresh_raw(&mut router).await;
    router.handle_message("iot/motor/twin", br#"{"current": 10.0}"#).await;
    router
        .handle_message(
            "iot/motor/malfunction/error",
            br#"{"description": "emergency stop triggered", "motor_state": "fault", "emergency_stop_active": true}"#,
        )
        .await;

    let status = composite_status(
        repo.as_ref(),
        Duration::seconds(10),
        &DeviationDetector::new(10.0),
        &PredictionTracker::new(10),
    )
    .await
    .unwrap();
    assert!(status.detected);
    assert_eq!(status.message, "CRITICAL: emergency stop triggered");

    let logs = repo.all_logs().await;
    assert!(logs[0].emergency_stop_active);
}

#[tokio::test]
async fn stale_inputs_mask_everything_else() {
    let repo = Arc::new(MemoryRepository::new());
    let mut router = router(repo.clone());

    // Raw streams carry old timestamps; the error log is fresh.
    let old = r#"{"timestamp": "2024-01-01T00:00:00", "value": 1.0}"#;
    for topic in ["raw/current", "raw/temperature", "raw/torque"] {
        router.handle_message(topic, old.as_bytes()).await;
    }
    router
        .handle_message(
            "iot/motor/twin",
            br#"{"timestamp": "2024-01-01T00:00:00", "current": 10.0}"#,
        )
        .await;
    router
        .handle_message(
            "iot/motor/malfunction/error",
            br#"{"description": "overheat"}"#,
        )
        .await;

    let status = composite_status(
        repo.as_ref(),
        Duration::seconds(10),
        &DeviationDetector::new(10.0),
        &PredictionTracker::new(10),
    )
    .await
    .unwrap();
    assert!(status.detected);
    assert_eq!(
        status.message,
        "Insufficient or stale data for anomaly detection."
    );
}

#[tokio::test]
async fn prediction_stream_escalates_and_recovers() {
    let repo = Arc::new(MemoryRepository::new());
    let mut router = router(repo.clone());

    for _ in 0..10 {
        router
            .handle_message("prediction/current", br#"{"value": -1.0}"#)
            .await;
    }

    let logs = repo.all_logs().await;
    assert_eq!(logs.len(), 10);
    assert_eq!(
        logs.iter().filter(|l| l.severity == Severity::Warning).count(),
        9
    );
    let error = logs.iter().find(|l| l.severity == Severity::Error).unwrap();
    assert!(error.description.contains("10 consecutive bad readings"));

    // Latched: further bad values stay quiet.
    router
        .handle_message("prediction/current", br#"{"value": -1.0}"#)
        .await;
    assert_eq!(repo.all_logs().await.len(), 10);

    // Recovery acknowledges the whole incident.
    router
        .handle_message("prediction/current", br#"{"value": 1.0}"#)
        .await;
    let logs = repo.all_logs().await;
    assert_eq!(logs.len(), 11);
    assert!(logs.iter().filter(|l| l.severity != Severity::Info).all(|l| l.acknowledged));

    // Every prediction sample was persisted regardless of detector state.
    assert!(repo
        .latest_prediction(MetricKind::Current)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn timestamps_are_normalized_to_utc_at_the_edge() {
    let repo = Arc::new(MemoryRepository::new());
    let mut router = router(repo.clone());

    router
        .handle_message(
            "iot/motor/live",
            br#"{"timestamp": "2024-05-01T10:00:00+02:00", "current": 1.0}"#,
        )
        .await;

    let sample = repo.latest_live().await.unwrap().unwrap();
    assert_eq!(sample.recorded_at.to_rfc3339(), "2024-05-01T08:00:00+00:00");
}

#[tokio::test]
async fn snapshots_are_broadcast_after_each_message() {
    let repo = Arc::new(MemoryRepository::new());
    let broadcaster = Broadcaster::new();
    let mut router = IngestionRouter::new(
        repo,
        broadcaster.clone(),
        TopicMap::new(&topics()),
        10.0,
        10,
        Duration::seconds(10),
    );

    assert!(broadcaster.latest_snapshot().await.is_none());
    router.handle_message("iot/motor/live", br#"{"current": 1.0}"#).await;

    let snapshot = broadcaster.latest_snapshot().await.unwrap();
    assert_eq!(snapshot.real_motor_data.current.value, Some(1.0));
    // Live data alone is not enough for detection: raw streams are missing.
    assert!(snapshot.anomaly_status.detected);
}
