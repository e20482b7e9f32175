//! Composite anomaly status and dashboard snapshot assembly.
//!
//! The aggregator folds freshness, the event log, and both detector state
//! machines into one `{detected, message}` pair under a strict precedence
//! order: stale inputs make every other signal untrustworthy, classified log
//! entries outrank raw statistical deviation, and deviation outranks the
//! indirect prediction signal.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::db::models::{
    FeatureMetricSample, LiveSample, MalfunctionLogEntry, MetricKind, MotorInfo, PredictionSample,
    RawMetricSample, ReferenceRun, Severity, TwinSample,
};
use crate::repo::Repository;

use super::deviation::DeviationDetector;
use super::freshness::is_fresh_at;
use super::prediction::PredictionTracker;

/// Number of log entries carried in each dashboard snapshot.
pub const SNAPSHOT_LOG_LIMIT: i64 = 5;

/// Window within which unacknowledged log entries drive the composite status.
const LOG_WINDOW_MINUTES: i64 = 5;

/// INFO descriptions marking the start of a motor run.
pub const RUN_START_PATTERNS: [&str; 2] = ["motor extending", "motor retracting"];

/// INFO description marking the end of a motor run.
pub const RUN_END_PATTERN: &str = "end position reached";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyStatus {
    pub detected: bool,
    pub message: String,
}

impl AnomalyStatus {
    fn anomaly(message: impl Into<String>) -> Self {
        Self {
            detected: true,
            message: message.into(),
        }
    }

    fn normal() -> Self {
        Self {
            detected: false,
            message: "Motor operating normally.".to_owned(),
        }
    }
}

/// Recompute the composite status. Must run after the current message's
/// state mutations so every broadcast reflects a consistent post-update view.
pub async fn composite_status(
    repo: &dyn Repository,
    freshness_threshold: Duration,
    deviation: &DeviationDetector,
    prediction: &PredictionTracker,
) -> Result<AnomalyStatus> {
    let now = Utc::now();

    // Rule 1: required inputs present and fresh, otherwise nothing else is
    // trustworthy.
    let mut inputs_fresh = is_fresh_at(
        repo.latest_twin().await?.map(|t| t.recorded_at),
        now,
        freshness_threshold,
    );
    for metric in [MetricKind::Current, MetricKind::Temperature, MetricKind::Torque] {
        let ts = repo.latest_raw(metric).await?.map(|r| r.recorded_at);
        inputs_fresh &= is_fresh_at(ts, now, freshness_threshold);
    }
    if !inputs_fresh {
        return Ok(AnomalyStatus::anomaly(
            "Insufficient or stale data for anomaly detection.",
        ));
    }

    // Rules 2 and 3: recent unacknowledged classified faults.
    let recent = repo
        .unacknowledged_logs_since(now - Duration::minutes(LOG_WINDOW_MINUTES))
        .await?;
    if let Some(error) = recent.iter().find(|l| l.severity == Severity::Error) {
        return Ok(AnomalyStatus::anomaly(format!(
            "CRITICAL: {}",
            error.description
        )));
    }
    if let Some(warning) = recent.iter().find(|l| l.severity == Severity::Warning) {
        return Ok(AnomalyStatus::anomaly(format!(
            "WARNING: {}",
            warning.description
        )));
    }

    // Rule 4: direct physical-value deviation.
    if deviation.any_deviating() {
        return Ok(AnomalyStatus::anomaly(
            "WARNING: live readings deviating from the digital twin.",
        ));
    }

    // Rule 5: indirect model signal.
    if prediction.any_active() {
        return Ok(AnomalyStatus::anomaly(
            "WARNING: prediction model reporting anomalies.",
        ));
    }

    Ok(AnomalyStatus::normal())
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricValue {
    pub value: Option<f64>,
    pub unit: &'static str,
}

/// One dashboard panel of channel readings with engineering units.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelPanel {
    pub current: MetricValue,
    pub voltage: MetricValue,
    pub rpm: MetricValue,
    pub vibration: MetricValue,
    pub temperature: MetricValue,
    pub torque: MetricValue,
    pub run_time: MetricValue,
}

impl ChannelPanel {
    #[allow(clippy::too_many_arguments)]
    fn from_channels(
        current: Option<f64>,
        voltage: Option<f64>,
        rpm: Option<f64>,
        vibration: Option<f64>,
        temperature: Option<f64>,
        torque: Option<f64>,
        run_time: Option<f64>,
    ) -> Self {
        Self {
            current: MetricValue { value: current, unit: "A" },
            voltage: MetricValue { value: voltage, unit: "V" },
            rpm: MetricValue { value: rpm, unit: "rpm" },
            vibration: MetricValue { value: vibration, unit: "mm/s" },
            temperature: MetricValue { value: temperature, unit: "°C" },
            torque: MetricValue { value: torque, unit: "Nm" },
            run_time: MetricValue { value: run_time, unit: "h" },
        }
    }

    fn empty() -> Self {
        Self::from_channels(None, None, None, None, None, None, None)
    }

    fn from_live(sample: &LiveSample) -> Self {
        Self::from_channels(
            sample.current,
            sample.voltage,
            sample.rpm,
            sample.vibration,
            sample.temperature,
            sample.torque,
            sample.run_time,
        )
    }

    fn from_twin(sample: &TwinSample) -> Self {
        Self::from_channels(
            sample.current,
            sample.voltage,
            sample.rpm,
            sample.vibration,
            sample.temperature,
            sample.torque,
            sample.run_time,
        )
    }

    fn from_reference(run: &ReferenceRun) -> Self {
        Self::from_channels(
            run.current,
            run.voltage,
            run.rpm,
            run.vibration,
            run.temperature,
            run.torque,
            run.run_time,
        )
    }
}

/// Identity panel. A missing asset record degrades to a placeholder instead
/// of failing the snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct MotorInfoPanel {
    pub name: String,
    pub model: String,
    pub description: String,
    pub serial: String,
    pub location: String,
    pub commissioning_date: Option<NaiveDate>,
    pub cycles: i32,
    pub operating_mode: String,
}

impl MotorInfoPanel {
    fn placeholder() -> Self {
        Self {
            name: "Unknown motor".to_owned(),
            model: "N/A".to_owned(),
            description: "No motor information configured.".to_owned(),
            serial: "N/A".to_owned(),
            location: "N/A".to_owned(),
            commissioning_date: None,
            cycles: 0,
            operating_mode: "N/A".to_owned(),
        }
    }
}

impl From<MotorInfo> for MotorInfoPanel {
    fn from(info: MotorInfo) -> Self {
        Self {
            name: info.name,
            model: info.model,
            description: info.description,
            serial: info.serial,
            location: info.location,
            commissioning_date: info.commissioning_date,
            cycles: info.cycles,
            operating_mode: info.operating_mode,
        }
    }
}

/// Latest raw/feature/prediction records for one metric.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshots {
    pub raw: Option<RawMetricSample>,
    pub feature: Option<FeatureMetricSample>,
    pub prediction: Option<PredictionSample>,
}

/// Complete dashboard state pushed to every subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub motor_info: MotorInfoPanel,
    pub real_motor_data: ChannelPanel,
    pub digital_twin_data: ChannelPanel,
    /// Static expected values from the latest valid reference run.
    pub expected_values: Option<ChannelPanel>,
    pub metrics: BTreeMap<MetricKind, MetricSnapshots>,
    pub anomaly_status: AnomalyStatus,
    pub malfunction_logs: Vec<MalfunctionLogEntry>,
}

pub async fn build_snapshot(
    repo: &dyn Repository,
    anomaly_status: AnomalyStatus,
) -> Result<DashboardSnapshot> {
    let motor_info = match repo.motor_info().await? {
        Some(info) => info.into(),
        None => MotorInfoPanel::placeholder(),
    };

    let real_motor_data = match repo.latest_live().await? {
        Some(sample) => ChannelPanel::from_live(&sample),
        None => ChannelPanel::empty(),
    };
    let digital_twin_data = match repo.latest_twin().await? {
        Some(sample) => ChannelPanel::from_twin(&sample),
        None => ChannelPanel::empty(),
    };
    let expected_values = repo
        .latest_valid_reference_run()
        .await?
        .map(|run| ChannelPanel::from_reference(&run));

    let mut metrics = BTreeMap::new();
    for metric in MetricKind::ALL {
        metrics.insert(
            metric,
            MetricSnapshots {
                raw: repo.latest_raw(metric).await?,
                feature: repo.latest_feature(metric).await?,
                prediction: repo.latest_prediction(metric).await?,
            },
        );
    }

    let malfunction_logs = repo.recent_unacknowledged_logs(SNAPSHOT_LOG_LIMIT).await?;

    Ok(DashboardSnapshot {
        motor_info,
        real_motor_data,
        digital_twin_data,
        expected_values,
        metrics,
        anomaly_status,
        malfunction_logs,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct PlotPoint {
    pub x: DateTime<Utc>,
    pub y: f64,
}

/// Chart series per channel; points with a missing channel are skipped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlotSeries {
    pub current: Vec<PlotPoint>,
    pub voltage: Vec<PlotPoint>,
    pub rpm: Vec<PlotPoint>,
    pub vibration: Vec<PlotPoint>,
    pub temperature: Vec<PlotPoint>,
}

impl PlotSeries {
    fn push(
        &mut self,
        ts: DateTime<Utc>,
        current: Option<f64>,
        voltage: Option<f64>,
        rpm: Option<f64>,
        vibration: Option<f64>,
        temperature: Option<f64>,
    ) {
        if let Some(y) = current {
            self.current.push(PlotPoint { x: ts, y });
        }
        if let Some(y) = voltage {
            self.voltage.push(PlotPoint { x: ts, y });
        }
        if let Some(y) = rpm {
            self.rpm.push(PlotPoint { x: ts, y });
        }
        if let Some(y) = vibration {
            self.vibration.push(PlotPoint { x: ts, y });
        }
        if let Some(y) = temperature {
            self.temperature.push(PlotPoint { x: ts, y });
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlotData {
    pub live: PlotSeries,
    pub twin: PlotSeries,
}

/// Live and twin series over `[start, end]`, formatted for the dashboard
/// charts.
pub async fn plot_data(
    repo: &dyn Repository,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<PlotData> {
    let mut data = PlotData::default();
    for sample in repo.live_range(start, end).await? {
        data.live.push(
            sample.recorded_at,
            sample.current,
            sample.voltage,
            sample.rpm,
            sample.vibration,
            sample.temperature,
        );
    }
    for sample in repo.twin_range(start, end).await? {
        data.twin.push(
            sample.recorded_at,
            sample.current,
            sample.voltage,
            sample.rpm,
            sample.vibration,
            sample.temperature,
        );
    }
    Ok(data)
}

/// Time window of the most recent motor run, derived from INFO log entries.
/// `None` end means the motor is still running.
pub async fn active_run_window(
    repo: &dyn Repository,
) -> Result<Option<(DateTime<Utc>, Option<DateTime<Utc>>)>> {
    let Some(start_log) = repo.latest_info_log_matching(&RUN_START_PATTERNS).await? else {
        return Ok(None);
    };
    let end = repo
        .first_info_log_matching_after(RUN_END_PATTERN, start_log.recorded_at)
        .await?
        .map(|l| l.recorded_at);
    Ok(Some((start_log.recorded_at, end)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewLogEntry, NewMotorSample, NewRawSample};
    use crate::repo::memory::MemoryRepository;

    fn detectors() -> (DeviationDetector, PredictionTracker) {
        (DeviationDetector::new(10.0), PredictionTracker::new(10))
    }

    async fn seed_fresh_inputs(repo: &MemoryRepository) {
        let now = Utc::now();
        for metric in MetricKind::ALL {
            repo.insert_raw(NewRawSample {
                recorded_at: now,
                metric,
                value: 1.0,
            })
            .await
            .unwrap();
        }
        repo.insert_twin(NewMotorSample {
            recorded_at: now,
            current: Some(10.0),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn all_inputs_fresh_and_clean_is_normal() {
        let repo = MemoryRepository::new();
        seed_fresh_inputs(&repo).await;
        let (deviation, prediction) = detectors();

        let status = composite_status(&repo, Duration::seconds(10), &deviation, &prediction)
            .await
            .unwrap();
        assert!(!status.detected);
        assert_eq!(status.message, "Motor operating normally.");
    }

    #[tokio::test]
    async fn staleness_dominates_an_unacknowledged_error_log() {
        let repo = MemoryRepository::new();
        let stale = Utc::now() - Duration::seconds(60);
        for metric in MetricKind::ALL {
            repo.insert_raw(NewRawSample {
                recorded_at: stale,
                metric,
                value: 1.0,
            })
            .await
            .unwrap();
        }
        repo.insert_twin(NewMotorSample {
            recorded_at: stale,
            ..Default::default()
        })
        .await
        .unwrap();
        repo.insert_log(NewLogEntry::new(Severity::Error, "motor fault", "fault"))
            .await
            .unwrap();

        let (deviation, prediction) = detectors();
        let status = composite_status(&repo, Duration::seconds(10), &deviation, &prediction)
            .await
            .unwrap();
        assert!(status.detected);
        assert_eq!(
            status.message,
            "Insufficient or stale data for anomaly detection."
        );
    }

    #[tokio::test]
    async fn missing_raw_input_counts_as_stale() {
        let repo = MemoryRepository::new();
        // Twin present and fresh, raw streams absent entirely.
        repo.insert_twin(NewMotorSample {
            recorded_at: Utc::now(),
            ..Default::default()
        })
        .await
        .unwrap();

        let (deviation, prediction) = detectors();
        let status = composite_status(&repo, Duration::seconds(10), &deviation, &prediction)
            .await
            .unwrap();
        assert!(status.detected);
        assert!(status.message.contains("stale"));
    }

    #[tokio::test]
    async fn error_log_outranks_warning_log_and_deviation() {
        let repo = MemoryRepository::new();
        seed_fresh_inputs(&repo).await;
        repo.insert_log(NewLogEntry::new(Severity::Warning, "minor wobble", "unknown"))
            .await
            .unwrap();
        repo.insert_log(NewLogEntry::new(Severity::Error, "emergency stop", "fault"))
            .await
            .unwrap();

        let (mut deviation, prediction) = detectors();
        // Force the current channel into the deviating state.
        let live = repo
            .insert_live(NewMotorSample {
                recorded_at: Utc::now(),
                current: Some(20.0),
                ..Default::default()
            })
            .await
            .unwrap();
        let twin = repo.latest_twin().await.unwrap().unwrap();
        deviation.evaluate(&live, &twin);
        assert!(deviation.any_deviating());

        let status = composite_status(&repo, Duration::seconds(10), &deviation, &prediction)
            .await
            .unwrap();
        assert_eq!(status.message, "CRITICAL: emergency stop");
    }

    #[tokio::test]
    async fn warning_log_outranks_active_deviation() {
        let repo = MemoryRepository::new();
        seed_fresh_inputs(&repo).await;
        repo.insert_log(NewLogEntry::new(Severity::Warning, "bearing noise", "unknown"))
            .await
            .unwrap();

        let (mut deviation, prediction) = detectors();
        let live = repo
            .insert_live(NewMotorSample {
                recorded_at: Utc::now(),
                current: Some(20.0),
                ..Default::default()
            })
            .await
            .unwrap();
        let twin = repo.latest_twin().await.unwrap().unwrap();
        deviation.evaluate(&live, &twin);

        let status = composite_status(&repo, Duration::seconds(10), &deviation, &prediction)
            .await
            .unwrap();
        assert_eq!(status.message, "WARNING: bearing noise");
    }

    #[tokio::test]
    async fn acknowledged_logs_do_not_drive_the_status() {
        let repo = MemoryRepository::new();
        seed_fresh_inputs(&repo).await;
        let entry = repo
            .insert_log(NewLogEntry::new(Severity::Error, "old fault", "fault"))
            .await
            .unwrap();
        repo.acknowledge_log(entry.id).await.unwrap();

        let (deviation, prediction) = detectors();
        let status = composite_status(&repo, Duration::seconds(10), &deviation, &prediction)
            .await
            .unwrap();
        assert!(!status.detected);
    }

    #[tokio::test]
    async fn prediction_anomaly_is_the_lowest_precedence_signal() {
        let repo = MemoryRepository::new();
        seed_fresh_inputs(&repo).await;

        let (deviation, mut prediction) = detectors();
        prediction.observe(MetricKind::Current, -1.0);

        let status = composite_status(&repo, Duration::seconds(10), &deviation, &prediction)
            .await
            .unwrap();
        assert!(status.detected);
        assert_eq!(
            status.message,
            "WARNING: prediction model reporting anomalies."
        );
    }

    #[tokio::test]
    async fn snapshot_degrades_to_placeholder_identity() {
        let repo = MemoryRepository::new();
        let snapshot = build_snapshot(&repo, AnomalyStatus::normal()).await.unwrap();
        assert_eq!(snapshot.motor_info.name, "Unknown motor");
        assert!(snapshot.real_motor_data.current.value.is_none());
        assert!(snapshot.expected_values.is_none());
    }

    #[tokio::test]
    async fn snapshot_limits_log_entries() {
        let repo = MemoryRepository::new();
        for i in 0..8 {
            repo.insert_log(NewLogEntry::new(Severity::Info, format!("event {i}"), "normal"))
                .await
                .unwrap();
        }
        let snapshot = build_snapshot(&repo, AnomalyStatus::normal()).await.unwrap();
        assert_eq!(snapshot.malfunction_logs.len(), SNAPSHOT_LOG_LIMIT as usize);
        assert_eq!(snapshot.malfunction_logs[0].description, "event 7");
    }

    #[tokio::test]
    async fn run_window_spans_start_to_end_position() {
        let repo = MemoryRepository::new();
        let t0 = Utc::now() - Duration::minutes(3);
        let mut start = NewLogEntry::new(Severity::Info, "motor extending", "running");
        start.recorded_at = t0;
        repo.insert_log(start).await.unwrap();
        let mut end = NewLogEntry::new(Severity::Info, "end position reached", "stopped");
        end.recorded_at = t0 + Duration::minutes(1);
        repo.insert_log(end).await.unwrap();

        let window = active_run_window(&repo).await.unwrap().unwrap();
        assert_eq!(window.0, t0);
        assert_eq!(window.1, Some(t0 + Duration::minutes(1)));
    }

    #[tokio::test]
    async fn open_run_window_has_no_end() {
        let repo = MemoryRepository::new();
        repo.insert_log(NewLogEntry::new(Severity::Info, "motor retracting", "running"))
            .await
            .unwrap();
        let window = active_run_window(&repo).await.unwrap().unwrap();
        assert!(window.1.is_none());
    }
}
