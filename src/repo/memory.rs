//! In-memory [`Repository`] for tests and broker-only local runs.
//!
//! Vectors keep insertion order, which doubles as the tie-breaker for
//! "latest" lookups when timestamps collide.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Repository;
use crate::db::models::{
    FeatureMetricSample, LiveSample, MalfunctionLogEntry, MetricKind, MotorInfo, NewFeatureSample,
    NewLogEntry, NewMotorSample, NewPredictionSample, NewRawSample, PredictionSample,
    RawMetricSample, ReferenceRun, Severity, TwinSample,
};

#[derive(Default)]
struct Inner {
    live: Vec<LiveSample>,
    twin: Vec<TwinSample>,
    raw: Vec<RawMetricSample>,
    feature: Vec<FeatureMetricSample>,
    prediction: Vec<PredictionSample>,
    logs: Vec<MalfunctionLogEntry>,
    reference_runs: Vec<ReferenceRun>,
    motor: Option<MotorInfo>,
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the singleton asset record (not part of the ingest path).
    pub async fn set_motor_info(&self, motor: MotorInfo) {
        self.inner.write().await.motor = Some(motor);
    }

    pub async fn add_reference_run(&self, run: ReferenceRun) {
        self.inner.write().await.reference_runs.push(run);
    }

    /// Every log entry in insertion order, acknowledged or not.
    pub async fn all_logs(&self) -> Vec<MalfunctionLogEntry> {
        self.inner.read().await.logs.clone()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert_live(&self, sample: NewMotorSample) -> Result<LiveSample> {
        let row = LiveSample {
            id: Uuid::new_v4(),
            recorded_at: sample.recorded_at,
            current: sample.current,
            voltage: sample.voltage,
            rpm: sample.rpm,
            vibration: sample.vibration,
            temperature: sample.temperature,
            torque: sample.torque,
            run_time: sample.run_time,
        };
        self.inner.write().await.live.push(row.clone());
        Ok(row)
    }

    async fn insert_twin(&self, sample: NewMotorSample) -> Result<TwinSample> {
        let row = TwinSample {
            id: Uuid::new_v4(),
            recorded_at: sample.recorded_at,
            current: sample.current,
            voltage: sample.voltage,
            rpm: sample.rpm,
            vibration: sample.vibration,
            temperature: sample.temperature,
            torque: sample.torque,
            run_time: sample.run_time,
        };
        self.inner.write().await.twin.push(row.clone());
        Ok(row)
    }

    async fn insert_raw(&self, sample: NewRawSample) -> Result<RawMetricSample> {
        let row = RawMetricSample {
            id: Uuid::new_v4(),
            recorded_at: sample.recorded_at,
            metric: sample.metric,
            value: sample.value,
        };
        self.inner.write().await.raw.push(row.clone());
        Ok(row)
    }

    async fn insert_feature(&self, sample: NewFeatureSample) -> Result<FeatureMetricSample> {
        let row = FeatureMetricSample {
            id: Uuid::new_v4(),
            recorded_at: sample.recorded_at,
            metric: sample.metric,
            mean: sample.mean,
            min: sample.min,
            max: sample.max,
            median: sample.median,
            std_dev: sample.std_dev,
            range: sample.range,
        };
        self.inner.write().await.feature.push(row.clone());
        Ok(row)
    }

    async fn insert_prediction(&self, sample: NewPredictionSample) -> Result<PredictionSample> {
        let row = PredictionSample {
            id: Uuid::new_v4(),
            recorded_at: sample.recorded_at,
            metric: sample.metric,
            status_value: sample.status_value,
        };
        self.inner.write().await.prediction.push(row.clone());
        Ok(row)
    }

    async fn insert_log(&self, entry: NewLogEntry) -> Result<MalfunctionLogEntry> {
        let row = MalfunctionLogEntry {
            id: Uuid::new_v4(),
            recorded_at: entry.recorded_at,
            severity: entry.severity,
            description: entry.description,
            motor_state: entry.motor_state,
            emergency_stop_active: entry.emergency_stop_active,
            acknowledged: false,
        };
        self.inner.write().await.logs.push(row.clone());
        Ok(row)
    }

    async fn latest_live(&self) -> Result<Option<LiveSample>> {
        // max_by_key returns the last maximal element: insertion order breaks ties.
        Ok(self
            .inner
            .read()
            .await
            .live
            .iter()
            .max_by_key(|s| s.recorded_at)
            .cloned())
    }

    async fn latest_twin(&self) -> Result<Option<TwinSample>> {
        Ok(self
            .inner
            .read()
            .await
            .twin
            .iter()
            .max_by_key(|s| s.recorded_at)
            .cloned())
    }

    async fn latest_raw(&self, metric: MetricKind) -> Result<Option<RawMetricSample>> {
        Ok(self
            .inner
            .read()
            .await
            .raw
            .iter()
            .filter(|s| s.metric == metric)
            .max_by_key(|s| s.recorded_at)
            .cloned())
    }

    async fn latest_feature(&self, metric: MetricKind) -> Result<Option<FeatureMetricSample>> {
        Ok(self
            .inner
            .read()
            .await
            .feature
            .iter()
            .filter(|s| s.metric == metric)
            .max_by_key(|s| s.recorded_at)
            .cloned())
    }

    async fn latest_prediction(&self, metric: MetricKind) -> Result<Option<PredictionSample>> {
        Ok(self
            .inner
            .read()
            .await
            .prediction
            .iter()
            .filter(|s| s.metric == metric)
            .max_by_key(|s| s.recorded_at)
            .cloned())
    }

    async fn live_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LiveSample>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<LiveSample> = inner
            .live
            .iter()
            .filter(|s| s.recorded_at >= start && s.recorded_at <= end)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.recorded_at);
        Ok(rows)
    }

    async fn twin_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TwinSample>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<TwinSample> = inner
            .twin
            .iter()
            .filter(|s| s.recorded_at >= start && s.recorded_at <= end)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.recorded_at);
        Ok(rows)
    }

    async fn recent_unacknowledged_logs(&self, limit: i64) -> Result<Vec<MalfunctionLogEntry>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<MalfunctionLogEntry> = inner
            .logs
            .iter()
            .filter(|l| !l.acknowledged)
            .cloned()
            .collect();
        rows.reverse();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn unacknowledged_logs_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MalfunctionLogEntry>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<MalfunctionLogEntry> = inner
            .logs
            .iter()
            .filter(|l| !l.acknowledged && l.recorded_at >= cutoff)
            .cloned()
            .collect();
        rows.reverse();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(rows)
    }

    async fn acknowledge_log(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.logs.iter_mut().find(|l| l.id == id) {
            Some(log) => {
                log.acknowledged = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn acknowledge_logs_matching(&self, pattern: &str) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for log in inner
            .logs
            .iter_mut()
            .filter(|l| !l.acknowledged && contains_ci(&l.description, pattern))
        {
            log.acknowledged = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete_log(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.logs.len();
        inner.logs.retain(|l| l.id != id);
        Ok(inner.logs.len() < before)
    }

    async fn latest_info_log_matching(
        &self,
        patterns: &[&str],
    ) -> Result<Option<MalfunctionLogEntry>> {
        Ok(self
            .inner
            .read()
            .await
            .logs
            .iter()
            .filter(|l| {
                l.severity == Severity::Info
                    && patterns.iter().any(|p| contains_ci(&l.description, p))
            })
            .max_by_key(|l| l.recorded_at)
            .cloned())
    }

    async fn first_info_log_matching_after(
        &self,
        pattern: &str,
        after: DateTime<Utc>,
    ) -> Result<Option<MalfunctionLogEntry>> {
        Ok(self
            .inner
            .read()
            .await
            .logs
            .iter()
            .filter(|l| {
                l.severity == Severity::Info
                    && l.recorded_at >= after
                    && contains_ci(&l.description, pattern)
            })
            .min_by_key(|l| l.recorded_at)
            .cloned())
    }

    async fn motor_info(&self) -> Result<Option<MotorInfo>> {
        Ok(self.inner.read().await.motor.clone())
    }

    async fn latest_valid_reference_run(&self) -> Result<Option<ReferenceRun>> {
        Ok(self
            .inner
            .read()
            .await
            .reference_runs
            .iter()
            .filter(|r| r.is_valid)
            .max_by_key(|r| r.recorded_at)
            .cloned())
    }
}
