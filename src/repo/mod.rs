pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::{
    FeatureMetricSample, LiveSample, MalfunctionLogEntry, MetricKind, MotorInfo, NewFeatureSample,
    NewLogEntry, NewMotorSample, NewPredictionSample, NewRawSample, PredictionSample,
    RawMetricSample, ReferenceRun, TwinSample,
};

/// Abstract persistence for time-series records and the event log.
///
/// [`postgres::PgRepository`] is the production implementation;
/// [`memory::MemoryRepository`] backs tests and broker-only local runs.
/// "Latest" always means highest timestamp, ties broken by insertion order.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn insert_live(&self, sample: NewMotorSample) -> Result<LiveSample>;
    async fn insert_twin(&self, sample: NewMotorSample) -> Result<TwinSample>;
    async fn insert_raw(&self, sample: NewRawSample) -> Result<RawMetricSample>;
    async fn insert_feature(&self, sample: NewFeatureSample) -> Result<FeatureMetricSample>;
    async fn insert_prediction(&self, sample: NewPredictionSample) -> Result<PredictionSample>;
    async fn insert_log(&self, entry: NewLogEntry) -> Result<MalfunctionLogEntry>;

    async fn latest_live(&self) -> Result<Option<LiveSample>>;
    async fn latest_twin(&self) -> Result<Option<TwinSample>>;
    async fn latest_raw(&self, metric: MetricKind) -> Result<Option<RawMetricSample>>;
    async fn latest_feature(&self, metric: MetricKind) -> Result<Option<FeatureMetricSample>>;
    async fn latest_prediction(&self, metric: MetricKind) -> Result<Option<PredictionSample>>;

    /// Live samples within `[start, end]`, oldest first.
    async fn live_range(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> Result<Vec<LiveSample>>;
    /// Twin samples within `[start, end]`, oldest first.
    async fn twin_range(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> Result<Vec<TwinSample>>;

    /// The most recent unacknowledged log entries, newest first.
    async fn recent_unacknowledged_logs(&self, limit: i64) -> Result<Vec<MalfunctionLogEntry>>;
    /// Unacknowledged entries recorded at or after `cutoff`, newest first.
    async fn unacknowledged_logs_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MalfunctionLogEntry>>;
    /// Flip `acknowledged` to true. Returns false if the entry does not exist.
    async fn acknowledge_log(&self, id: Uuid) -> Result<bool>;
    /// Acknowledge every unacknowledged entry whose description contains
    /// `pattern` (case-insensitive). Returns the number of entries updated.
    async fn acknowledge_logs_matching(&self, pattern: &str) -> Result<u64>;
    /// Remove an entry permanently. Returns false if it does not exist.
    async fn delete_log(&self, id: Uuid) -> Result<bool>;

    /// Newest INFO entry whose description contains any of `patterns`
    /// (case-insensitive).
    async fn latest_info_log_matching(
        &self,
        patterns: &[&str],
    ) -> Result<Option<MalfunctionLogEntry>>;
    /// Oldest INFO entry containing `pattern` recorded at or after `after`.
    async fn first_info_log_matching_after(
        &self,
        pattern: &str,
        after: DateTime<Utc>,
    ) -> Result<Option<MalfunctionLogEntry>>;

    async fn motor_info(&self) -> Result<Option<MotorInfo>>;
    async fn latest_valid_reference_run(&self) -> Result<Option<ReferenceRun>>;
}
