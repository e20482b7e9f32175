//! PostgreSQL-backed [`Repository`] implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::Repository;
use crate::db::models::{
    FeatureMetricSample, LiveSample, MalfunctionLogEntry, MetricKind, MotorInfo, NewFeatureSample,
    NewLogEntry, NewMotorSample, NewPredictionSample, NewRawSample, PredictionSample,
    RawMetricSample, ReferenceRun, TwinSample,
};

/// Column list shared by `live_samples` and `twin_samples` queries.
const SAMPLE_COLUMNS: &str =
    "id, recorded_at, current, voltage, rpm, vibration, temperature, torque, run_time";

const LOG_COLUMNS: &str =
    "id, recorded_at, severity, description, motor_state, emergency_stop_active, acknowledged";

const RAW_COLUMNS: &str = "id, recorded_at, metric, value";

const FEATURE_COLUMNS: &str = "id, recorded_at, metric, mean, min, max, median, std_dev, range";

const PREDICTION_COLUMNS: &str = "id, recorded_at, metric, status_value";

const REFERENCE_RUN_COLUMNS: &str =
    "id, name, recorded_at, is_valid, current, voltage, rpm, vibration, temperature, torque, run_time";

const MOTOR_INFO_COLUMNS: &str =
    "id, name, model, description, serial, location, commissioning_date, cycles, operating_mode";

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_motor_sample<T>(&self, table: &str, sample: NewMotorSample) -> Result<T>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let query = format!(
            "INSERT INTO {table} \
                (recorded_at, current, voltage, rpm, vibration, temperature, torque, run_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {SAMPLE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, T>(&query)
            .bind(sample.recorded_at)
            .bind(sample.current)
            .bind(sample.voltage)
            .bind(sample.rpm)
            .bind(sample.vibration)
            .bind(sample.temperature)
            .bind(sample.torque)
            .bind(sample.run_time)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn insert_live(&self, sample: NewMotorSample) -> Result<LiveSample> {
        self.insert_motor_sample("live_samples", sample).await
    }

    async fn insert_twin(&self, sample: NewMotorSample) -> Result<TwinSample> {
        self.insert_motor_sample("twin_samples", sample).await
    }

    async fn insert_raw(&self, sample: NewRawSample) -> Result<RawMetricSample> {
        let query = format!(
            "INSERT INTO raw_metric_samples (recorded_at, metric, value) \
             VALUES ($1, $2, $3) RETURNING {RAW_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RawMetricSample>(&query)
            .bind(sample.recorded_at)
            .bind(sample.metric)
            .bind(sample.value)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_feature(&self, sample: NewFeatureSample) -> Result<FeatureMetricSample> {
        let query = format!(
            "INSERT INTO feature_metric_samples \
                (recorded_at, metric, mean, min, max, median, std_dev, range) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {FEATURE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, FeatureMetricSample>(&query)
            .bind(sample.recorded_at)
            .bind(sample.metric)
            .bind(sample.mean)
            .bind(sample.min)
            .bind(sample.max)
            .bind(sample.median)
            .bind(sample.std_dev)
            .bind(sample.range)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_prediction(&self, sample: NewPredictionSample) -> Result<PredictionSample> {
        let query = format!(
            "INSERT INTO prediction_samples (recorded_at, metric, status_value) \
             VALUES ($1, $2, $3) RETURNING {PREDICTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PredictionSample>(&query)
            .bind(sample.recorded_at)
            .bind(sample.metric)
            .bind(sample.status_value)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_log(&self, entry: NewLogEntry) -> Result<MalfunctionLogEntry> {
        let query = format!(
            "INSERT INTO malfunction_logs \
                (recorded_at, severity, description, motor_state, emergency_stop_active) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {LOG_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MalfunctionLogEntry>(&query)
            .bind(entry.recorded_at)
            .bind(entry.severity)
            .bind(entry.description)
            .bind(entry.motor_state)
            .bind(entry.emergency_stop_active)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn latest_live(&self) -> Result<Option<LiveSample>> {
        let query = format!(
            "SELECT {SAMPLE_COLUMNS} FROM live_samples ORDER BY recorded_at DESC, seq DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, LiveSample>(&query)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn latest_twin(&self) -> Result<Option<TwinSample>> {
        let query = format!(
            "SELECT {SAMPLE_COLUMNS} FROM twin_samples ORDER BY recorded_at DESC, seq DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, TwinSample>(&query)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn latest_raw(&self, metric: MetricKind) -> Result<Option<RawMetricSample>> {
        let query = format!(
            "SELECT {RAW_COLUMNS} FROM raw_metric_samples WHERE metric = $1 \
             ORDER BY recorded_at DESC, seq DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, RawMetricSample>(&query)
            .bind(metric)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn latest_feature(&self, metric: MetricKind) -> Result<Option<FeatureMetricSample>> {
        let query = format!(
            "SELECT {FEATURE_COLUMNS} FROM feature_metric_samples WHERE metric = $1 \
             ORDER BY recorded_at DESC, seq DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, FeatureMetricSample>(&query)
            .bind(metric)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn latest_prediction(&self, metric: MetricKind) -> Result<Option<PredictionSample>> {
        let query = format!(
            "SELECT {PREDICTION_COLUMNS} FROM prediction_samples WHERE metric = $1 \
             ORDER BY recorded_at DESC, seq DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, PredictionSample>(&query)
            .bind(metric)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn live_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LiveSample>> {
        let query = format!(
            "SELECT {SAMPLE_COLUMNS} FROM live_samples \
             WHERE recorded_at >= $1 AND recorded_at <= $2 ORDER BY recorded_at, seq"
        );
        Ok(sqlx::query_as::<_, LiveSample>(&query)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn twin_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TwinSample>> {
        let query = format!(
            "SELECT {SAMPLE_COLUMNS} FROM twin_samples \
             WHERE recorded_at >= $1 AND recorded_at <= $2 ORDER BY recorded_at, seq"
        );
        Ok(sqlx::query_as::<_, TwinSample>(&query)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn recent_unacknowledged_logs(&self, limit: i64) -> Result<Vec<MalfunctionLogEntry>> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM malfunction_logs WHERE acknowledged = FALSE \
             ORDER BY recorded_at DESC, seq DESC LIMIT $1"
        );
        Ok(sqlx::query_as::<_, MalfunctionLogEntry>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn unacknowledged_logs_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MalfunctionLogEntry>> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM malfunction_logs \
             WHERE acknowledged = FALSE AND recorded_at >= $1 \
             ORDER BY recorded_at DESC, seq DESC"
        );
        Ok(sqlx::query_as::<_, MalfunctionLogEntry>(&query)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn acknowledge_log(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE malfunction_logs SET acknowledged = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn acknowledge_logs_matching(&self, pattern: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE malfunction_logs SET acknowledged = TRUE \
             WHERE acknowledged = FALSE AND description ILIKE $1",
        )
        .bind(format!("%{pattern}%"))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_log(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM malfunction_logs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn latest_info_log_matching(
        &self,
        patterns: &[&str],
    ) -> Result<Option<MalfunctionLogEntry>> {
        if patterns.is_empty() {
            return Ok(None);
        }
        let conditions: Vec<String> = (1..=patterns.len())
            .map(|i| format!("description ILIKE ${i}"))
            .collect();
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM malfunction_logs \
             WHERE severity = 'INFO' AND ({}) \
             ORDER BY recorded_at DESC, seq DESC LIMIT 1",
            conditions.join(" OR ")
        );
        let mut q = sqlx::query_as::<_, MalfunctionLogEntry>(&query);
        for pattern in patterns {
            q = q.bind(format!("%{pattern}%"));
        }
        Ok(q.fetch_optional(&self.pool).await?)
    }

    async fn first_info_log_matching_after(
        &self,
        pattern: &str,
        after: DateTime<Utc>,
    ) -> Result<Option<MalfunctionLogEntry>> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM malfunction_logs \
             WHERE severity = 'INFO' AND description ILIKE $1 AND recorded_at >= $2 \
             ORDER BY recorded_at, seq LIMIT 1"
        );
        Ok(sqlx::query_as::<_, MalfunctionLogEntry>(&query)
            .bind(format!("%{pattern}%"))
            .bind(after)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn motor_info(&self) -> Result<Option<MotorInfo>> {
        let query = format!("SELECT {MOTOR_INFO_COLUMNS} FROM motor_info LIMIT 1");
        Ok(sqlx::query_as::<_, MotorInfo>(&query)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn latest_valid_reference_run(&self) -> Result<Option<ReferenceRun>> {
        let query = format!(
            "SELECT {REFERENCE_RUN_COLUMNS} FROM reference_runs WHERE is_valid = TRUE \
             ORDER BY recorded_at DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, ReferenceRun>(&query)
            .fetch_optional(&self.pool)
            .await?)
    }
}
