use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Severity of a malfunction log entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "severity", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric scoped by the raw/feature/prediction topic families.
///
/// Open but enumerable: adding a kind means a migration on the `metric_kind`
/// Postgres enum plus a variant here.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    sqlx::Type,
)]
#[sqlx(type_name = "metric_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Temperature,
    Current,
    Torque,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::Temperature,
        MetricKind::Current,
        MetricKind::Torque,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Temperature => "temperature",
            MetricKind::Current => "current",
            MetricKind::Torque => "torque",
        }
    }

    /// Capitalized form used in log descriptions.
    pub fn title(&self) -> &'static str {
        match self {
            MetricKind::Temperature => "Temperature",
            MetricKind::Current => "Current",
            MetricKind::Torque => "Torque",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A real-time sensor reading from the physical motor.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LiveSample {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    /// Amperes
    pub current: Option<f64>,
    /// Volts
    pub voltage: Option<f64>,
    pub rpm: Option<f64>,
    /// mm/s
    pub vibration: Option<f64>,
    /// Degrees Celsius
    pub temperature: Option<f64>,
    /// Newton-metres
    pub torque: Option<f64>,
    /// Hours
    pub run_time: Option<f64>,
}

/// The digital twin's expected reading; same shape as [`LiveSample`] but
/// independently timestamped.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TwinSample {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub current: Option<f64>,
    pub voltage: Option<f64>,
    pub rpm: Option<f64>,
    pub vibration: Option<f64>,
    pub temperature: Option<f64>,
    pub torque: Option<f64>,
    pub run_time: Option<f64>,
}

/// Input for inserting a live or twin sample (the two tables share a shape).
#[derive(Debug, Clone, Default)]
pub struct NewMotorSample {
    pub recorded_at: DateTime<Utc>,
    pub current: Option<f64>,
    pub voltage: Option<f64>,
    pub rpm: Option<f64>,
    pub vibration: Option<f64>,
    pub temperature: Option<f64>,
    pub torque: Option<f64>,
    pub run_time: Option<f64>,
}

/// A named snapshot of expected channel values, distinct from the
/// continuously updated twin stream.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReferenceRun {
    pub id: Uuid,
    pub name: String,
    pub recorded_at: DateTime<Utc>,
    pub is_valid: bool,
    pub current: Option<f64>,
    pub voltage: Option<f64>,
    pub rpm: Option<f64>,
    pub vibration: Option<f64>,
    pub temperature: Option<f64>,
    pub torque: Option<f64>,
    pub run_time: Option<f64>,
}

/// One raw producer tick for a single metric.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RawMetricSample {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub metric: MetricKind,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct NewRawSample {
    pub recorded_at: DateTime<Utc>,
    pub metric: MetricKind,
    pub value: f64,
}

/// Windowed statistics over raw samples for one metric.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FeatureMetricSample {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub metric: MetricKind,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub std_dev: f64,
    pub range: f64,
}

#[derive(Debug, Clone)]
pub struct NewFeatureSample {
    pub recorded_at: DateTime<Utc>,
    pub metric: MetricKind,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub std_dev: f64,
    pub range: f64,
}

/// Prediction model output: a signed health indicator
/// (+1 nominal, -1 degraded).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PredictionSample {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub metric: MetricKind,
    pub status_value: f64,
}

#[derive(Debug, Clone)]
pub struct NewPredictionSample {
    pub recorded_at: DateTime<Utc>,
    pub metric: MetricKind,
    pub status_value: f64,
}

/// Append-only event log entry. `acknowledged` is the only field that may
/// change after creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MalfunctionLogEntry {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub severity: Severity,
    pub description: String,
    pub motor_state: String,
    pub emergency_stop_active: bool,
    pub acknowledged: bool,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub recorded_at: DateTime<Utc>,
    pub severity: Severity,
    pub description: String,
    pub motor_state: String,
    pub emergency_stop_active: bool,
}

impl NewLogEntry {
    pub fn new(severity: Severity, description: impl Into<String>, motor_state: &str) -> Self {
        Self {
            recorded_at: Utc::now(),
            severity,
            description: description.into(),
            motor_state: motor_state.to_owned(),
            emergency_stop_active: false,
        }
    }
}

/// Static identity of the single monitored asset. Absence is a valid state
/// ("no asset configured") and must never be treated as an error.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MotorInfo {
    pub id: Uuid,
    pub name: String,
    pub model: String,
    pub description: String,
    pub serial: String,
    pub location: String,
    pub commissioning_date: Option<NaiveDate>,
    pub cycles: i32,
    pub operating_mode: String,
}
