//! Typed inbound payloads and the topic routing table.
//!
//! Every topic family gets its own payload struct instead of a free-form
//! JSON map; decoding rejects wrong types and defaults only where the wire
//! contract says a field is optional.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::config::Topics;
use crate::db::models::{MetricKind, NewMotorSample, Severity};

/// Where an inbound topic's payload is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Live,
    Twin,
    Malfunction(Severity),
    Raw(MetricKind),
    Feature(MetricKind),
    Prediction(MetricKind),
}

/// Maps configured topic names to routes. Built once at startup; unknown
/// topics simply miss the map.
pub struct TopicMap {
    routes: HashMap<String, Route>,
}

impl TopicMap {
    pub fn new(topics: &Topics) -> Self {
        let mut routes = HashMap::new();
        routes.insert(topics.live.clone(), Route::Live);
        routes.insert(topics.twin.clone(), Route::Twin);
        routes.insert(
            topics.malfunction_info.clone(),
            Route::Malfunction(Severity::Info),
        );
        routes.insert(
            topics.malfunction_warning.clone(),
            Route::Malfunction(Severity::Warning),
        );
        routes.insert(
            topics.malfunction_error.clone(),
            Route::Malfunction(Severity::Error),
        );
        routes.insert(
            topics.raw_temperature.clone(),
            Route::Raw(MetricKind::Temperature),
        );
        routes.insert(topics.raw_current.clone(), Route::Raw(MetricKind::Current));
        routes.insert(topics.raw_torque.clone(), Route::Raw(MetricKind::Torque));
        routes.insert(
            topics.feature_temperature.clone(),
            Route::Feature(MetricKind::Temperature),
        );
        routes.insert(
            topics.feature_current.clone(),
            Route::Feature(MetricKind::Current),
        );
        routes.insert(
            topics.feature_torque.clone(),
            Route::Feature(MetricKind::Torque),
        );
        routes.insert(
            topics.prediction_temperature.clone(),
            Route::Prediction(MetricKind::Temperature),
        );
        routes.insert(
            topics.prediction_current.clone(),
            Route::Prediction(MetricKind::Current),
        );
        routes.insert(
            topics.prediction_torque.clone(),
            Route::Prediction(MetricKind::Torque),
        );
        Self { routes }
    }

    pub fn route(&self, topic: &str) -> Option<Route> {
        self.routes.get(topic).copied()
    }

    /// All topic names, for subscription.
    pub fn topics(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }
}

/// Payload shared by the live and twin topics. Every channel is optional;
/// the wire name for temperature is `temp`.
#[derive(Debug, Clone, Deserialize)]
pub struct MotorChannelsMessage {
    pub timestamp: Option<String>,
    pub current: Option<f64>,
    pub voltage: Option<f64>,
    pub rpm: Option<f64>,
    pub vibration: Option<f64>,
    #[serde(rename = "temp")]
    pub temperature: Option<f64>,
    pub torque: Option<f64>,
    pub run_time: Option<f64>,
}

impl MotorChannelsMessage {
    pub fn into_new_sample(self) -> NewMotorSample {
        NewMotorSample {
            recorded_at: parse_timestamp(self.timestamp.as_deref()),
            current: self.current,
            voltage: self.voltage,
            rpm: self.rpm,
            vibration: self.vibration,
            temperature: self.temperature,
            torque: self.torque,
            run_time: self.run_time,
        }
    }
}

/// Payload of the three malfunction topics; severity comes from the topic,
/// not the payload.
#[derive(Debug, Clone, Deserialize)]
pub struct MalfunctionMessage {
    pub timestamp: Option<String>,
    pub description: String,
    pub motor_state: Option<String>,
    pub emergency_stop_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub timestamp: Option<String>,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureMessage {
    pub timestamp: Option<String>,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    #[serde(rename = "std")]
    pub std_dev: f64,
    pub range: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionMessage {
    pub timestamp: Option<String>,
    /// Signed health indicator: +1 nominal, -1 degraded.
    pub value: f64,
}

/// Parse an ISO-8601 timestamp string. Naive timestamps are taken as UTC;
/// zoned ones are converted to UTC.
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = raw.parse::<NaiveDateTime>() {
        return Some(Utc.from_utc_datetime(&naive));
    }
    None
}

/// Timestamp normalization for inbound payloads: absent or unparseable
/// timestamps fall back to the ingestion wall clock.
pub fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    match raw {
        Some(raw) => parse_timestamp_str(raw).unwrap_or_else(|| {
            warn!(timestamp = %raw, "Unparseable payload timestamp; using ingestion time");
            Utc::now()
        }),
        None => Utc::now(),
    }
}
