use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub server_host: String,
    pub server_port: u16,
    pub topics: Topics,
    /// Percentage difference between live and twin values that triggers a
    /// deviation warning.
    pub deviation_threshold_percent: f64,
    /// Maximum age in seconds before a sample counts as stale.
    pub freshness_threshold_secs: u64,
    /// Consecutive bad predictions before a warning escalates to an error.
    pub prediction_error_threshold: u32,
}

/// MQTT topic names for every inbound stream. Each is overridable via env so
/// deployments can match whatever the producers publish on.
#[derive(Debug, Clone)]
pub struct Topics {
    pub live: String,
    pub twin: String,
    pub malfunction_info: String,
    pub malfunction_warning: String,
    pub malfunction_error: String,
    pub raw_temperature: String,
    pub raw_current: String,
    pub raw_torque: String,
    pub feature_temperature: String,
    pub feature_current: String,
    pub feature_torque: String,
    pub prediction_temperature: String,
    pub prediction_current: String,
    pub prediction_torque: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            mqtt_host: optional("MQTT_BROKER_HOST", "localhost"),
            mqtt_port: optional("MQTT_BROKER_PORT", "1883")
                .parse()
                .context("MQTT_BROKER_PORT must be a valid port number")?,
            mqtt_client_id: optional("MQTT_CLIENT_ID", "motor-monitor"),
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            topics: Topics {
                live: optional("MQTT_TOPIC_LIVE", "iot/motor/live"),
                twin: optional("MQTT_TOPIC_TWIN", "iot/motor/twin"),
                malfunction_info: optional(
                    "MQTT_TOPIC_MALFUNCTION_INFO",
                    "iot/motor/malfunction/info",
                ),
                malfunction_warning: optional(
                    "MQTT_TOPIC_MALFUNCTION_WARNING",
                    "iot/motor/malfunction/warning",
                ),
                malfunction_error: optional(
                    "MQTT_TOPIC_MALFUNCTION_ERROR",
                    "iot/motor/malfunction/error",
                ),
                raw_temperature: optional("MQTT_TOPIC_RAW_TEMPERATURE", "raw/temperature"),
                raw_current: optional("MQTT_TOPIC_RAW_CURRENT", "raw/current"),
                raw_torque: optional("MQTT_TOPIC_RAW_TORQUE", "raw/torque"),
                feature_temperature: optional(
                    "MQTT_TOPIC_FEATURE_TEMPERATURE",
                    "feature/temperature",
                ),
                feature_current: optional("MQTT_TOPIC_FEATURE_CURRENT", "feature/current"),
                feature_torque: optional("MQTT_TOPIC_FEATURE_TORQUE", "feature/torque"),
                prediction_temperature: optional(
                    "MQTT_TOPIC_PREDICTION_TEMPERATURE",
                    "prediction/temperature",
                ),
                prediction_current: optional(
                    "MQTT_TOPIC_PREDICTION_CURRENT",
                    "prediction/current",
                ),
                prediction_torque: optional("MQTT_TOPIC_PREDICTION_TORQUE", "prediction/torque"),
            },
            deviation_threshold_percent: optional("DEVIATION_THRESHOLD_PERCENT", "10.0")
                .parse()
                .context("DEVIATION_THRESHOLD_PERCENT must be a number")?,
            freshness_threshold_secs: optional("DATA_FRESHNESS_THRESHOLD_SECS", "10")
                .parse()
                .context("DATA_FRESHNESS_THRESHOLD_SECS must be a positive integer")?,
            prediction_error_threshold: optional("PREDICTION_ERROR_THRESHOLD", "10")
                .parse()
                .context("PREDICTION_ERROR_THRESHOLD must be a positive integer")?,
        })
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
