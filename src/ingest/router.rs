//! Per-message dispatch: decode, persist, run detectors, publish updates.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use tracing::{debug, error, info};

use crate::db::models::{NewFeatureSample, NewLogEntry, NewPredictionSample, NewRawSample};
use crate::repo::Repository;
use crate::ws::Broadcaster;

use super::aggregate::{build_snapshot, composite_status};
use super::deviation::DeviationDetector;
use super::messages::{
    parse_timestamp, FeatureMessage, MalfunctionMessage, MotorChannelsMessage, PredictionMessage,
    RawMessage, Route, TopicMap,
};
use super::prediction::PredictionTracker;
use super::TransitionLog;

/// Owns the topic table and all detector state. Exactly one router exists,
/// driven sequentially by the MQTT event loop.
pub struct IngestionRouter {
    repo: Arc<dyn Repository>,
    broadcaster: Broadcaster,
    topics: TopicMap,
    deviation: DeviationDetector,
    prediction: PredictionTracker,
    freshness_threshold: Duration,
}

impl IngestionRouter {
    pub fn new(
        repo: Arc<dyn Repository>,
        broadcaster: Broadcaster,
        topics: TopicMap,
        deviation_threshold_percent: f64,
        prediction_error_threshold: u32,
        freshness_threshold: Duration,
    ) -> Self {
        Self {
            repo,
            broadcaster,
            topics,
            deviation: DeviationDetector::new(deviation_threshold_percent),
            prediction: PredictionTracker::new(prediction_error_threshold),
            freshness_threshold,
        }
    }

    /// Handle one inbound publish. A bad payload is logged and dropped; it
    /// must never take the consumer loop down.
    pub async fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        let Some(route) = self.topics.route(topic) else {
            debug!(topic, "Ignoring message on unmapped topic");
            return;
        };
        if let Err(e) = self.dispatch(route, payload).await {
            error!(topic, error = %e, "Failed to process message");
            return;
        }
        if let Err(e) = self.broadcast_update().await {
            error!(error = %e, "Failed to broadcast dashboard update");
        }
    }

    async fn dispatch(&mut self, route: Route, payload: &[u8]) -> Result<()> {
        match route {
            Route::Live => {
                let msg: MotorChannelsMessage =
                    serde_json::from_slice(payload).context("decoding live payload")?;
                let sample = self.repo.insert_live(msg.into_new_sample()).await?;
                if let Some(twin) = self.repo.latest_twin().await? {
                    let transitions = self.deviation.evaluate(&sample, &twin);
                    self.apply_transitions(transitions).await?;
                }
                self.broadcaster.publish_point();
            }
            Route::Twin => {
                let msg: MotorChannelsMessage =
                    serde_json::from_slice(payload).context("decoding twin payload")?;
                let sample = self.repo.insert_twin(msg.into_new_sample()).await?;
                if let Some(live) = self.repo.latest_live().await? {
                    let transitions = self.deviation.evaluate(&live, &sample);
                    self.apply_transitions(transitions).await?;
                }
                self.broadcaster.publish_point();
            }
            Route::Malfunction(severity) => {
                let msg: MalfunctionMessage =
                    serde_json::from_slice(payload).context("decoding malfunction payload")?;
                let entry = NewLogEntry {
                    recorded_at: parse_timestamp(msg.timestamp.as_deref()),
                    severity,
                    description: msg.description,
                    motor_state: msg.motor_state.unwrap_or_else(|| "unknown".to_owned()),
                    emergency_stop_active: msg.emergency_stop_active.unwrap_or(false),
                };
                info!(severity = %severity, description = %entry.description, "Malfunction event");
                self.repo.insert_log(entry).await?;
            }
            Route::Raw(metric) => {
                let msg: RawMessage =
                    serde_json::from_slice(payload).context("decoding raw payload")?;
                self.repo
                    .insert_raw(NewRawSample {
                        recorded_at: parse_timestamp(msg.timestamp.as_deref()),
                        metric,
                        value: msg.value,
                    })
                    .await?;
            }
            Route::Feature(metric) => {
                let msg: FeatureMessage =
                    serde_json::from_slice(payload).context("decoding feature payload")?;
                self.repo
                    .insert_feature(NewFeatureSample {
                        recorded_at: parse_timestamp(msg.timestamp.as_deref()),
                        metric,
                        mean: msg.mean,
                        min: msg.min,
                        max: msg.max,
                        median: msg.median,
                        std_dev: msg.std_dev,
                        range: msg.range,
                    })
                    .await?;
            }
            Route::Prediction(metric) => {
                let msg: PredictionMessage =
                    serde_json::from_slice(payload).context("decoding prediction payload")?;
                self.repo
                    .insert_prediction(NewPredictionSample {
                        recorded_at: parse_timestamp(msg.timestamp.as_deref()),
                        metric,
                        status_value: msg.value,
                    })
                    .await?;
                if let Some(transition) = self.prediction.observe(metric, msg.value) {
                    self.apply_transitions(vec![transition]).await?;
                }
            }
        }
        Ok(())
    }

    /// Persist detector transitions. A resolution acknowledges the incident
    /// entries it closes out before its own INFO entry lands.
    async fn apply_transitions(&self, transitions: Vec<TransitionLog>) -> Result<()> {
        for transition in transitions {
            if let Some(pattern) = &transition.acknowledges {
                let n = self.repo.acknowledge_logs_matching(pattern).await?;
                debug!(pattern, acknowledged = n, "Auto-acknowledged resolved entries");
            }
            info!(
                severity = %transition.entry.severity,
                description = %transition.entry.description,
                "Detector transition"
            );
            self.repo.insert_log(transition.entry).await?;
        }
        Ok(())
    }

    async fn broadcast_update(&self) -> Result<()> {
        let status = composite_status(
            self.repo.as_ref(),
            self.freshness_threshold,
            &self.deviation,
            &self.prediction,
        )
        .await?;
        let snapshot = build_snapshot(self.repo.as_ref(), status).await?;
        self.broadcaster.publish_snapshot(snapshot).await;
        Ok(())
    }
}
