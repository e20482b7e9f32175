//! Live-versus-twin deviation detection with hysteresis.
//!
//! One two-state machine per compared channel: `normal` and `deviating`.
//! Log entries are emitted on transitions only, so a sustained deviation
//! produces a single warning instead of one per message.

use std::collections::HashMap;

use crate::db::models::{LiveSample, NewLogEntry, Severity, TwinSample};

use super::TransitionLog;

/// Channels compared between live and twin samples.
pub const COMPARED_METRICS: [&str; 6] = [
    "current",
    "voltage",
    "rpm",
    "vibration",
    "temperature",
    "torque",
];

fn title(metric: &str) -> &'static str {
    match metric {
        "current" => "Current",
        "voltage" => "Voltage",
        "rpm" => "RPM",
        "vibration" => "Vibration",
        "temperature" => "Temperature",
        "torque" => "Torque",
        _ => "Metric",
    }
}

fn channel_pairs(live: &LiveSample, twin: &TwinSample) -> [(&'static str, Option<f64>, Option<f64>); 6] {
    [
        ("current", live.current, twin.current),
        ("voltage", live.voltage, twin.voltage),
        ("rpm", live.rpm, twin.rpm),
        ("vibration", live.vibration, twin.vibration),
        ("temperature", live.temperature, twin.temperature),
        ("torque", live.torque, twin.torque),
    ]
}

pub struct DeviationDetector {
    threshold_percent: f64,
    deviating: HashMap<&'static str, bool>,
}

impl DeviationDetector {
    pub fn new(threshold_percent: f64) -> Self {
        let deviating = COMPARED_METRICS.iter().map(|m| (*m, false)).collect();
        Self {
            threshold_percent,
            deviating,
        }
    }

    /// Compare the latest live and twin samples and return the transition
    /// logs to persist. Channels missing on either side count as not
    /// deviating, so a previously deviating channel resolves when its value
    /// disappears.
    pub fn evaluate(&mut self, live: &LiveSample, twin: &TwinSample) -> Vec<TransitionLog> {
        let mut transitions = Vec::new();

        for (metric, live_value, twin_value) in channel_pairs(live, twin) {
            let deviating = match (live_value, twin_value) {
                (Some(r), Some(t)) if t != 0.0 => {
                    (r - t).abs() / t.abs() * 100.0 > self.threshold_percent
                }
                // Twin expects zero but the motor reads something: always
                // flagged, since a relative deviation is undefined.
                (Some(r), Some(_)) => r != 0.0,
                _ => false,
            };

            let was_deviating = self.deviating[metric];
            if deviating && !was_deviating {
                // Values are always present here: a channel can only become
                // deviating when both sides carry a reading.
                let (r, t) = (live_value.unwrap_or_default(), twin_value.unwrap_or_default());
                transitions.push(TransitionLog {
                    entry: NewLogEntry::new(
                        Severity::Warning,
                        format!(
                            "{} deviation above {:.1}% detected (live {:.2}, twin {:.2})",
                            title(metric),
                            self.threshold_percent,
                            r,
                            t
                        ),
                        "unknown",
                    ),
                    acknowledges: None,
                });
                self.deviating.insert(metric, true);
            } else if !deviating && was_deviating {
                transitions.push(TransitionLog {
                    entry: NewLogEntry::new(
                        Severity::Info,
                        format!("{} deviation resolved; motor running normally", title(metric)),
                        "normal",
                    ),
                    acknowledges: Some(format!("{} deviation above", title(metric))),
                });
                self.deviating.insert(metric, false);
            }
        }

        transitions
    }

    /// True while any channel is in the deviating state.
    pub fn any_deviating(&self) -> bool {
        self.deviating.values().any(|d| *d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn live(current: Option<f64>) -> LiveSample {
        LiveSample {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            current,
            voltage: None,
            rpm: None,
            vibration: None,
            temperature: None,
            torque: None,
            run_time: None,
        }
    }

    fn twin(current: Option<f64>) -> TwinSample {
        TwinSample {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            current,
            voltage: None,
            rpm: None,
            vibration: None,
            temperature: None,
            torque: None,
            run_time: None,
        }
    }

    #[test]
    fn sustained_deviation_emits_exactly_one_warning() {
        let mut detector = DeviationDetector::new(10.0);
        let mut warnings = 0;
        for _ in 0..10 {
            // 15% over a 10% threshold, every cycle.
            let transitions = detector.evaluate(&live(Some(11.5)), &twin(Some(10.0)));
            warnings += transitions
                .iter()
                .filter(|t| t.entry.severity == Severity::Warning)
                .count();
        }
        assert_eq!(warnings, 1);
        assert!(detector.any_deviating());
    }

    #[test]
    fn recovery_emits_exactly_one_info() {
        let mut detector = DeviationDetector::new(10.0);
        detector.evaluate(&live(Some(20.0)), &twin(Some(10.0)));
        assert!(detector.any_deviating());

        let transitions = detector.evaluate(&live(Some(10.0)), &twin(Some(10.0)));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].entry.severity, Severity::Info);
        assert!(transitions[0]
            .acknowledges
            .as_deref()
            .unwrap()
            .contains("Current deviation"));
        assert!(!detector.any_deviating());

        // Staying normal stays quiet.
        let transitions = detector.evaluate(&live(Some(10.0)), &twin(Some(10.0)));
        assert!(transitions.is_empty());
    }

    #[test]
    fn deviation_within_threshold_is_normal() {
        let mut detector = DeviationDetector::new(10.0);
        let transitions = detector.evaluate(&live(Some(10.5)), &twin(Some(10.0)));
        assert!(transitions.is_empty());
        assert!(!detector.any_deviating());
    }

    #[test]
    fn zero_twin_with_nonzero_live_is_always_flagged() {
        let mut detector = DeviationDetector::new(10.0);
        let transitions = detector.evaluate(&live(Some(0.1)), &twin(Some(0.0)));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].entry.severity, Severity::Warning);
    }

    #[test]
    fn zero_twin_with_zero_live_is_normal() {
        let mut detector = DeviationDetector::new(10.0);
        let transitions = detector.evaluate(&live(Some(0.0)), &twin(Some(0.0)));
        assert!(transitions.is_empty());
    }

    #[test]
    fn missing_channel_resolves_a_prior_deviation() {
        let mut detector = DeviationDetector::new(10.0);
        detector.evaluate(&live(Some(20.0)), &twin(Some(10.0)));
        let transitions = detector.evaluate(&live(None), &twin(Some(10.0)));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].entry.severity, Severity::Info);
    }
}
