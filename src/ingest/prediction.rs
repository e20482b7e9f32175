//! Escalation of repeated bad prediction signals into a fault.

use std::collections::HashMap;

use crate::db::models::{MetricKind, NewLogEntry, Severity};

use super::TransitionLog;

#[derive(Debug, Default, Clone, Copy)]
struct MetricPredictionState {
    consecutive_bad: u32,
    error_active: bool,
}

/// Per-metric counter of consecutive bad predictions with warning-to-error
/// escalation and one-shot recovery logging.
pub struct PredictionTracker {
    error_threshold: u32,
    states: HashMap<MetricKind, MetricPredictionState>,
}

impl PredictionTracker {
    pub fn new(error_threshold: u32) -> Self {
        Self {
            error_threshold,
            states: HashMap::new(),
        }
    }

    /// Feed one prediction status. A negative value is the degraded sentinel.
    /// Returns the transition log to persist, if the observation caused one.
    pub fn observe(&mut self, metric: MetricKind, status_value: f64) -> Option<TransitionLog> {
        let state = self.states.entry(metric).or_default();

        if status_value < 0.0 {
            if state.error_active {
                // Fault already reported; repeating it would only flood the log.
                return None;
            }
            state.consecutive_bad += 1;
            if state.consecutive_bad >= self.error_threshold {
                let count = state.consecutive_bad;
                state.error_active = true;
                state.consecutive_bad = 0;
                Some(TransitionLog {
                    entry: NewLogEntry::new(
                        Severity::Error,
                        format!(
                            "{} prediction reported {} consecutive bad readings",
                            metric.title(),
                            count
                        ),
                        "unknown",
                    ),
                    acknowledges: None,
                })
            } else {
                Some(TransitionLog {
                    entry: NewLogEntry::new(
                        Severity::Warning,
                        format!(
                            "{} prediction anomaly ({}/{} before fault escalation)",
                            metric.title(),
                            state.consecutive_bad,
                            self.error_threshold
                        ),
                        "unknown",
                    ),
                    acknowledges: None,
                })
            }
        } else if state.consecutive_bad > 0 || state.error_active {
            state.consecutive_bad = 0;
            state.error_active = false;
            Some(TransitionLog {
                entry: NewLogEntry::new(
                    Severity::Info,
                    format!("{} prediction anomaly resolved; prediction normal", metric.title()),
                    "normal",
                ),
                acknowledges: Some(format!("{} prediction", metric.title())),
            })
        } else {
            None
        }
    }

    /// True while any metric has a latched error or an accumulating streak.
    pub fn any_active(&self) -> bool {
        self.states
            .values()
            .any(|s| s.error_active || s.consecutive_bad > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_to_error_on_the_tenth_bad_prediction() {
        let mut tracker = PredictionTracker::new(10);
        let mut warnings = 0;
        let mut errors = 0;
        for _ in 0..10 {
            match tracker.observe(MetricKind::Current, -1.0) {
                Some(t) if t.entry.severity == Severity::Warning => warnings += 1,
                Some(t) if t.entry.severity == Severity::Error => errors += 1,
                _ => {}
            }
        }
        assert_eq!(warnings, 9);
        assert_eq!(errors, 1);
        assert!(tracker.any_active());
    }

    #[test]
    fn stays_quiet_while_error_is_active() {
        let mut tracker = PredictionTracker::new(10);
        for _ in 0..10 {
            tracker.observe(MetricKind::Current, -1.0);
        }
        for _ in 0..5 {
            assert!(tracker.observe(MetricKind::Current, -1.0).is_none());
        }
    }

    #[test]
    fn good_prediction_resets_and_logs_once() {
        let mut tracker = PredictionTracker::new(10);
        for _ in 0..10 {
            tracker.observe(MetricKind::Current, -1.0);
        }
        let resolved = tracker.observe(MetricKind::Current, 1.0).unwrap();
        assert_eq!(resolved.entry.severity, Severity::Info);
        assert!(resolved.acknowledges.is_some());
        assert!(!tracker.any_active());

        // Already clean: no further log.
        assert!(tracker.observe(MetricKind::Current, 1.0).is_none());

        // A fresh streak escalates again from zero.
        let first = tracker.observe(MetricKind::Current, -1.0).unwrap();
        assert_eq!(first.entry.severity, Severity::Warning);
        assert!(first.entry.description.contains("1/10"));
    }

    #[test]
    fn partial_streak_resolves_with_info() {
        let mut tracker = PredictionTracker::new(10);
        for _ in 0..3 {
            tracker.observe(MetricKind::Torque, -1.0);
        }
        assert!(tracker.any_active());
        let resolved = tracker.observe(MetricKind::Torque, 1.0).unwrap();
        assert_eq!(resolved.entry.severity, Severity::Info);
        assert!(!tracker.any_active());
    }

    #[test]
    fn metrics_are_tracked_independently() {
        let mut tracker = PredictionTracker::new(10);
        tracker.observe(MetricKind::Current, -1.0);
        assert!(tracker.observe(MetricKind::Torque, 1.0).is_none());
        assert!(tracker.any_active());
    }
}
