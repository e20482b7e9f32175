//! Staleness classification for timestamped records.

use chrono::{DateTime, Duration, Utc};

/// True iff the record exists and is younger than `threshold`.
///
/// The boundary is exclusive: a sample exactly `threshold` old is stale.
/// Absent records are always stale.
pub fn is_fresh(recorded_at: Option<DateTime<Utc>>, threshold: Duration) -> bool {
    is_fresh_at(recorded_at, Utc::now(), threshold)
}

pub(crate) fn is_fresh_at(
    recorded_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> bool {
    match recorded_at {
        Some(ts) => now.signed_duration_since(ts) < threshold,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_record_is_stale() {
        assert!(!is_fresh(None, Duration::seconds(10)));
    }

    #[test]
    fn sample_just_inside_threshold_is_fresh() {
        let now = Utc::now();
        let ts = now - Duration::seconds(9);
        assert!(is_fresh_at(Some(ts), now, Duration::seconds(10)));
    }

    #[test]
    fn sample_just_outside_threshold_is_stale() {
        let now = Utc::now();
        let ts = now - Duration::seconds(11);
        assert!(!is_fresh_at(Some(ts), now, Duration::seconds(10)));
    }

    #[test]
    fn sample_exactly_at_threshold_is_stale() {
        let now = Utc::now();
        let ts = now - Duration::seconds(10);
        assert!(!is_fresh_at(Some(ts), now, Duration::seconds(10)));
    }
}
