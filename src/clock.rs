// ABOUTME: Timestamp helpers shared by the registry and lock manager.
// ABOUTME: Converts std durations to chrono offsets and index scores.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// `ts + ttl`, saturating at the maximum representable time.
pub(crate) fn after(ts: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| ts.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `ts - window`, saturating at the minimum representable time.
pub(crate) fn before(ts: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|d| ts.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Sorted-index score for a timestamp (unix millis).
pub(crate) fn score(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_millis() as f64
}

/// Parse a TTL given in whole seconds by a caller.
pub(crate) fn ttl_from_secs(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|s| *s > 0).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_after_and_before_saturate() {
        let now = Utc::now();
        assert_eq!(after(now, Duration::from_secs(60)) - now, chrono::Duration::seconds(60));
        assert_eq!(after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(before(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_zero_ttl_means_default() {
        assert_eq!(ttl_from_secs(Some(0)), None);
        assert_eq!(ttl_from_secs(Some(5)), Some(Duration::from_secs(5)));
        assert_eq!(ttl_from_secs(None), None);
    }
}
