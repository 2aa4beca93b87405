use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};

/// Longest delay honoured as-is (~100 years). Anything longer is clamped so
/// `Instant + delay` can never overflow.
pub const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Current monotonic time. Wake times are always compared against this, never
/// against the wall clock.
pub fn now() -> Instant {
    Instant::now()
}

/// Absolute wake time for a job submitted now with `delay`.
pub fn deadline_after(delay: Duration) -> Instant {
    deadline_from(now(), delay)
}

/// Absolute wake time `delay` after `base`, with `delay` clamped to [`MAX_DELAY`].
pub fn deadline_from(base: Instant, delay: Duration) -> Instant {
    base + delay.min(MAX_DELAY)
}

/// Convert a signed millisecond count to a delay. Negative values mean
/// "as soon as possible" and become zero.
pub fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Local `HH:MM:SS.mmm` rendering of a wall-clock instant, for log lines.
pub fn format_wall_clock(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn deadline_is_base_plus_delay() {
        let base = Instant::now();
        let d = deadline_from(base, Duration::from_millis(250));
        assert_eq!(d - base, Duration::from_millis(250));
    }

    #[test]
    fn zero_delay_deadline_is_already_due() {
        let d = deadline_after(Duration::ZERO);
        assert!(d <= now());
    }

    #[test]
    fn huge_delay_is_clamped_instead_of_overflowing() {
        let base = Instant::now();
        let d = deadline_from(base, Duration::MAX);
        assert_eq!(d - base, MAX_DELAY);
    }

    #[test]
    fn negative_millis_become_zero() {
        assert_eq!(millis(-5), Duration::ZERO);
        assert_eq!(millis(0), Duration::ZERO);
        assert_eq!(millis(1500), Duration::from_millis(1500));
    }

    #[test]
    fn as_millis_saturates() {
        assert_eq!(as_millis(Duration::from_millis(42)), 42);
        assert_eq!(as_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn wall_clock_format_has_millisecond_precision() {
        let t = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let s = format_wall_clock(t);
        // HH:MM:SS.mmm. The hour depends on the local zone, the millis do not.
        assert_eq!(s.len(), 12);
        assert!(s.ends_with(".123"));
    }
}
