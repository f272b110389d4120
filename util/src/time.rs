//! General time utility functions

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Convert a period in seconds into whole milliseconds for a delay provider.
///
/// Negative and non-finite periods give zero, periods too long for a `u32`
/// saturate.
pub fn secs_to_millis(period_s: f64) -> u32 {
    if !period_s.is_finite() || period_s <= 0.0 {
        return 0;
    }

    let ms = (period_s * 1000.0).round();
    if ms >= u32::MAX as f64 {
        u32::MAX
    } else {
        ms as u32
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_duration_to_seconds() {
        assert_eq!(
            duration_to_seconds(chrono::Duration::milliseconds(1500)),
            Some(1.5)
        );
    }

    #[test]
    fn test_secs_to_millis() {
        assert_eq!(secs_to_millis(0.05), 50);
        assert_eq!(secs_to_millis(0.1), 100);
        assert_eq!(secs_to_millis(1.5), 1500);
        assert_eq!(secs_to_millis(-1.0), 0);
        assert_eq!(secs_to_millis(f64::NAN), 0);
        assert_eq!(secs_to_millis(1e12), u32::MAX);
    }
}
