/// Timeline ticks per second. All engine times are integer microseconds.
pub const TICKS_PER_SECOND: i64 = 1_000_000;

/// Converts seconds to ticks with nearest rounding; non-finite input maps to `0`.
///
/// # Example
/// ```
/// use engine::seconds_to_ticks;
///
/// assert_eq!(seconds_to_ticks(1.5), 1_500_000);
/// assert_eq!(seconds_to_ticks(f64::NAN), 0);
/// ```
pub fn seconds_to_ticks(seconds: f64) -> i64 {
    if !seconds.is_finite() {
        return 0;
    }
    let ticks = (seconds * TICKS_PER_SECOND as f64).round();
    ticks.clamp(i64::MIN as f64, i64::MAX as f64) as i64
}

/// Converts ticks to seconds.
pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / TICKS_PER_SECOND as f64
}

/// Formats ticks as `mm:ss`, or `h:mm:ss` past one hour. Negative input shows `00:00`.
///
/// # Example
/// ```
/// use engine::format_clock;
///
/// assert_eq!(format_clock(75_400_000), "01:15");
/// assert_eq!(format_clock(3_725_000_000), "1:02:05");
/// ```
pub fn format_clock(ticks: i64) -> String {
    let total = ticks.max(0) / TICKS_PER_SECOND;
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::{format_clock, seconds_to_ticks, ticks_to_seconds};

    #[test]
    fn round_trips_whole_milliseconds() {
        assert_eq!(ticks_to_seconds(seconds_to_ticks(12.345)), 12.345);
    }

    #[test]
    fn clock_truncates_partial_seconds() {
        assert_eq!(format_clock(9_999_999), "00:09");
        assert_eq!(format_clock(-5), "00:00");
    }
}
