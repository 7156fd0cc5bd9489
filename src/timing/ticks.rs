//! Tick and unit conversions shared by the timing and display code

use std::time::Duration;

/// Convert a microsecond count to a `Duration`
///
/// Negative or non-finite inputs clamp to zero.
pub fn us_to_duration(us: f64) -> Duration {
    if !us.is_finite() || us <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((us * 1_000.0).round() as u64)
}

/// Convert a `Duration` to fractional milliseconds
pub fn duration_to_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

/// Convert a `Duration` to fractional microseconds
pub fn duration_to_us(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000.0
}
