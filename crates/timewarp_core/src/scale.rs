//! Duration scaling helpers

use std::time::Duration;

/// Multiply `duration` by `factor`, rounded to the nearest nanosecond.
///
/// Saturates instead of panicking. Negative or NaN factors give zero.
pub fn scale_duration(duration: Duration, factor: f64) -> Duration {
    if factor == 1.0 {
        return duration;
    }

    let nanos = duration.as_nanos() as f64 * factor;
    if nanos.is_nan() || nanos <= 0.0 {
        return Duration::ZERO;
    }
    if nanos >= u64::MAX as f64 {
        return Duration::from_nanos(u64::MAX);
    }
    Duration::from_nanos(nanos.round() as u64)
}

/// Real delay for a requested delay at `rate`
pub fn delay_at_rate(requested: Duration, rate: f64) -> Duration {
    scale_duration(requested, 1.0 / rate)
}
