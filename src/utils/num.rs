//! Saturating conversions used when turning durations and sizes into counters.

#[inline]
#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[inline]
#[must_use]
pub fn u128_to_u64_saturating(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

/// Millisecond count of a duration, clamped to `u64`.
#[inline]
#[must_use]
pub fn duration_ms(d: std::time::Duration) -> u64 {
    u128_to_u64_saturating(d.as_millis())
}

#[inline]
#[must_use]
pub fn f64_to_u64_saturating(v: f64) -> u64 {
    if !v.is_finite() || v <= 0.0 {
        0
    } else if v >= u64::MAX as f64 {
        u64::MAX
    } else {
        v as u64
    }
}
