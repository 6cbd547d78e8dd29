//! Wrapping-time and small integer helpers shared across the core.

/// Clamp `v` into `[lo, hi]`.
#[inline]
pub fn clamp_i32(v: i32, lo: i32, hi: i32) -> i32 {
    v.clamp(lo, hi)
}

/// Convert grams to milligrams, rounding to nearest (ties away from zero).
#[inline]
pub fn lround_mg(grams: f32) -> i32 {
    (grams * 1000.0).round() as i32
}

/// Elapsed milliseconds from `then` to `now` on a wrapping u32 clock.
#[inline]
pub fn elapsed_ms(now: u32, then: u32) -> u32 {
    now.wrapping_sub(then)
}

/// True once `duration_ms` has elapsed since `since` on a wrapping u32 clock.
///
/// Valid as long as the real elapsed time stays under half the u32 range
/// (~24.8 days), which every deadline in this system does.
#[inline]
pub fn due(now: u32, since: u32, duration_ms: u32) -> bool {
    now.wrapping_sub(since) >= duration_ms
}
