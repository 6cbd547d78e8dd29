//! Q16 fixed-point calibration arithmetic.
//!
//! The scale factor is stored as mg-per-count multiplied by 65536 and rounded
//! (`i32`). Scaling uses a 64-bit intermediate multiply followed by an
//! arithmetic right shift; this is bit-exact across platforms and must not be
//! replaced with floating point, since rounding differences would shift
//! calibration results at the margin.

/// Scale raw counts to milligrams with a Q16 factor.
///
/// 64-bit intermediate, arithmetic shift right by 16. The shift floors toward
/// negative infinity for negative products; deterministic either way.
#[inline]
pub fn counts_to_mg_q16(counts: i32, factor_q16: i32) -> i32 {
    ((i64::from(counts) * i64::from(factor_q16)) >> 16) as i32
}

/// Two-point span factor: `round((span_mass_mg << 16) / |dcounts|)`.
///
/// A zero denominator is substituted with 1 rather than rejected; the caller
/// treats a non-positive result as degenerate and falls back to its default
/// factor, so the state machine never halts on bad calibration input.
#[inline]
pub fn span_factor_q16(span_mass_mg: i32, dcounts: i32) -> i32 {
    let den = i64::from(dcounts).abs().max(1);
    let num = i64::from(span_mass_mg) << 16;
    let q = if num >= 0 {
        (num + den / 2) / den
    } else {
        (num - den / 2) / den
    };
    q.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Median of three raw samples.
#[inline]
pub fn med3(a: i32, b: i32, c: i32) -> i32 {
    let (a, b) = if a > b { (b, a) } else { (a, b) };
    let b = if b > c { c } else { b };
    if a > b { a } else { b }
}
