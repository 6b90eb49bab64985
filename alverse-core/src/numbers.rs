//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Floor a f64 and clamp it to the u32 range, returning 0 for non-finite values.
#[must_use]
pub fn floor_f64_to_u32(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    let max = cast::<u32, f64>(u32::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(0.0, max).floor();
    cast::<f64, u32>(clamped).unwrap_or(0)
}

/// Round a f64 and clamp it to the u32 range, returning 0 for NaN values.
///
/// Negative values clamp to zero; scores and counts are never negative.
#[must_use]
pub fn round_to_u32(value: f64) -> u32 {
    if value.is_nan() {
        return 0;
    }
    let max = cast::<u32, f64>(u32::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(0.0, max).round();
    cast::<f64, u32>(clamped).unwrap_or(0)
}

/// Convert a f64 into an integral u64 when it has no fractional part.
#[must_use]
pub fn integral_f64_to_u64(value: f64) -> Option<u64> {
    if !value.is_finite() || value.fract() != 0.0 || value < 0.0 {
        return None;
    }
    cast::<f64, u64>(value)
}

/// Widen a u32 to f64 in a single location.
#[must_use]
pub fn u32_to_f64(value: u32) -> f64 {
    f64::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_handles_non_finite_and_negatives() {
        assert_eq!(floor_f64_to_u32(f64::NAN), 0);
        assert_eq!(floor_f64_to_u32(f64::INFINITY), 0);
        assert_eq!(floor_f64_to_u32(-3.5), 0);
        assert_eq!(floor_f64_to_u32(2.5), 2);
    }

    #[test]
    fn rounding_clamps_to_u32() {
        assert_eq!(round_to_u32(12.6), 13);
        assert_eq!(round_to_u32(-5.0), 0);
        assert_eq!(round_to_u32(f64::NAN), 0);
        assert_eq!(round_to_u32(f64::from(u32::MAX) * 2.0), u32::MAX);
    }

    #[test]
    fn integral_conversion_rejects_fractions() {
        assert_eq!(integral_f64_to_u64(5.0), Some(5));
        assert_eq!(integral_f64_to_u64(5.5), None);
        assert_eq!(integral_f64_to_u64(-1.0), None);
    }
}
