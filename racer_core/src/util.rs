//! Small numeric helpers shared across racer_core.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Clamp a ratio to [0, 1]. Non-finite inputs (NaN/±Inf) map to 0.
#[inline]
pub fn clamp_unit(x: f32) -> f32 {
    if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 }
}

/// Clamp a signed ratio to [-1, 1]. Non-finite inputs map to 0.
#[inline]
pub fn clamp_signed_unit(x: f32) -> f32 {
    if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::{clamp_signed_unit, clamp_unit};

    #[test]
    fn unit_clamp_bounds_and_nan() {
        assert_eq!(clamp_unit(0.5), 0.5);
        assert_eq!(clamp_unit(-0.1), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(f32::NAN), 0.0);
        assert_eq!(clamp_unit(f32::INFINITY), 0.0);
    }

    #[test]
    fn signed_clamp_bounds_and_nan() {
        assert_eq!(clamp_signed_unit(-0.5), -0.5);
        assert_eq!(clamp_signed_unit(-1.2), -1.0);
        assert_eq!(clamp_signed_unit(2.0), 1.0);
        assert_eq!(clamp_signed_unit(f32::NEG_INFINITY), 0.0);
    }
}
