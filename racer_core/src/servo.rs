//! Pan-servo PD tracking loop.
//!
//! Gains are in the sensor's native fixed-point units; the update applies a
//! velocity term scaled by a right shift so the steady-state gain ratio
//! matches the stock head-tracking tune.

use crate::config::ServoCfg;

/// Fixed-point scale applied to the PD velocity term.
const SCALE_SHIFT: u32 = 10;

#[derive(Debug)]
pub struct ServoLoop {
    cfg: ServoCfg,
    position: i32,
    prev_error: Option<i32>,
}

impl ServoLoop {
    pub fn new(cfg: ServoCfg) -> Self {
        let position = cfg.center();
        Self {
            cfg,
            position,
            prev_error: None,
        }
    }

    /// Advance the loop by one error sample and return the new position.
    ///
    /// The first call only primes the derivative memory; the position holds
    /// so an arbitrary boot error cannot kick the head.
    pub fn update(&mut self, error: i32) -> i32 {
        if let Some(prev) = self.prev_error {
            let vel = (error * self.cfg.p_gain + (error - prev) * self.cfg.d_gain) >> SCALE_SHIFT;
            self.position = (self.position + vel).clamp(self.cfg.min_pos, self.cfg.max_pos);
        }
        self.prev_error = Some(error);
        self.position
    }

    #[inline]
    pub fn position(&self) -> i32 {
        self.position
    }

    /// Place the head directly, clamped to the travel range. Derivative
    /// memory is kept; the next update sees the move as commanded, not as
    /// tracking error.
    pub fn set_position(&mut self, pos: i32) {
        self.position = pos.clamp(self.cfg.min_pos, self.cfg.max_pos);
    }

    /// Return to center with fresh derivative memory, as at boot.
    pub fn reset(&mut self) {
        self.position = self.cfg.center();
        self.prev_error = None;
    }

    /// Normalized head deflection in [-1, 1]: 0 at center, ±1 at the stops.
    pub fn turn_ratio(&self) -> f32 {
        let half_span = (self.cfg.max_pos - self.cfg.min_pos) / 2;
        if half_span <= 0 {
            return 0.0;
        }
        (self.position - self.cfg.center()) as f32 / half_span as f32
    }
}

#[cfg(test)]
mod tests {
    use super::ServoLoop;
    use crate::config::ServoCfg;

    fn servo() -> ServoLoop {
        ServoLoop::new(ServoCfg::default())
    }

    #[test]
    fn first_update_holds_position() {
        let mut s = servo();
        assert_eq!(s.update(400), 500);
        // second call applies the velocity term
        assert_ne!(s.update(400), 500);
    }

    #[test]
    fn zero_error_holds_after_priming() {
        let mut s = servo();
        s.update(0);
        let p1 = s.update(0);
        let p2 = s.update(0);
        assert_eq!(p1, 500);
        assert_eq!(p1, p2);
    }

    #[test]
    fn position_saturates_at_travel_limits() {
        let mut s = servo();
        s.update(300);
        for _ in 0..200 {
            s.update(300);
        }
        assert_eq!(s.position(), 1000);
        for _ in 0..400 {
            s.update(-300);
        }
        assert_eq!(s.position(), 0);
    }

    #[test]
    fn velocity_matches_fixed_point_formula() {
        let mut s = servo();
        s.update(100); // prime
        let pos = s.update(120);
        // vel = (120*300 + (120-100)*500) >> 10 = (36000 + 10000) >> 10 = 44
        assert_eq!(pos, 544);
    }

    #[test]
    fn turn_ratio_spans_unit_range() {
        let mut s = servo();
        assert_eq!(s.turn_ratio(), 0.0);
        s.set_position(1000);
        assert_eq!(s.turn_ratio(), 1.0);
        s.set_position(0);
        assert_eq!(s.turn_ratio(), -1.0);
        s.set_position(750);
        assert!((s.turn_ratio() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn reset_recenters_and_clears_memory() {
        let mut s = servo();
        s.update(200);
        s.update(200);
        s.reset();
        assert_eq!(s.position(), 500);
        // first post-reset update must hold again
        assert_eq!(s.update(-300), 500);
    }
}
