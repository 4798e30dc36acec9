//! Discrete PID controller used for the body-steering bias.

use crate::config::SteerCfg;

#[derive(Debug)]
pub struct Pid {
    cfg: SteerCfg,
    set_point: f32,
    integrator: f32,
    prev_error: f32,
}

impl Pid {
    pub fn new(cfg: SteerCfg) -> Self {
        Self {
            cfg,
            set_point: 0.0,
            integrator: 0.0,
            prev_error: 0.0,
        }
    }

    /// Change the target and wipe integrator and derivative memory.
    ///
    /// Call whenever the control objective changes discontinuously;
    /// otherwise windup from the previous objective leaks into the next.
    pub fn set_point(&mut self, target: f32) {
        self.set_point = target;
        self.integrator = 0.0;
        self.prev_error = 0.0;
    }

    /// One controller step; deterministic apart from the two state fields.
    pub fn update(&mut self, measurement: f32) -> f32 {
        let error = self.set_point - measurement;
        let p = self.cfg.kp * error;
        let d = self.cfg.kd * (error - self.prev_error);
        self.integrator =
            (self.integrator + error).clamp(self.cfg.integrator_min, self.cfg.integrator_max);
        let i = self.cfg.ki * self.integrator;
        self.prev_error = error;
        p + i + d
    }

    #[inline]
    pub fn integrator(&self) -> f32 {
        self.integrator
    }
}
