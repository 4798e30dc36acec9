//! Differential-drive speed arbitration.
//!
//! A demand (throttle, differential share, bias, advance) mixes into two
//! signed wheel speeds. Each side independently gets the deadband-then-clamp
//! treatment, so an emitted command is always exactly 0 or strictly outside
//! the deadband.

use crate::config::DriveCfg;
use crate::util::{clamp_signed_unit, clamp_unit};

/// What the pilot wants from the drivetrain this tick. All ratios.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveDemand {
    /// Overall effort in [0, 1]
    pub throttle: f32,
    /// Share of effort spent turning rather than advancing, [0, 1]
    pub diff_drive: f32,
    /// Turn direction and strength in [-1, 1]; positive steers right
    pub bias: f32,
    /// Forward/reverse direction in [-1, 1]
    pub advance: f32,
}

impl DriveDemand {
    /// A demand that mixes to a full stop.
    pub const HALT: Self = Self {
        throttle: 0.0,
        diff_drive: 0.0,
        bias: 0.0,
        advance: 0.0,
    };
}

/// One wheel-speed command pair, bounded by the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveCommand {
    pub left: i16,
    pub right: i16,
}

impl DriveCommand {
    pub const STOP: Self = Self { left: 0, right: 0 };

    pub fn is_stop(&self) -> bool {
        *self == Self::STOP
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DriveMixer {
    cfg: DriveCfg,
}

impl DriveMixer {
    pub fn new(cfg: DriveCfg) -> Self {
        Self { cfg }
    }

    /// Mix a demand into wheel speeds.
    ///
    /// The synchronous component moves both wheels together; the
    /// differential component moves them in opposition. Inputs are clamped
    /// to their documented ranges first, so callers cannot smuggle a speed
    /// past the saturation bound with an out-of-range ratio.
    pub fn mix(&self, demand: DriveDemand) -> DriveCommand {
        let throttle = clamp_unit(demand.throttle);
        let diff_drive = clamp_unit(demand.diff_drive);
        let bias = clamp_signed_unit(demand.bias);
        let advance = clamp_signed_unit(demand.advance);

        let total = self.cfg.max_speed as f32;
        let syn = advance * (1.0 - diff_drive) * throttle * total;
        let left_diff = bias * diff_drive * throttle * total;

        DriveCommand {
            left: self.shape(syn + left_diff),
            right: self.shape(syn - left_diff),
        }
    }

    /// Deadband, then symmetric clamp, in integer motor units.
    fn shape(&self, raw: f32) -> i16 {
        let out = raw.round() as i32;
        if out.abs() <= self.cfg.deadband {
            return 0;
        }
        out.clamp(-self.cfg.max_speed, self.cfg.max_speed) as i16
    }
}
