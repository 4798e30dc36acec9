//! Obstacle standoff: estimate range to a known-size object from its
//! apparent width and hold a target distance, advancing when too far and
//! backing off when too close.

use crate::config::StandoffCfg;
use crate::drive::DriveDemand;
use crate::util::{clamp_signed_unit, clamp_unit};

/// Range estimate in millimetres from apparent blob width.
///
/// Small-angle pinhole model: the blob subtends `width * px_to_deg` degrees,
/// and the reference object width closes the triangle. Zero-width blobs are
/// read as one pixel to keep the estimate finite.
pub fn object_distance_mm(width_px: u16, cfg: &StandoffCfg) -> f32 {
    let width = f32::from(width_px.max(1));
    let half_angle = (width * cfg.px_to_deg).to_radians();
    cfg.ref_width_mm / (2.0 * half_angle.tan())
}

/// Drive demand holding the configured standoff distance.
///
/// Advance is proportional to the range error normalized by the reference
/// distance; it goes negative inside the target range, backing the vehicle
/// off. The differential share grows with pan error so the body swings
/// toward the object it is ranging.
pub fn pursuit_demand(
    distance_mm: f32,
    pan_error: i32,
    bias: f32,
    center_x: i32,
    cfg: &StandoffCfg,
) -> DriveDemand {
    let advance = clamp_signed_unit(cfg.drive_gain * (distance_mm - cfg.target_mm) / cfg.ref_mm);
    let center = center_x.max(1) as f32;
    let diff_drive = clamp_unit(cfg.diff_gain * pan_error.unsigned_abs() as f32 / center);
    DriveDemand {
        throttle: clamp_unit(cfg.throttle),
        diff_drive,
        bias: clamp_signed_unit(bias),
        advance,
    }
}
