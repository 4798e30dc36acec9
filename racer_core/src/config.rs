//! Tuning structs consumed by the control loop.
//!
//! These mirror the file-level schema in `racer_config` but are owned by the
//! core so the controller can be embedded without pulling in TOML parsing.
//! Each struct has a `From<&racer_config::...>` conversion used by the CLI.

pub use racer_config::KillPolicy;

/// Pan-servo PD gains and travel limits.
#[derive(Debug, Clone, Copy)]
pub struct ServoCfg {
    pub p_gain: i32,
    pub d_gain: i32,
    pub min_pos: i32,
    pub max_pos: i32,
}

impl Default for ServoCfg {
    fn default() -> Self {
        Self {
            p_gain: 300,
            d_gain: 500,
            min_pos: 0,
            max_pos: 1000,
        }
    }
}

impl ServoCfg {
    /// Midpoint of the travel range; the boot and recenter position.
    #[inline]
    pub fn center(&self) -> i32 {
        self.min_pos + (self.max_pos - self.min_pos) / 2
    }
}

impl From<&racer_config::Servo> for ServoCfg {
    fn from(s: &racer_config::Servo) -> Self {
        Self {
            p_gain: s.p_gain,
            d_gain: s.d_gain,
            min_pos: s.min_pos,
            max_pos: s.max_pos,
        }
    }
}

/// Body-steering PID gains and integrator bounds.
#[derive(Debug, Clone, Copy)]
pub struct SteerCfg {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub integrator_min: f32,
    pub integrator_max: f32,
}

impl Default for SteerCfg {
    fn default() -> Self {
        Self {
            kp: 0.7,
            ki: 0.0,
            kd: 0.0,
            integrator_min: -500.0,
            integrator_max: 500.0,
        }
    }
}

impl From<&racer_config::Steer> for SteerCfg {
    fn from(s: &racer_config::Steer) -> Self {
        Self {
            kp: s.kp,
            ki: s.ki,
            kd: s.kd,
            integrator_min: s.integrator_min,
            integrator_max: s.integrator_max,
        }
    }
}

/// Frame geometry used by feature classification.
#[derive(Debug, Clone, Copy)]
pub struct SceneCfg {
    /// Horizontal pixel the vehicle steers toward
    pub center_x: i32,
    /// Line detections with y below this row are far-field noise
    pub horizon_y: u16,
    /// Cap on detections requested per frame
    pub max_detections: usize,
}

impl Default for SceneCfg {
    fn default() -> Self {
        Self {
            center_x: 160,
            horizon_y: 60,
            max_detections: 10,
        }
    }
}

impl From<&racer_config::Camera> for SceneCfg {
    fn from(c: &racer_config::Camera) -> Self {
        Self {
            center_x: c.center_x,
            horizon_y: c.horizon_y,
            max_detections: c.max_detections,
        }
    }
}

/// Wheel-speed saturation and deadband, in motor command units.
#[derive(Debug, Clone, Copy)]
pub struct DriveCfg {
    pub max_speed: i32,
    /// Commands with magnitude at or below this become exactly 0
    pub deadband: i32,
}

impl Default for DriveCfg {
    fn default() -> Self {
        Self {
            max_speed: 480,
            deadband: 24,
        }
    }
}

impl From<&racer_config::DriveCfg> for DriveCfg {
    fn from(d: &racer_config::DriveCfg) -> Self {
        let deadband = ((d.max_speed as f32) * d.deadband_frac).round() as i32;
        Self {
            max_speed: d.max_speed,
            deadband,
        }
    }
}

/// Per-tick steering policy while tracking the line.
#[derive(Debug, Clone, Copy)]
pub struct PilotCfg {
    pub base_throttle: f32,
    pub diff_drive_straight: f32,
    pub full_diff_error_px: f32,
    pub say_bias_threshold: f32,
    pub lost_timeout_ms: u64,
    pub tick_ms: u64,
    /// Which center-line detection steers: 0 = first reported, 1 = second when present
    pub lookahead: usize,
}

impl Default for PilotCfg {
    fn default() -> Self {
        Self {
            base_throttle: 1.0,
            diff_drive_straight: 0.4,
            full_diff_error_px: 300.0,
            say_bias_threshold: 0.3,
            lost_timeout_ms: 500,
            tick_ms: 20,
            lookahead: 1,
        }
    }
}

impl From<&racer_config::Pilot> for PilotCfg {
    fn from(p: &racer_config::Pilot) -> Self {
        Self {
            base_throttle: p.base_throttle,
            diff_drive_straight: p.diff_drive_straight,
            full_diff_error_px: p.full_diff_error_px,
            say_bias_threshold: p.say_bias_threshold,
            lost_timeout_ms: p.lost_timeout_ms,
            tick_ms: p.tick_ms,
            lookahead: p.lookahead,
        }
    }
}

/// Lost-line fallback behavior.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryCfg {
    pub history_len: usize,
    pub turn_throttle: f32,
    pub sweep_step: u16,
    pub reacquire_throttle: f32,
    pub reacquire_error_px: f32,
    pub reacquire_diff_drive: f32,
}

impl Default for RecoveryCfg {
    fn default() -> Self {
        Self {
            history_len: 3,
            turn_throttle: 0.5,
            sweep_step: 10,
            reacquire_throttle: 0.9,
            reacquire_error_px: 40.0,
            reacquire_diff_drive: 0.6,
        }
    }
}

impl From<&racer_config::Recovery> for RecoveryCfg {
    fn from(r: &racer_config::Recovery) -> Self {
        Self {
            history_len: r.history_len,
            turn_throttle: r.turn_throttle,
            sweep_step: r.sweep_step,
            reacquire_throttle: r.reacquire_throttle,
            reacquire_error_px: r.reacquire_error_px,
            reacquire_diff_drive: r.reacquire_diff_drive,
        }
    }
}

/// Brightness probing bounds for marginal lighting.
#[derive(Debug, Clone, Copy)]
pub struct BrightnessCfg {
    pub enabled: bool,
    pub probe_up: u8,
    pub probe_down: u8,
    pub floor: u8,
    pub ceiling: u8,
}

impl Default for BrightnessCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            probe_up: 20,
            probe_down: 20,
            floor: 60,
            ceiling: 255,
        }
    }
}

impl From<&racer_config::Brightness> for BrightnessCfg {
    fn from(b: &racer_config::Brightness) -> Self {
        Self {
            enabled: b.enabled,
            probe_up: b.probe_up,
            probe_down: b.probe_down,
            floor: b.floor,
            ceiling: b.ceiling,
        }
    }
}

/// Obstacle standoff tuning (hold a target distance to a known-size object).
#[derive(Debug, Clone, Copy)]
pub struct StandoffCfg {
    pub enabled: bool,
    pub px_to_deg: f32,
    pub ref_width_mm: f32,
    pub target_mm: f32,
    pub ref_mm: f32,
    pub drive_gain: f32,
    pub diff_gain: f32,
    pub throttle: f32,
}

impl Default for StandoffCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            px_to_deg: 0.117,
            ref_width_mm: 12.0,
            target_mm: 100.0,
            ref_mm: 400.0,
            drive_gain: 1.0,
            diff_gain: 1.0,
            throttle: 0.5,
        }
    }
}

impl From<&racer_config::Standoff> for StandoffCfg {
    fn from(s: &racer_config::Standoff) -> Self {
        Self {
            enabled: s.enabled,
            px_to_deg: s.px_to_deg,
            ref_width_mm: s.ref_width_mm,
            target_mm: s.target_mm,
            ref_mm: s.ref_mm,
            drive_gain: s.drive_gain,
            diff_gain: s.diff_gain,
            throttle: s.throttle,
        }
    }
}

/// Outbound speech worker settings.
#[derive(Debug, Clone, Copy)]
pub struct SpeechCfg {
    pub dedupe_secs: u64,
    pub queue_len: usize,
}

impl Default for SpeechCfg {
    fn default() -> Self {
        Self {
            dedupe_secs: 3,
            queue_len: 8,
        }
    }
}

impl From<&racer_config::Speech> for SpeechCfg {
    fn from(s: &racer_config::Speech) -> Self {
        Self {
            dedupe_secs: s.dedupe_secs,
            queue_len: s.queue_len,
        }
    }
}

/// Kill-switch listener settings.
#[derive(Debug, Clone)]
pub struct KillCfg {
    pub policy: KillPolicy,
    pub kill_codes: Vec<String>,
    pub revive_codes: Vec<String>,
    pub poll_ms: u64,
}

impl Default for KillCfg {
    fn default() -> Self {
        Self {
            policy: KillPolicy::Any,
            kill_codes: Vec::new(),
            revive_codes: Vec::new(),
            poll_ms: 20,
        }
    }
}

impl From<&racer_config::Kill> for KillCfg {
    fn from(k: &racer_config::Kill) -> Self {
        Self {
            policy: k.policy,
            kill_codes: k.kill_codes.clone(),
            revive_codes: k.revive_codes.clone(),
            poll_ms: k.poll_ms,
        }
    }
}

/// Everything the pilot needs, grouped so constructors stay small.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tuning {
    pub servo: ServoCfg,
    pub steer: SteerCfg,
    pub scene: SceneCfg,
    pub drive: DriveCfg,
    pub pilot: PilotCfg,
    pub recovery: RecoveryCfg,
    pub brightness: BrightnessCfg,
    pub standoff: StandoffCfg,
}

impl From<&racer_config::Config> for Tuning {
    fn from(cfg: &racer_config::Config) -> Self {
        Self {
            servo: ServoCfg::from(&cfg.servo),
            steer: SteerCfg::from(&cfg.steer),
            scene: SceneCfg::from(&cfg.camera),
            drive: DriveCfg::from(&cfg.drive),
            pilot: PilotCfg::from(&cfg.pilot),
            recovery: RecoveryCfg::from(&cfg.recovery),
            brightness: BrightnessCfg::from(&cfg.brightness),
            standoff: StandoffCfg::from(&cfg.standoff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DriveCfg, ServoCfg, Tuning};

    #[test]
    fn deadband_resolves_from_fraction() {
        let file = racer_config::load_toml("").expect("parse TOML");
        let drive = DriveCfg::from(&file.drive);
        // 5% of 480, rounded
        assert_eq!(drive.deadband, 24);
        assert_eq!(drive.max_speed, 480);
    }

    #[test]
    fn servo_center_is_midpoint() {
        let cfg = ServoCfg::default();
        assert_eq!(cfg.center(), 500);
        let skewed = ServoCfg {
            min_pos: 100,
            max_pos: 900,
            ..cfg
        };
        assert_eq!(skewed.center(), 500);
    }

    #[test]
    fn tuning_converts_whole_file() {
        let file = racer_config::load_toml(
            "[pilot]\nlookahead = 2\n[camera]\ncenter_x = 159\n",
        )
        .expect("parse TOML");
        let tuning = Tuning::from(&file);
        assert_eq!(tuning.pilot.lookahead, 2);
        assert_eq!(tuning.scene.center_x, 159);
        assert_eq!(tuning.servo.p_gain, 300);
    }
}
