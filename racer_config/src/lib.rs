#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the line racer.
//!
//! `Config` and its sub-structs are deserialized from TOML and validated.
//! Every section has defaults matching the tuned track setup, so an empty
//! file (or no file at all) yields a runnable simulated configuration.
use serde::Deserialize;

/// Camera geometry and frame acquisition.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Camera {
    /// Image width in pixels
    pub width: u16,
    /// Image height in pixels
    pub height: u16,
    /// Horizontal pixel the vehicle steers toward
    pub center_x: i32,
    /// Line detections above this row are far-field noise and dropped
    pub horizon_y: u16,
    /// Initial sensor brightness level
    pub brightness: u8,
    /// Cap on detections ingested per frame
    pub max_detections: usize,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            width: 320,
            height: 200,
            center_x: 160,
            horizon_y: 60,
            brightness: 185,
            max_detections: 10,
        }
    }
}

/// Pan-servo PD tracking loop.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Servo {
    pub p_gain: i32,
    pub d_gain: i32,
    pub min_pos: i32,
    pub max_pos: i32,
}

impl Default for Servo {
    fn default() -> Self {
        Self {
            p_gain: 300,
            d_gain: 500,
            min_pos: 0,
            max_pos: 1000,
        }
    }
}

/// Body steering PID (bias from normalized pan turn).
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Steer {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub integrator_min: f32,
    pub integrator_max: f32,
}

impl Default for Steer {
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

/// Wheel speed arbitration limits.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct DriveCfg {
    /// Symmetric saturation bound for either wheel
    pub max_speed: i32,
    /// Deadband as a fraction of max_speed; commands inside it become 0
    pub deadband_frac: f32,
}

impl Default for DriveCfg {
    fn default() -> Self {
        Self {
            max_speed: 480,
            deadband_frac: 0.05,
        }
    }
}

/// Per-tick steering policy.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Pilot {
    pub base_throttle: f32,
    /// Differential share when driving straight
    pub diff_drive_straight: f32,
    /// Tracking-error magnitude (px) at which the differential share gain reaches 1.0
    pub full_diff_error_px: f32,
    /// Announce a turn when |bias| exceeds this
    pub say_bias_threshold: f32,
    /// Guide line absent longer than this enters lost recovery
    pub lost_timeout_ms: u64,
    /// Nominal tick period; also bounds the per-tick frame wait
    pub tick_ms: u64,
    /// Which center-line detection steers: 0 = first reported, 1 = second when present
    pub lookahead: usize,
}

impl Default for Pilot {
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

/// Lost-recovery fallback behavior.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Recovery {
    /// Frames of left/right feature counts kept for the majority vote
    pub history_len: usize,
    /// Throttle for the blind history-vote turn
    pub turn_throttle: f32,
    /// Pan step between sweep probes
    pub sweep_step: u16,
    /// Throttle base when the sweep reacquires the line
    pub reacquire_throttle: f32,
    /// Error magnitude (px) normalizing the reacquire throttle cut
    pub reacquire_error_px: f32,
    /// Differential share right after reacquisition
    pub reacquire_diff_drive: f32,
}

impl Default for Recovery {
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

/// Optional brightness probing when classification is unusable.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Brightness {
    pub enabled: bool,
    /// Levels probed above the current brightness
    pub probe_up: u8,
    /// Levels probed below the current brightness
    pub probe_down: u8,
    pub floor: u8,
    pub ceiling: u8,
}

impl Default for Brightness {
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

/// Obstacle standoff (pursue/retreat to hold a target distance).
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Standoff {
    pub enabled: bool,
    /// Pixel to visual-angle conversion (degrees per pixel, rough)
    pub px_to_deg: f32,
    /// Known width of the reference obstacle (mm)
    pub ref_width_mm: f32,
    /// Distance to hold (mm)
    pub target_mm: f32,
    /// Distance normalizing the advance term (mm)
    pub ref_mm: f32,
    pub drive_gain: f32,
    pub diff_gain: f32,
    pub throttle: f32,
}

impl Default for Standoff {
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

/// Outbound speech notifications.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Speech {
    pub enabled: bool,
    /// Identical consecutive sayings inside this window are dropped
    pub dedupe_secs: u64,
    /// Bounded queue length; producers drop when full
    pub queue_len: usize,
}

impl Default for Speech {
    fn default() -> Self {
        Self {
            enabled: false,
            dedupe_secs: 3,
            queue_len: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KillPolicy {
    /// Any received token halts (observed stock behavior)
    #[default]
    Any,
    /// Only tokens in kill_codes halt; revive_codes clear a pending halt
    Codes,
}

/// Kill-switch side channel handling.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Kill {
    pub policy: KillPolicy,
    pub kill_codes: Vec<String>,
    pub revive_codes: Vec<String>,
    /// Polling interval for the listener thread
    pub poll_ms: u64,
}

impl Default for Kill {
    fn default() -> Self {
        Self {
            policy: KillPolicy::Any,
            kill_codes: Vec::new(),
            revive_codes: Vec::new(),
            poll_ms: 20,
        }
    }
}

/// Escalation limits applied by the run loop.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Runner {
    /// Consecutive exhausted pan sweeps tolerated before giving up (0 = unlimited)
    pub max_search_failures: u32,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            max_search_failures: 0,
        }
    }
}

/// Physical wiring for the real sensor/driver (feature `hardware`).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Hardware {
    /// UART device streaming vision blocks
    pub vision_device: String,
    pub vision_baud: u32,
    /// Serial device yielding kill tokens
    pub kill_device: String,
    pub kill_baud: u32,
    /// Max wait for a new frame before the tick proceeds without one
    pub frame_timeout_ms: u64,
    pub left_dir_pin: u8,
    pub left_pwm_pin: u8,
    pub right_dir_pin: u8,
    pub right_pwm_pin: u8,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            vision_device: "/dev/ttyS0".to_string(),
            vision_baud: 19_200,
            kill_device: "/dev/ttyACM0".to_string(),
            kill_baud: 9_600,
            frame_timeout_ms: 100,
            left_dir_pin: 5,
            left_pwm_pin: 12,
            right_dir_pin: 6,
            right_pwm_pin: 13,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub camera: Camera,
    pub servo: Servo,
    pub steer: Steer,
    pub drive: DriveCfg,
    pub pilot: Pilot,
    pub recovery: Recovery,
    pub brightness: Brightness,
    pub standoff: Standoff,
    pub speech: Speech,
    pub kill: Kill,
    pub runner: Runner,
    pub hardware: Hardware,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Camera
        if self.camera.width == 0 || self.camera.height == 0 {
            eyre::bail!("camera.width and camera.height must be > 0");
        }
        if self.camera.center_x < 0 || self.camera.center_x >= i32::from(self.camera.width) {
            eyre::bail!("camera.center_x must be inside [0, camera.width)");
        }
        if self.camera.horizon_y >= self.camera.height {
            eyre::bail!("camera.horizon_y must be below camera.height");
        }
        if self.camera.max_detections == 0 {
            eyre::bail!("camera.max_detections must be >= 1");
        }

        // Servo
        if self.servo.min_pos < 0 {
            eyre::bail!("servo.min_pos must be >= 0");
        }
        if self.servo.max_pos <= self.servo.min_pos {
            eyre::bail!("servo.max_pos must be > servo.min_pos");
        }
        if self.servo.p_gain < 0 || self.servo.d_gain < 0 {
            eyre::bail!("servo gains must be >= 0");
        }

        // Steer
        if self.steer.kp < 0.0 || self.steer.ki < 0.0 || self.steer.kd < 0.0 {
            eyre::bail!("steer gains must be >= 0");
        }
        if self.steer.integrator_min >= self.steer.integrator_max {
            eyre::bail!("steer.integrator_min must be < steer.integrator_max");
        }

        // Drive
        if self.drive.max_speed <= 0 {
            eyre::bail!("drive.max_speed must be > 0");
        }
        // Wheel commands are i16 end to end
        if self.drive.max_speed > i32::from(i16::MAX) {
            eyre::bail!("drive.max_speed must be <= 32767");
        }
        if !(0.0..1.0).contains(&self.drive.deadband_frac) {
            eyre::bail!("drive.deadband_frac must be in [0.0, 1.0)");
        }

        // Pilot
        if !(0.0..=1.0).contains(&self.pilot.base_throttle) {
            eyre::bail!("pilot.base_throttle must be in [0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&self.pilot.diff_drive_straight) {
            eyre::bail!("pilot.diff_drive_straight must be in [0.0, 1.0]");
        }
        if self.pilot.full_diff_error_px <= 0.0 {
            eyre::bail!("pilot.full_diff_error_px must be > 0");
        }
        if !(0.0..=1.0).contains(&self.pilot.say_bias_threshold) {
            eyre::bail!("pilot.say_bias_threshold must be in [0.0, 1.0]");
        }
        if self.pilot.lost_timeout_ms == 0 {
            eyre::bail!("pilot.lost_timeout_ms must be >= 1");
        }
        if self.pilot.tick_ms == 0 {
            eyre::bail!("pilot.tick_ms must be >= 1");
        }
        if self.pilot.lookahead > 2 {
            eyre::bail!("pilot.lookahead must be 0, 1, or 2");
        }

        // Recovery
        if self.recovery.history_len == 0 {
            eyre::bail!("recovery.history_len must be >= 1");
        }
        if self.recovery.sweep_step == 0 {
            eyre::bail!("recovery.sweep_step must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.recovery.turn_throttle) {
            eyre::bail!("recovery.turn_throttle must be in [0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&self.recovery.reacquire_throttle) {
            eyre::bail!("recovery.reacquire_throttle must be in [0.0, 1.0]");
        }
        if self.recovery.reacquire_error_px <= 0.0 {
            eyre::bail!("recovery.reacquire_error_px must be > 0");
        }
        if !(0.0..=1.0).contains(&self.recovery.reacquire_diff_drive) {
            eyre::bail!("recovery.reacquire_diff_drive must be in [0.0, 1.0]");
        }

        // Brightness
        if self.brightness.floor > self.brightness.ceiling {
            eyre::bail!("brightness.floor must be <= brightness.ceiling");
        }

        // Standoff
        if self.standoff.px_to_deg <= 0.0 {
            eyre::bail!("standoff.px_to_deg must be > 0");
        }
        if self.standoff.ref_width_mm <= 0.0 || self.standoff.ref_mm <= 0.0 {
            eyre::bail!("standoff reference sizes must be > 0");
        }
        if !(0.0..=1.0).contains(&self.standoff.throttle) {
            eyre::bail!("standoff.throttle must be in [0.0, 1.0]");
        }

        // Speech
        if self.speech.queue_len == 0 {
            eyre::bail!("speech.queue_len must be >= 1");
        }

        // Kill switch
        if self.kill.poll_ms == 0 {
            eyre::bail!("kill.poll_ms must be >= 1");
        }
        if self.kill.policy == KillPolicy::Codes && self.kill.kill_codes.is_empty() {
            eyre::bail!("kill.policy = \"codes\" requires at least one entry in kill.kill_codes");
        }

        // Hardware
        if self.hardware.frame_timeout_ms == 0 {
            eyre::bail!("hardware.frame_timeout_ms must be >= 1");
        }
        if self.hardware.vision_baud == 0 || self.hardware.kill_baud == 0 {
            eyre::bail!("hardware baud rates must be > 0");
        }

        Ok(())
    }
}
