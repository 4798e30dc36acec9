//! Device backends for the rover.
//!
//! The simulated types are always available and carry no I/O beyond the
//! log. The Raspberry Pi drivers (UART sensor, PWM motor board) live
//! behind the `hardware` feature and only build on Linux.

#[cfg(feature = "hardware")]
pub mod pixy;

pub mod block_stream;
pub mod error;

use std::time::Duration;

use racer_traits::{Detection, Drive, Feature, KillSwitch, Notifier, Saying, Vision};

/// Sensor brightness register value after power-on.
pub const DEFAULT_BRIGHTNESS: u8 = 185;
/// Pan servo travel in sensor units.
pub const PAN_MIN: u16 = 0;
pub const PAN_MAX: u16 = 1000;
pub const PAN_CENTER: u16 = 500;

const FRAME_WIDTH: u16 = 320;
const LINE_SWING: f32 = 120.0;

/// Ticks per dropout cycle; the line vanishes for a stretch of each cycle
/// so recovery gets exercised without a track.
const DROPOUT_PERIOD: u64 = 400;
const DROPOUT_START: u64 = 300;
const DROPOUT_END: u64 = 330;

/// Deterministic stand-in for the camera.
///
/// A painted line sweeps across the image on a sine path, vanishes once
/// per cycle, and drops a side marker just before it goes, so a full
/// track-lose-recover loop plays out against it.
pub struct SimulatedVision {
    tick: u64,
    rng: u32,
    pan: u16,
    brightness: u8,
}

impl Default for SimulatedVision {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedVision {
    pub fn new() -> Self {
        Self {
            tick: 0,
            rng: 0x6d2b_79f5,
            pan: PAN_CENTER,
            brightness: DEFAULT_BRIGHTNESS,
        }
    }

    /// Last commanded pan position.
    pub fn pan(&self) -> u16 {
        self.pan
    }

    fn line_x(&self, t: u64) -> u16 {
        let x = f32::from(FRAME_WIDTH / 2) + LINE_SWING * (t as f32 / 40.0).sin();
        x.clamp(0.0, f32::from(FRAME_WIDTH - 1)) as u16
    }

    fn jitter(&mut self, span: u16) -> u16 {
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 17;
        self.rng ^= self.rng << 5;
        (self.rng % u32::from(span.max(1))) as u16
    }

    fn blob(&mut self, feature: Feature, x: u16, y: u16) -> Detection {
        let wobble = self.jitter(5);
        Detection {
            feature,
            // The real sensor reports image coordinates only.
            x: x.saturating_add(wobble)
                .saturating_sub(2)
                .min(FRAME_WIDTH - 1),
            y,
            width: 18 + self.jitter(6),
            height: 36 + self.jitter(10),
        }
    }
}

impl Vision for SimulatedVision {
    fn wait_frame(
        &mut self,
        timeout: Duration,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        // One frame per wait, paced like the real sensor.
        std::thread::sleep(timeout);
        Ok(true)
    }

    fn detections(
        &mut self,
        max: usize,
    ) -> Result<Vec<Detection>, Box<dyn std::error::Error + Send + Sync>> {
        self.tick += 1;
        let t = self.tick;
        let phase = t % DROPOUT_PERIOD;

        let mut out = Vec::new();
        if !(DROPOUT_START..DROPOUT_END).contains(&phase) {
            let near = self.line_x(t);
            let far = self.line_x(t + 15);
            out.push(self.blob(Feature::CenterLine, near, 170));
            out.push(self.blob(Feature::CenterLine, far, 90));
        }
        if (DROPOUT_START - 20..DROPOUT_START).contains(&phase) {
            // Marker on the side the line is drifting toward, so the
            // recovery vote has something to count during the dropout.
            let x = self.line_x(t);
            if self.line_x(t + 1) > x {
                out.push(self.blob(Feature::RightLine, x.saturating_add(50), 150));
            } else {
                out.push(self.blob(Feature::LeftLine, x.saturating_sub(50), 150));
            }
        }
        out.truncate(max);
        Ok(out)
    }

    fn set_pan(&mut self, pos: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.pan = pos.clamp(PAN_MIN, PAN_MAX);
        Ok(())
    }

    fn brightness(&mut self) -> Result<u8, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.brightness)
    }

    fn set_brightness(
        &mut self,
        level: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.brightness = level;
        Ok(())
    }
}

/// Drive backend that logs commands and remembers the last pair.
#[derive(Debug, Default)]
pub struct SimulatedDrive {
    last: (i16, i16),
}

impl SimulatedDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_speeds(&self) -> (i16, i16) {
        self.last
    }
}

impl Drive for SimulatedDrive {
    fn set_speeds(
        &mut self,
        left: i16,
        right: i16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.last = (left, right);
        tracing::debug!(left, right, "drive (simulated)");
        Ok(())
    }
}

/// Kill switch backend that never fires; the simulator has no radio.
#[derive(Debug, Default)]
pub struct IdleKillSwitch;

impl KillSwitch for IdleKillSwitch {
    fn poll(&mut self) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(None)
    }
}

/// Speech sink that writes sayings to the log instead of a speaker.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, saying: &Saying) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match saying {
            Saying::Text(text) => tracing::info!(%text, "say"),
            Saying::Pause(secs) => std::thread::sleep(Duration::from_secs(u64::from(*secs))),
        }
        Ok(())
    }
}

/// BCM numbers for one wheel: the direction phase pin plus its hardware
/// PWM pin (12 or 18 for PWM0, 13 or 19 for PWM1).
#[cfg(feature = "hardware")]
#[derive(Debug, Clone, Copy)]
pub struct WheelPins {
    pub phase: u8,
    pub pwm: u8,
}

/// Differential drive on the Pi's two hardware PWM channels, direction
/// via one GPIO phase pin per side.
#[cfg(feature = "hardware")]
pub struct PwmDrive {
    board: motor_board::Board,
}

#[cfg(feature = "hardware")]
impl PwmDrive {
    /// `max_speed` is the command magnitude mapped to full duty.
    pub fn open(left: WheelPins, right: WheelPins, max_speed: i16) -> error::Result<Self> {
        Ok(Self {
            board: motor_board::Board::open(left, right, max_speed)?,
        })
    }
}

#[cfg(feature = "hardware")]
impl Drive for PwmDrive {
    fn set_speeds(
        &mut self,
        left: i16,
        right: i16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.board.apply(left, right)?;
        Ok(())
    }
}

#[cfg(feature = "hardware")]
mod motor_board {
    use rppal::gpio::{Gpio, OutputPin};
    use rppal::pwm::{Channel, Polarity, Pwm};

    use crate::WheelPins;
    use crate::error::{HwError, Result};

    /// Motor carrier frequency, above audible range.
    const PWM_HZ: f64 = 25_000.0;

    pub struct Board {
        left: Wheel,
        right: Wheel,
        max_speed: f64,
    }

    struct Wheel {
        phase: OutputPin,
        duty: Pwm,
    }

    impl Board {
        pub fn open(left: WheelPins, right: WheelPins, max_speed: i16) -> Result<Self> {
            let gpio = Gpio::new().map_err(gpio_err)?;
            let left = wheel(&gpio, left)?;
            let right = wheel(&gpio, right)?;
            Ok(Self {
                left,
                right,
                max_speed: f64::from(max_speed.max(1)),
            })
        }

        pub fn apply(&mut self, left: i16, right: i16) -> Result<()> {
            let max = self.max_speed;
            set_wheel(&mut self.left, left, max)?;
            set_wheel(&mut self.right, right, max)
        }
    }

    fn wheel(gpio: &Gpio, pins: WheelPins) -> Result<Wheel> {
        Ok(Wheel {
            phase: gpio.get(pins.phase).map_err(gpio_err)?.into_output_low(),
            duty: pwm(channel_for(pins.pwm)?)?,
        })
    }

    fn channel_for(pin: u8) -> Result<Channel> {
        match pin {
            12 | 18 => Ok(Channel::Pwm0),
            13 | 19 => Ok(Channel::Pwm1),
            other => Err(HwError::Gpio(format!(
                "GPIO {other} has no hardware PWM channel"
            ))),
        }
    }

    fn set_wheel(wheel: &mut Wheel, speed: i16, max: f64) -> Result<()> {
        if speed < 0 {
            wheel.phase.set_high();
        } else {
            wheel.phase.set_low();
        }
        let duty = (f64::from(speed.unsigned_abs()) / max).min(1.0);
        wheel
            .duty
            .set_duty_cycle(duty)
            .map_err(|e| HwError::Gpio(e.to_string()))
    }

    fn pwm(channel: Channel) -> Result<Pwm> {
        Pwm::with_frequency(channel, PWM_HZ, 0.0, Polarity::Normal, true)
            .map_err(|e| HwError::Gpio(e.to_string()))
    }

    fn gpio_err(e: rppal::gpio::Error) -> HwError {
        HwError::Gpio(e.to_string())
    }
}
