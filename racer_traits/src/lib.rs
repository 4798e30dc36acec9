pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

/// Track features the vision sensor classifies blobs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Obstacle,
    CenterLine,
    LeftLine,
    RightLine,
    LeftPost,
    RightPost,
}

impl Feature {
    pub const COUNT: usize = 6;

    /// Stable bucket index for per-feature grouping.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Feature::Obstacle => 0,
            Feature::CenterLine => 1,
            Feature::LeftLine => 2,
            Feature::RightLine => 3,
            Feature::LeftPost => 4,
            Feature::RightPost => 5,
        }
    }

    /// Map a raw wire signature number (1..=6) to a feature.
    #[inline]
    pub fn from_signature(sig: u16) -> Option<Self> {
        match sig {
            1 => Some(Feature::Obstacle),
            2 => Some(Feature::CenterLine),
            3 => Some(Feature::LeftLine),
            4 => Some(Feature::RightLine),
            5 => Some(Feature::LeftPost),
            6 => Some(Feature::RightPost),
            _ => None,
        }
    }

    /// True for the painted-line signatures subject to the horizon filter.
    #[inline]
    pub fn is_line(self) -> bool {
        matches!(
            self,
            Feature::CenterLine | Feature::LeftLine | Feature::RightLine
        )
    }
}

/// One classified rectangle from the vision sensor, pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub feature: Feature,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

/// Pan-capable color-blob vision sensor.
///
/// `wait_frame` blocks until a new frame is ready or the timeout expires;
/// callers poll it in a loop with their own cancellation check.
pub trait Vision {
    fn wait_frame(
        &mut self,
        timeout: Duration,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
    fn detections(
        &mut self,
        max: usize,
    ) -> Result<Vec<Detection>, Box<dyn std::error::Error + Send + Sync>>;
    fn set_pan(&mut self, pos: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn brightness(&mut self) -> Result<u8, Box<dyn std::error::Error + Send + Sync>>;
    fn set_brightness(&mut self, level: u8)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Differential drive motor board; positive is forward.
pub trait Drive {
    fn set_speeds(
        &mut self,
        left: i16,
        right: i16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Kill-switch side channel yielding newline-terminated tokens.
pub trait KillSwitch {
    /// Non-blocking: returns a token if one is pending.
    fn poll(&mut self) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Outbound notification: free text or a timed pause directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Saying {
    Text(String),
    Pause(u32),
}

/// Text-to-speech (or equivalent) notification sink, best-effort.
pub trait Notifier {
    fn notify(&mut self, saying: &Saying) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

// Boxed collaborators forward to the inner device, so backends can be
// selected at runtime.

impl<V: Vision + ?Sized> Vision for Box<V> {
    fn wait_frame(
        &mut self,
        timeout: Duration,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).wait_frame(timeout)
    }

    fn detections(
        &mut self,
        max: usize,
    ) -> Result<Vec<Detection>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).detections(max)
    }

    fn set_pan(&mut self, pos: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_pan(pos)
    }

    fn brightness(&mut self) -> Result<u8, Box<dyn std::error::Error + Send + Sync>> {
        (**self).brightness()
    }

    fn set_brightness(
        &mut self,
        level: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_brightness(level)
    }
}

impl<D: Drive + ?Sized> Drive for Box<D> {
    fn set_speeds(
        &mut self,
        left: i16,
        right: i16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_speeds(left, right)
    }
}

impl<K: KillSwitch + ?Sized> KillSwitch for Box<K> {
    fn poll(&mut self) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).poll()
    }
}
