use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum RacerError {
    #[error("sensor error: {0}")]
    Sensor(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for frame")]
    Timeout,
}

/// Why the run loop stopped on purpose. These are outcomes, not faults.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    #[error("kill switch engaged")]
    Kill,
    #[error("interrupted")]
    Interrupt,
    #[error("tick limit reached")]
    TickLimit,
    #[error("guide line search exhausted")]
    SearchExhausted,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Recognize typed hardware errors when the `hardware-errors` feature is on.
/// Returns `None` when the error is not one of ours.
fn map_typed(e: &(dyn std::error::Error + 'static)) -> Option<RacerError> {
    #[cfg(feature = "hardware-errors")]
    if let Some(hw) = e.downcast_ref::<racer_hardware::error::HwError>() {
        return Some(match hw {
            racer_hardware::error::HwError::FrameTimeout => RacerError::Timeout,
            other => RacerError::HardwareFault(other.to_string()),
        });
    }
    #[cfg(not(feature = "hardware-errors"))]
    let _ = e;
    None
}

/// Map a boxed vision-collaborator error to a typed `RacerError`.
pub(crate) fn map_vision_error(e: &(dyn std::error::Error + 'static)) -> RacerError {
    if let Some(typed) = map_typed(e) {
        return typed;
    }
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        RacerError::Timeout
    } else {
        RacerError::Sensor(s)
    }
}

/// Map a boxed actuator-collaborator error to a typed `RacerError`.
pub(crate) fn map_actuator_error(e: &(dyn std::error::Error + 'static)) -> RacerError {
    if let Some(typed) = map_typed(e) {
        return typed;
    }
    RacerError::Hardware(e.to_string())
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
