//! Per-tick status surfaced by the pilot.

use crate::drive::DriveCommand;
use crate::error::HaltReason;

/// Operating mode for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotMode {
    /// No usable tracking target; holding still.
    Searching,
    /// Guide line visible; normal steering.
    Tracking,
    /// Obstacle in view; holding standoff distance.
    Standoff,
    /// Line lost past the timeout; blind turn or pan sweep in progress.
    Recovering,
    /// Kill signal latched; no further motion.
    Halted,
}

/// What one tick did: mode, what was seen, and what was commanded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub mode: PilotMode,
    /// A new frame arrived this tick
    pub fresh_frame: bool,
    pub saw_line: bool,
    pub tracking_error: i32,
    pub pan_pos: i32,
    pub bias: f32,
    pub throttle: f32,
    /// Command sent to the drivetrain this tick; `STOP` when nothing was sent
    pub command: DriveCommand,
    /// A full pan sweep completed without reacquiring the line
    pub search_failed: bool,
}

/// Public status of a single step of the control loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Keep going.
    Running(TickReport),
    /// Stopped on purpose; motors already zeroed.
    Halted(HaltReason),
}
