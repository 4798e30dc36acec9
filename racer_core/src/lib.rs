#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core line-following logic (hardware-agnostic).
//!
//! This crate provides the hardware-independent driving brain. All hardware
//! interactions go through the `racer_traits::Vision` and `racer_traits::Drive`
//! traits.
//!
//! ## Architecture
//!
//! - **Perception**: frame classification and brightness probing (`scene` module)
//! - **Head tracking**: incremental pan servo follower (`servo` module)
//! - **Steering**: PID on the head angle (`pid` module)
//! - **Mixing**: demand to wheel-speed translation (`drive` module)
//! - **Orchestration**: per-tick state machine (`control`) and session loop (`runner`)
//! - **Recovery**: sighting history vote (`history`) plus the sweep in `control`
//!
//! ## Fixed-Point Arithmetic
//!
//! The pan follower operates on integer pixel errors with gains scaled by
//! `2^10` for deterministic behavior across platforms. See `ServoLoop::update`.

// Module declarations
pub mod config;
pub mod control;
pub mod dance;
pub mod drive;
pub mod error;
pub mod history;
pub mod killswitch;
pub mod pid;
pub mod runner;
pub mod scene;
pub mod servo;
pub mod speech;
pub mod standoff;
pub mod status;
pub mod util;

pub use crate::config::{
    BrightnessCfg, DriveCfg, KillCfg, PilotCfg, RecoveryCfg, SceneCfg, ServoCfg, SpeechCfg,
    StandoffCfg, SteerCfg, Tuning,
};
pub use crate::control::Pilot;
pub use crate::drive::{DriveCommand, DriveDemand, DriveMixer};
pub use crate::error::{BuildError, HaltReason, RacerError, Report, Result};
pub use crate::history::{Lean, RecentHistory};
pub use crate::killswitch::KillSwitchListener;
pub use crate::pid::Pid;
pub use crate::runner::{RunOutcome, RunParams, RunStats};
pub use crate::scene::SceneSnapshot;
pub use crate::servo::ServoLoop;
pub use crate::speech::Speaker;
pub use crate::status::{PilotMode, TickOutcome, TickReport};
