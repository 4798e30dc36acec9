//! The finale: a fixed choreography of drive demands played out when the
//! run ends on a kill signal and the finale flag is set.

use std::time::Duration;

use crate::drive::DriveDemand;

#[derive(Debug, Clone, Copy)]
pub struct DanceStep {
    pub demand: DriveDemand,
    pub hold: Duration,
    pub announce: Option<&'static str>,
}

const fn step(demand: DriveDemand, tenths: u64) -> DanceStep {
    DanceStep {
        demand,
        hold: Duration::from_millis(tenths * 100),
        announce: None,
    }
}

const FORWARD: DriveDemand = DriveDemand {
    throttle: 0.25,
    diff_drive: 0.0,
    bias: 0.0,
    advance: 1.0,
};
const BACKWARD: DriveDemand = DriveDemand {
    throttle: 0.3,
    diff_drive: 0.0,
    bias: 0.0,
    advance: -1.0,
};
const SPIN_RIGHT: DriveDemand = DriveDemand {
    throttle: 0.3,
    diff_drive: 1.0,
    bias: 1.0,
    advance: 1.0,
};
const SPIN_LEFT: DriveDemand = DriveDemand {
    throttle: 0.3,
    diff_drive: 1.0,
    bias: -1.0,
    advance: 1.0,
};
const ARC_RIGHT: DriveDemand = DriveDemand {
    throttle: 0.4,
    diff_drive: 0.5,
    bias: 0.5,
    advance: 1.0,
};
const ARC_LEFT: DriveDemand = DriveDemand {
    throttle: 0.3,
    diff_drive: 0.5,
    bias: -0.5,
    advance: 1.0,
};

/// The routine, in order. Durations are stage directions, not control
/// deadlines; the runner sleeps between demands.
pub fn routine() -> Vec<DanceStep> {
    vec![
        DanceStep {
            announce: Some("victory lap"),
            ..step(SPIN_LEFT, 10)
        },
        step(DriveDemand::HALT, 20),
        step(ARC_RIGHT, 15),
        step(ARC_LEFT, 15),
        step(FORWARD, 20),
        step(BACKWARD, 20),
        step(SPIN_RIGHT, 40),
        step(SPIN_LEFT, 30),
        step(SPIN_RIGHT, 30),
        step(ARC_RIGHT, 15),
        step(ARC_LEFT, 15),
        step(BACKWARD, 20),
        step(FORWARD, 20),
        step(SPIN_RIGHT, 50),
        step(SPIN_LEFT, 50),
    ]
}
