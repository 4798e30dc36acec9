use std::sync::atomic::{AtomicBool, Ordering};

use racer_traits::{Drive, Vision};

use crate::control::Pilot;
use crate::error::{HaltReason, Result};
use crate::status::{PilotMode, TickOutcome, TickReport};

/// Knobs for one driving session. The caller pre-merges CLI overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunParams {
    /// Stop after this many ticks; `None` runs until halted.
    pub max_ticks: Option<u64>,
    /// Give up after this many consecutive failed pan sweeps; 0 disables.
    pub max_search_failures: u32,
    /// Play the choreography after a kill-signal halt.
    pub finale: bool,
    /// Run the brightness ladder before the first tick.
    pub probe_brightness: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub frames_seen: u64,
    pub recoveries: u64,
    pub sweep_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub halt: HaltReason,
    pub stats: RunStats,
}

#[inline]
fn tick_limit_reached(limit: Option<u64>, ticks: u64) -> bool {
    limit.is_some_and(|cap| ticks >= cap)
}

#[inline]
fn search_exhausted(cap: u32, consecutive_failures: u32) -> bool {
    cap > 0 && consecutive_failures >= cap
}

#[inline]
fn tally(stats: &mut RunStats, prev_mode: PilotMode, report: &TickReport) {
    stats.ticks += 1;
    if report.fresh_frame {
        stats.frames_seen += 1;
    }
    if report.mode == PilotMode::Recovering && prev_mode != PilotMode::Recovering {
        stats.recoveries += 1;
    }
    if report.search_failed {
        stats.sweep_failures += 1;
    }
}

/// Drive until halted, the shutdown flag flips, or a limit trips.
/// Motors are zeroed on every exit path, including the error one inside
/// `Pilot::step`.
pub fn run<V, D>(
    pilot: &mut Pilot<V, D>,
    params: &RunParams,
    shutdown: &AtomicBool,
) -> Result<RunOutcome>
where
    V: Vision,
    D: Drive,
{
    if params.probe_brightness {
        match pilot.ensure_brightness() {
            Ok(Some(level)) => tracing::info!(level, "camera brightness settled"),
            Ok(None) => tracing::warn!("no workable camera brightness found"),
            Err(e) => {
                pilot.halt_motors();
                return Err(e);
            }
        }
    }

    pilot.begin();
    tracing::info!(?params, "run start");

    let mut stats = RunStats::default();
    let mut consecutive_failures: u32 = 0;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            pilot.halt_motors();
            tracing::info!(ticks = stats.ticks, "run interrupted");
            return Ok(RunOutcome {
                halt: HaltReason::Interrupt,
                stats,
            });
        }
        if tick_limit_reached(params.max_ticks, stats.ticks) {
            pilot.halt_motors();
            tracing::info!(ticks = stats.ticks, "tick limit reached");
            return Ok(RunOutcome {
                halt: HaltReason::TickLimit,
                stats,
            });
        }

        let prev_mode = pilot.mode();
        match pilot.step()? {
            TickOutcome::Halted(reason) => {
                if params.finale && reason == HaltReason::Kill {
                    pilot.perform_finale(shutdown)?;
                }
                tracing::info!(%reason, ticks = stats.ticks, "run halted");
                return Ok(RunOutcome {
                    halt: reason,
                    stats,
                });
            }
            TickOutcome::Running(report) => {
                tally(&mut stats, prev_mode, &report);
                if report.saw_line {
                    consecutive_failures = 0;
                } else if report.search_failed {
                    consecutive_failures += 1;
                }
                if search_exhausted(params.max_search_failures, consecutive_failures) {
                    pilot.halt_motors();
                    tracing::warn!(
                        failures = consecutive_failures,
                        "search budget exhausted, giving up"
                    );
                    return Ok(RunOutcome {
                        halt: HaltReason::SearchExhausted,
                        stats,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PilotMode, RunStats, TickReport, search_exhausted, tally, tick_limit_reached};
    use crate::drive::DriveCommand;

    fn report(mode: PilotMode, fresh: bool, failed: bool) -> TickReport {
        TickReport {
            mode,
            fresh_frame: fresh,
            saw_line: false,
            tracking_error: 0,
            pan_pos: 500,
            bias: 0.0,
            throttle: 0.0,
            command: DriveCommand::STOP,
            search_failed: failed,
        }
    }

    #[test]
    fn tick_limit_only_fires_when_set() {
        assert!(!tick_limit_reached(None, u64::MAX));
        assert!(!tick_limit_reached(Some(10), 9));
        assert!(tick_limit_reached(Some(10), 10));
    }

    #[test]
    fn zero_search_cap_never_exhausts() {
        assert!(!search_exhausted(0, u32::MAX));
        assert!(!search_exhausted(3, 2));
        assert!(search_exhausted(3, 3));
    }

    #[test]
    fn tally_counts_recovery_entries_not_ticks() {
        let mut stats = RunStats::default();
        tally(
            &mut stats,
            PilotMode::Tracking,
            &report(PilotMode::Recovering, true, false),
        );
        tally(
            &mut stats,
            PilotMode::Recovering,
            &report(PilotMode::Recovering, true, true),
        );
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.recoveries, 1);
        assert_eq!(stats.sweep_failures, 1);
    }

    #[test]
    fn tally_separates_fresh_and_stale_frames() {
        let mut stats = RunStats::default();
        tally(
            &mut stats,
            PilotMode::Searching,
            &report(PilotMode::Searching, false, false),
        );
        tally(
            &mut stats,
            PilotMode::Searching,
            &report(PilotMode::Tracking, true, false),
        );
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.frames_seen, 1);
    }
}
