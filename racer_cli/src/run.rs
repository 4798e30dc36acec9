//! Run orchestration: config mapping, collaborator assembly, loop execution.

use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(not(feature = "hardware"))]
use std::time::Duration;
use std::time::Instant;

use racer_core::error::Result as CoreResult;
use racer_core::runner::{self, RunOutcome, RunParams};
use racer_core::{HaltReason, KillSwitchListener, Pilot, Speaker, Tuning};
use racer_traits::clock::MonotonicClock;
#[cfg(not(feature = "hardware"))]
use racer_traits::Detection;
use racer_traits::{Drive, KillSwitch, Vision};

use crate::cli::{CliLimits, LAST_LIMITS, RtLock};
use crate::rt::setup_rt_once;

pub fn halt_reason_name(r: HaltReason) -> &'static str {
    match r {
        HaltReason::Kill => "Kill",
        HaltReason::Interrupt => "Interrupt",
        HaltReason::TickLimit => "TickLimit",
        HaltReason::SearchExhausted => "SearchExhausted",
    }
}

/// Flags from the `run` subcommand, post-parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    pub max_ticks: Option<u64>,
    pub max_search_failures: Option<u32>,
    pub lookahead: Option<usize>,
    pub no_move: bool,
    pub chatty: bool,
    pub bright: bool,
    pub finale: bool,
    pub stats: bool,
    pub rt: bool,
    pub rt_prio: Option<i32>,
    pub rt_lock: Option<RtLock>,
    pub rt_cpu: Option<usize>,
}

/// Everything the summary output needs from a finished run.
pub struct RaceSummary {
    pub outcome: RunOutcome,
    pub duration_ms: u64,
}

pub fn run_race(
    cfg: &racer_config::Config,
    flags: &RunFlags,
    hw: (impl Vision + 'static, impl Drive + 'static),
    switch: Option<impl KillSwitch + Send + 'static>,
    shutdown: &AtomicBool,
) -> CoreResult<RaceSummary> {
    // Real-time setup runs once per process, before the first tick.
    let mode = flags.rt_lock.unwrap_or_else(RtLock::os_default);
    setup_rt_once(flags.rt, flags.rt_prio, mode, flags.rt_cpu);

    let mut tuning = Tuning::from(cfg);
    if let Some(n) = flags.lookahead {
        tuning.pilot.lookahead = n;
    }
    // 0 means unbounded for both limits
    let max_ticks = flags.max_ticks.filter(|&n| n > 0);
    let max_search_failures = flags
        .max_search_failures
        .unwrap_or(cfg.runner.max_search_failures);

    let _ = LAST_LIMITS.set(CliLimits {
        lost_timeout_ms: tuning.pilot.lost_timeout_ms,
        max_ticks,
        max_search_failures,
    });

    let (vision, drive) = hw;
    let mut pilot = Pilot::new(vision, drive, tuning)?.with_move_enabled(!flags.no_move);

    if flags.chatty || cfg.speech.enabled {
        let speaker = Speaker::spawn(
            racer_hardware::LogNotifier,
            (&cfg.speech).into(),
            MonotonicClock::new(),
        );
        pilot = pilot.with_speaker(speaker);
    }

    // The listener owns the serial side channel on its own thread; the
    // pilot polls just the flag. It must outlive the run loop.
    let listener = switch
        .map(|s| KillSwitchListener::spawn(s, (&cfg.kill).into(), MonotonicClock::new()));
    if let Some(l) = &listener {
        let flag = l.flag();
        pilot = pilot.with_kill_check(move || flag.load(Ordering::Relaxed));
    }

    let params = RunParams {
        max_ticks,
        max_search_failures,
        finale: flags.finale,
        probe_brightness: flags.bright || cfg.brightness.enabled,
    };

    let started = Instant::now();
    let outcome = runner::run(&mut pilot, &params, shutdown)?;
    let duration_ms = started.elapsed().as_millis() as u64;

    if flags.stats {
        print_stats(&outcome, duration_ms);
    }
    Ok(RaceSummary {
        outcome,
        duration_ms,
    })
}

/// Print run statistics to stderr.
fn print_stats(outcome: &RunOutcome, duration_ms: u64) {
    let s = &outcome.stats;
    let tick_rate = if duration_ms > 0 {
        s.ticks as f64 * 1000.0 / duration_ms as f64
    } else {
        0.0
    };
    eprintln!("ticks:          {}", s.ticks);
    eprintln!(
        "frames seen:    {} ({} stale ticks)",
        s.frames_seen,
        s.ticks - s.frames_seen
    );
    eprintln!("recoveries:     {}", s.recoveries);
    eprintln!("failed sweeps:  {}", s.sweep_failures);
    eprintln!("halt:           {}", outcome.halt);
    eprintln!("tick rate:      {tick_rate:.1}/s over {duration_ms} ms");
}

// Doctored sim backends, selected through env seams so failure paths can
// be exercised from outside the process.
#[cfg(not(feature = "hardware"))]
const ENV_SIM_BLIND: &str = "RACER_TEST_SIM_BLIND";
#[cfg(not(feature = "hardware"))]
const ENV_SIM_TIMEOUT: &str = "RACER_TEST_SIM_TIMEOUT";
#[cfg(not(feature = "hardware"))]
const ENV_KILL_AFTER_MS: &str = "RACER_TEST_KILL_AFTER_MS";

#[cfg(not(feature = "hardware"))]
pub fn sim_vision() -> Box<dyn Vision + Send> {
    if std::env::var_os(ENV_SIM_TIMEOUT).is_some() {
        return Box::new(SilentVision);
    }
    if std::env::var_os(ENV_SIM_BLIND).is_some() {
        return Box::new(BlindVision {
            brightness: racer_hardware::DEFAULT_BRIGHTNESS,
        });
    }
    Box::new(racer_hardware::SimulatedVision::new())
}

#[cfg(not(feature = "hardware"))]
pub fn sim_kill_switch() -> Box<dyn KillSwitch + Send> {
    if let Some(ms) = std::env::var(ENV_KILL_AFTER_MS)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Box::new(DelayedKill {
            armed: Instant::now(),
            after: Duration::from_millis(ms),
        });
    }
    Box::new(racer_hardware::IdleKillSwitch)
}

/// Vision whose frame wait fails as if the sensor went mute.
#[cfg(not(feature = "hardware"))]
struct SilentVision;

#[cfg(not(feature = "hardware"))]
impl Vision for SilentVision {
    fn wait_frame(
        &mut self,
        _timeout: Duration,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Err(racer_hardware::error::HwError::FrameTimeout.into())
    }

    fn detections(
        &mut self,
        _max: usize,
    ) -> Result<Vec<Detection>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Vec::new())
    }

    fn set_pan(&mut self, _pos: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    fn brightness(&mut self) -> Result<u8, Box<dyn std::error::Error + Send + Sync>> {
        Ok(racer_hardware::DEFAULT_BRIGHTNESS)
    }

    fn set_brightness(
        &mut self,
        _level: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// Vision that delivers frames on time but never sees anything.
#[cfg(not(feature = "hardware"))]
struct BlindVision {
    brightness: u8,
}

#[cfg(not(feature = "hardware"))]
impl Vision for BlindVision {
    fn wait_frame(
        &mut self,
        timeout: Duration,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        std::thread::sleep(timeout);
        Ok(true)
    }

    fn detections(
        &mut self,
        _max: usize,
    ) -> Result<Vec<Detection>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Vec::new())
    }

    fn set_pan(&mut self, _pos: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
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

/// Kill switch that fires a token a fixed delay after construction.
#[cfg(not(feature = "hardware"))]
struct DelayedKill {
    armed: Instant,
    after: Duration,
}

#[cfg(not(feature = "hardware"))]
impl KillSwitch for DelayedKill {
    fn poll(&mut self) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        if self.armed.elapsed() >= self.after {
            return Ok(Some("stop".to_string()));
        }
        Ok(None)
    }
}
