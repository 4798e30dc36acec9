//! Lost-line recovery behavior: the timed transition into recovery, the
//! history-vote blind turn, the pan sweep, and the retreat after an empty
//! sweep.

use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use racer_core::{Pilot, PilotMode, TickOutcome, Tuning};
use racer_traits::clock::Clock;
use racer_traits::{Detection, Drive, Feature, Vision};

#[derive(Clone)]
enum Frame {
    Fresh(Vec<Detection>),
    Stale,
}

struct ScriptedVision {
    script: VecDeque<Frame>,
    fallback: Frame,
    pending: Vec<Detection>,
    pan_log: Arc<Mutex<Vec<u16>>>,
}

impl ScriptedVision {
    fn new(script: impl Into<VecDeque<Frame>>, fallback: Frame) -> Self {
        Self {
            script: script.into(),
            fallback,
            pending: Vec::new(),
            pan_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn pan_log(&self) -> Arc<Mutex<Vec<u16>>> {
        self.pan_log.clone()
    }
}

impl Vision for ScriptedVision {
    fn wait_frame(&mut self, _timeout: Duration) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let frame = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match frame {
            Frame::Fresh(d) => {
                self.pending = d;
                Ok(true)
            }
            Frame::Stale => Ok(false),
        }
    }

    fn detections(&mut self, max: usize) -> Result<Vec<Detection>, Box<dyn Error + Send + Sync>> {
        Ok(self.pending.iter().copied().take(max).collect())
    }

    fn set_pan(&mut self, pos: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.pan_log.lock().unwrap().push(pos);
        Ok(())
    }

    fn brightness(&mut self) -> Result<u8, Box<dyn Error + Send + Sync>> {
        Ok(185)
    }

    fn set_brightness(&mut self, _level: u8) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingDrive {
    log: Arc<Mutex<Vec<(i16, i16)>>>,
}

impl RecordingDrive {
    fn log(&self) -> Arc<Mutex<Vec<(i16, i16)>>> {
        self.log.clone()
    }
}

impl Drive for RecordingDrive {
    fn set_speeds(&mut self, left: i16, right: i16) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.log.lock().unwrap().push((left, right));
        Ok(())
    }
}

#[derive(Clone)]
struct TestClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl TestClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    fn advance_ms(&self, ms: u64) {
        *self.offset.lock().unwrap() += Duration::from_millis(ms);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap()
    }

    fn sleep(&self, d: Duration) {
        *self.offset.lock().unwrap() += d;
    }
}

fn center_line(x: u16) -> Detection {
    Detection {
        feature: Feature::CenterLine,
        x,
        y: 100,
        width: 10,
        height: 12,
    }
}

fn left_line(x: u16) -> Detection {
    Detection {
        feature: Feature::LeftLine,
        x,
        y: 100,
        width: 8,
        height: 40,
    }
}

fn right_line(x: u16) -> Detection {
    Detection {
        feature: Feature::RightLine,
        x,
        y: 100,
        width: 8,
        height: 40,
    }
}

fn running(outcome: TickOutcome) -> racer_core::TickReport {
    match outcome {
        TickOutcome::Running(report) => report,
        other => panic!("expected Running, got {other:?}"),
    }
}

#[test]
fn brief_loss_waits_in_place() {
    let clock = TestClock::new();
    let vision = ScriptedVision::new(
        [Frame::Fresh(vec![center_line(100)]), Frame::Fresh(vec![])],
        Frame::Stale,
    );
    let drive = RecordingDrive::default();
    let speeds = drive.log();

    let mut pilot = Pilot::new(vision, drive, Tuning::default())
        .expect("pilot build")
        .with_clock(Box::new(clock.clone()));

    let _ = running(pilot.step().expect("step 1"));
    clock.advance_ms(100);
    let report = running(pilot.step().expect("step 2"));

    // Inside the timeout window: hold still, no recovery yet
    assert_eq!(report.mode, PilotMode::Searching);
    assert!(!report.search_failed);
    assert_eq!(*speeds.lock().unwrap().last().unwrap(), (0, 0));
}

#[test]
fn history_vote_spins_toward_last_seen_side() {
    let clock = TestClock::new();
    // Left-edge markers visible but no center line: history fills with
    // left-leaning sightings while the pilot waits in place.
    let vision = ScriptedVision::new([], Frame::Fresh(vec![left_line(40)]));
    let pan_log = vision.pan_log();
    let drive = RecordingDrive::default();
    let speeds = drive.log();

    let mut pilot = Pilot::new(vision, drive, Tuning::default())
        .expect("pilot build")
        .with_clock(Box::new(clock.clone()));

    for _ in 0..3 {
        let report = running(pilot.step().expect("waiting step"));
        assert_eq!(report.mode, PilotMode::Searching);
        clock.advance_ms(100);
    }

    clock.advance_ms(300);
    let report = running(pilot.step().expect("recovery step"));

    assert_eq!(report.mode, PilotMode::Recovering);
    assert!(!report.search_failed);
    assert_eq!(report.bias, -1.0);
    // Pure spin toward the left at half throttle: 0.5 * 480 per side
    assert_eq!(*speeds.lock().unwrap().last().unwrap(), (-240, 240));
    // Head recentered for the turn
    assert_eq!(*pan_log.lock().unwrap().last().unwrap(), 500);

    // The blind turn gets a fresh timeout window before escalating again
    clock.advance_ms(100);
    let report = running(pilot.step().expect("post-recovery step"));
    assert_eq!(report.mode, PilotMode::Searching);
}

#[test]
fn history_vote_spins_right_for_right_markers() {
    let clock = TestClock::new();
    let vision = ScriptedVision::new([], Frame::Fresh(vec![right_line(280)]));
    let drive = RecordingDrive::default();
    let speeds = drive.log();

    let mut pilot = Pilot::new(vision, drive, Tuning::default())
        .expect("pilot build")
        .with_clock(Box::new(clock.clone()));

    for _ in 0..3 {
        let _ = running(pilot.step().expect("waiting step"));
        clock.advance_ms(100);
    }
    clock.advance_ms(300);
    let report = running(pilot.step().expect("recovery step"));

    assert_eq!(report.mode, PilotMode::Recovering);
    assert_eq!(report.bias, 1.0);
    assert_eq!(*speeds.lock().unwrap().last().unwrap(), (240, -240));
}

#[test]
fn tied_history_sweeps_and_reacquires() {
    let clock = TestClock::new();
    // One good frame, one empty frame past the timeout; every sweep probe
    // then sees the line off to the right of center.
    let vision = ScriptedVision::new(
        [Frame::Fresh(vec![center_line(160)]), Frame::Fresh(vec![])],
        Frame::Fresh(vec![center_line(200)]),
    );
    let pan_log = vision.pan_log();
    let drive = RecordingDrive::default();

    let mut pilot = Pilot::new(vision, drive, Tuning::default())
        .expect("pilot build")
        .with_clock(Box::new(clock.clone()));

    let _ = running(pilot.step().expect("step 1"));
    clock.advance_ms(501);
    let report = running(pilot.step().expect("recovery step"));

    // Sweep found the line at its first probe position
    assert_eq!(report.mode, PilotMode::Tracking);
    assert!(report.saw_line);
    assert_eq!(report.tracking_error, -40);
    assert_eq!(report.pan_pos, 0);
    // Reacquire throttle 0.9 cut by min(|{-40}|/40, 0.8) = 0.8
    assert!((report.throttle - 0.1).abs() < 1e-5);
    // Tracking pan first, then a single sweep probe at the travel minimum
    assert_eq!(*pan_log.lock().unwrap(), vec![500, 0]);

    // Line still in view on the next frame: normal tracking resumes
    clock.advance_ms(100);
    let report = running(pilot.step().expect("post-reacquire step"));
    assert_eq!(report.mode, PilotMode::Tracking);
    assert!(report.saw_line);
}

#[test]
fn empty_sweep_retreats_and_reports_failure() {
    let clock = TestClock::new();
    let vision = ScriptedVision::new(
        [Frame::Fresh(vec![center_line(160)]), Frame::Fresh(vec![])],
        Frame::Fresh(vec![]),
    );
    let pan_log = vision.pan_log();
    let drive = RecordingDrive::default();
    let speeds = drive.log();

    let mut pilot = Pilot::new(vision, drive, Tuning::default())
        .expect("pilot build")
        .with_clock(Box::new(clock.clone()));

    let _ = running(pilot.step().expect("step 1"));
    clock.advance_ms(501);
    let report = running(pilot.step().expect("recovery step"));

    assert_eq!(report.mode, PilotMode::Recovering);
    assert!(report.search_failed);
    // Straight back at half throttle
    assert_eq!(*speeds.lock().unwrap().last().unwrap(), (-240, -240));

    // Sweep visited the whole travel range in fixed steps, then recentered
    let log = pan_log.lock().unwrap();
    // 1 tracking pan + 101 probes (0..=1000 step 10) + 1 recenter
    assert_eq!(log.len(), 103);
    assert_eq!(log[1], 0);
    assert_eq!(log[101], 1000);
    assert_eq!(*log.last().unwrap(), 500);
    drop(log);

    // The retreat rearms the timer; the loop reports failure once, not
    // every tick after
    clock.advance_ms(100);
    let report = running(pilot.step().expect("post-retreat step"));
    assert_eq!(report.mode, PilotMode::Searching);
    assert!(!report.search_failed);
}
