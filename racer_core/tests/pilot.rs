use std::collections::VecDeque;
use std::error::Error;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use racer_core::{DriveCommand, Pilot, PilotMode, TickOutcome, Tuning};
use racer_traits::clock::Clock;
use racer_traits::{Detection, Drive, Feature, Vision};
use rstest::rstest;

/// One scripted frame: fresh with detections, or no new frame.
#[derive(Clone)]
enum Frame {
    Fresh(Vec<Detection>),
    Stale,
}

/// Vision that replays a scripted frame per `wait_frame` call, then repeats
/// a fallback frame forever.
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

/// Drive spy recording every commanded wheel-speed pair.
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

/// Manually advanced clock shared between the test and the pilot.
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

fn running(outcome: TickOutcome) -> racer_core::TickReport {
    match outcome {
        TickOutcome::Running(report) => report,
        other => panic!("expected Running, got {other:?}"),
    }
}

#[test]
fn first_tracking_tick_primes_pan_and_drives() {
    let vision = ScriptedVision::new([Frame::Fresh(vec![center_line(100)])], Frame::Stale);
    let pan_log = vision.pan_log();
    let drive = RecordingDrive::default();
    let speeds = drive.log();

    let mut pilot = Pilot::new(vision, drive, Tuning::default()).expect("pilot build");
    let report = running(pilot.step().expect("step"));

    assert_eq!(report.mode, PilotMode::Tracking);
    assert!(report.saw_line);
    // Line at x=100, image center 160
    assert_eq!(report.tracking_error, 60);
    // First update only primes the derivative; pan holds center
    assert_eq!(report.pan_pos, 500);
    assert_eq!(*pan_log.lock().unwrap(), vec![500]);
    // diff = 0.4 + 60/300 = 0.6; shared = (1-0.6)*1.0*480 = 192 per wheel
    assert_eq!(*speeds.lock().unwrap(), vec![(192, 192)]);
}

#[test]
fn second_tick_moves_pan_by_fixed_point_velocity() {
    let vision = ScriptedVision::new(
        [
            Frame::Fresh(vec![center_line(100)]),
            Frame::Fresh(vec![center_line(100)]),
        ],
        Frame::Stale,
    );
    let drive = RecordingDrive::default();

    let mut pilot = Pilot::new(vision, drive, Tuning::default()).expect("pilot build");
    let _ = running(pilot.step().expect("step 1"));
    let report = running(pilot.step().expect("step 2"));

    // vel = (60*300 + 0*500) >> 10 = 17
    assert_eq!(report.pan_pos, 517);
}

#[rstest]
#[case::prefers_second(vec![center_line(100), center_line(200)], -40)]
#[case::falls_back_to_only(vec![center_line(100)], 60)]
fn steering_target_selection(#[case] detections: Vec<Detection>, #[case] expected_error: i32) {
    let vision = ScriptedVision::new([Frame::Fresh(detections)], Frame::Stale);
    let drive = RecordingDrive::default();

    let mut pilot = Pilot::new(vision, drive, Tuning::default()).expect("pilot build");
    let report = running(pilot.step().expect("step"));

    assert!(report.saw_line);
    assert_eq!(report.tracking_error, expected_error);
}

#[test]
fn far_field_line_detections_are_ignored() {
    // y below the horizon row (60) is past the horizon for line features
    let noise = Detection {
        y: 30,
        ..center_line(100)
    };
    let vision = ScriptedVision::new([Frame::Fresh(vec![noise])], Frame::Stale);
    let drive = RecordingDrive::default();

    let mut pilot = Pilot::new(vision, drive, Tuning::default()).expect("pilot build");
    let report = running(pilot.step().expect("step"));

    assert!(!report.saw_line);
    assert_eq!(report.mode, PilotMode::Searching);
}

#[test]
fn kill_check_halts_with_zeroed_motors_and_latches() {
    let kill = Arc::new(AtomicBool::new(false));
    let kill_ref = kill.clone();

    let vision = ScriptedVision::new([], Frame::Fresh(vec![center_line(160)]));
    let drive = RecordingDrive::default();
    let speeds = drive.log();

    let mut pilot = Pilot::new(vision, drive, Tuning::default())
        .expect("pilot build")
        .with_kill_check(move || kill_ref.load(Ordering::Relaxed));

    // Normal tick first
    let report = running(pilot.step().expect("step 1"));
    assert_eq!(report.mode, PilotMode::Tracking);

    // Kill lands mid-run; the very next command is a stop
    kill.store(true, Ordering::Relaxed);
    match pilot.step().expect("step 2") {
        TickOutcome::Halted(reason) => {
            assert_eq!(reason, racer_core::HaltReason::Kill);
        }
        other => panic!("expected Halted, got {other:?}"),
    }
    assert_eq!(*speeds.lock().unwrap().last().unwrap(), (0, 0));
    assert_eq!(pilot.mode(), PilotMode::Halted);

    // Clearing the flag does not revive a latched kill
    kill.store(false, Ordering::Relaxed);
    match pilot.step().expect("step 3") {
        TickOutcome::Halted(reason) => {
            assert_eq!(reason, racer_core::HaltReason::Kill);
        }
        other => panic!("expected latched Halted, got {other:?}"),
    }

    // begin() clears the latch for a fresh run
    pilot.begin();
    let report = running(pilot.step().expect("step 4"));
    assert_eq!(report.mode, PilotMode::Tracking);
}

#[test]
fn dry_run_keeps_wheels_stopped() {
    let vision = ScriptedVision::new([Frame::Fresh(vec![center_line(100)])], Frame::Stale);
    let drive = RecordingDrive::default();
    let speeds = drive.log();

    let mut pilot = Pilot::new(vision, drive, Tuning::default())
        .expect("pilot build")
        .with_move_enabled(false);
    let report = running(pilot.step().expect("step"));

    // Full perception path runs, but the command is replaced by a stop
    assert_eq!(report.mode, PilotMode::Tracking);
    assert_eq!(report.command, DriveCommand::STOP);
    assert_eq!(*speeds.lock().unwrap(), vec![(0, 0)]);
}

#[test]
fn stale_frames_hold_then_stop_past_timeout() {
    let clock = TestClock::new();
    let vision = ScriptedVision::new([Frame::Fresh(vec![center_line(100)])], Frame::Stale);
    let drive = RecordingDrive::default();
    let speeds = drive.log();

    let mut pilot = Pilot::new(vision, drive, Tuning::default())
        .expect("pilot build")
        .with_clock(Box::new(clock.clone()));

    let _ = running(pilot.step().expect("step 1"));
    assert_eq!(speeds.lock().unwrap().len(), 1);

    // One missed frame inside the window: hold the last command
    clock.advance_ms(100);
    let report = running(pilot.step().expect("step 2"));
    assert!(!report.fresh_frame);
    assert_eq!(speeds.lock().unwrap().len(), 1, "no command on brief gap");

    // Frames still missing past the lost timeout: stop driving blind
    clock.advance_ms(501);
    let report = running(pilot.step().expect("step 3"));
    assert!(!report.fresh_frame);
    assert_eq!(report.mode, PilotMode::Searching);
    assert_eq!(*speeds.lock().unwrap().last().unwrap(), (0, 0));
}

#[test]
fn detection_fault_zeroes_motors_before_unwinding() {
    struct FaultyVision;
    impl Vision for FaultyVision {
        fn wait_frame(&mut self, _t: Duration) -> Result<bool, Box<dyn Error + Send + Sync>> {
            Ok(true)
        }
        fn detections(
            &mut self,
            _max: usize,
        ) -> Result<Vec<Detection>, Box<dyn Error + Send + Sync>> {
            Err("sensor exploded".into())
        }
        fn set_pan(&mut self, _pos: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
            Ok(())
        }
        fn brightness(&mut self) -> Result<u8, Box<dyn Error + Send + Sync>> {
            Ok(185)
        }
        fn set_brightness(&mut self, _level: u8) -> Result<(), Box<dyn Error + Send + Sync>> {
            Ok(())
        }
    }

    let drive = RecordingDrive::default();
    let speeds = drive.log();
    let mut pilot = Pilot::new(FaultyVision, drive, Tuning::default()).expect("pilot build");

    let err = pilot.step().expect_err("step should fail");
    let msg = format!("{err:#}");
    assert!(msg.contains("reading detections"), "unexpected error: {msg}");
    assert!(msg.contains("sensor"), "unexpected error: {msg}");
    assert_eq!(
        *speeds.lock().unwrap(),
        vec![(0, 0)],
        "motors must be zeroed on the fault path"
    );
}

#[test]
fn frame_wait_fault_maps_to_timeout_and_stops() {
    struct TimedOutVision;
    impl Vision for TimedOutVision {
        fn wait_frame(&mut self, _t: Duration) -> Result<bool, Box<dyn Error + Send + Sync>> {
            Err("uart read timeout".into())
        }
        fn detections(
            &mut self,
            _max: usize,
        ) -> Result<Vec<Detection>, Box<dyn Error + Send + Sync>> {
            Ok(Vec::new())
        }
        fn set_pan(&mut self, _pos: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
            Ok(())
        }
        fn brightness(&mut self) -> Result<u8, Box<dyn Error + Send + Sync>> {
            Ok(185)
        }
        fn set_brightness(&mut self, _level: u8) -> Result<(), Box<dyn Error + Send + Sync>> {
            Ok(())
        }
    }

    let drive = RecordingDrive::default();
    let speeds = drive.log();
    let mut pilot = Pilot::new(TimedOutVision, drive, Tuning::default()).expect("pilot build");

    let err = pilot.step().expect_err("step should fail");
    let msg = format!("{err:#}").to_lowercase();
    assert!(msg.contains("timeout"), "unexpected error: {msg}");
    assert_eq!(*speeds.lock().unwrap(), vec![(0, 0)]);
}

#[test]
fn rejects_nonsense_tuning() {
    let vision = ScriptedVision::new([], Frame::Stale);
    let drive = RecordingDrive::default();
    let tuning = Tuning {
        pilot: racer_core::PilotCfg {
            lookahead: 7,
            ..Default::default()
        },
        ..Default::default()
    };

    let err = match Pilot::new(vision, drive, tuning) {
        Ok(_) => panic!("build should fail"),
        Err(e) => e,
    };
    assert!(format!("{err}").contains("lookahead"));
}
