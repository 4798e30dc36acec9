//! The per-tick orchestrator.
//!
//! `Pilot` owns the vision and drive collaborators plus all controller
//! state, and advances one tick per `step` call: pull a frame, classify it,
//! track the line through the pan servo and steering PID, and command the
//! drivetrain. When the line stays gone past the timeout it falls back to a
//! history-vote blind turn, then an active pan sweep, then a short retreat.
//! A latched kill check halts it for good.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use racer_traits::clock::{Clock, MonotonicClock};
use racer_traits::{Detection, Drive, Feature, Vision};

use crate::config::Tuning;
use crate::dance;
use crate::drive::{DriveCommand, DriveDemand, DriveMixer};
use crate::error::{BuildError, HaltReason, Result, map_actuator_error, map_vision_error};
use crate::history::{Lean, RecentHistory};
use crate::pid::Pid;
use crate::scene::{self, SceneSnapshot};
use crate::servo::ServoLoop;
use crate::speech::Speaker;
use crate::standoff;
use crate::status::{PilotMode, TickOutcome, TickReport};

/// Largest throttle cut the reacquire ramp may apply, so the vehicle always
/// creeps back onto the line instead of freezing on a big error.
const MAX_REACQUIRE_CUT: f32 = 0.8;

pub struct Pilot<V: Vision, D: Drive> {
    vision: V,
    drive: D,
    tuning: Tuning,
    servo: ServoLoop,
    steer: Pid,
    mixer: DriveMixer,
    history: RecentHistory,
    // Unified clock for deterministic time in tests
    clock: Arc<dyn Clock + Send + Sync>,
    // Epoch Instant for computing monotonic milliseconds
    epoch: Instant,
    mode: PilotMode,
    // Tick times (ms since epoch) of the last guide-line sighting and the
    // last fresh frame
    last_seen_ms: u64,
    last_frame_ms: u64,
    // Optional kill callback; once it returns true the pilot stays halted
    kill_check: Option<Box<dyn Fn() -> bool>>,
    kill_latched: bool,
    // When false, every command is replaced by a stop (dry-run)
    move_enabled: bool,
    speaker: Option<Speaker>,
}

impl<V: Vision, D: Drive> core::fmt::Debug for Pilot<V, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pilot")
            .field("mode", &self.mode)
            .field("pan_pos", &self.servo.position())
            .field("kill_latched", &self.kill_latched)
            .finish()
    }
}

impl<V: Vision, D: Drive> Pilot<V, D> {
    pub fn new(vision: V, drive: D, tuning: Tuning) -> Result<Self> {
        validate(&tuning)?;
        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
        let epoch = clock.now();
        Ok(Self {
            vision,
            drive,
            servo: ServoLoop::new(tuning.servo),
            steer: Pid::new(tuning.steer),
            mixer: DriveMixer::new(tuning.drive),
            history: RecentHistory::new(tuning.recovery.history_len),
            tuning,
            clock,
            epoch,
            mode: PilotMode::Searching,
            last_seen_ms: 0,
            last_frame_ms: 0,
            kill_check: None,
            kill_latched: false,
            move_enabled: true,
            speaker: None,
        })
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Arc::from(clock);
        self.epoch = self.clock.now();
        self
    }

    /// Wire in a kill check polled at the top of every tick.
    pub fn with_kill_check<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.kill_check = Some(Box::new(f));
        self
    }

    pub fn with_speaker(mut self, speaker: Speaker) -> Self {
        self.speaker = Some(speaker);
        self
    }

    /// Disable motion while keeping the full perception and control path.
    pub fn with_move_enabled(mut self, enabled: bool) -> Self {
        self.move_enabled = enabled;
        self
    }

    #[inline]
    pub fn mode(&self) -> PilotMode {
        self.mode
    }

    #[inline]
    pub fn pan_position(&self) -> i32 {
        self.servo.position()
    }

    #[inline]
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Reset per-run state. Call before the first tick of a run.
    pub fn begin(&mut self) {
        self.epoch = self.clock.now();
        self.servo.reset();
        self.steer.set_point(0.0);
        self.history.clear();
        self.mode = PilotMode::Searching;
        self.last_seen_ms = 0;
        self.last_frame_ms = 0;
        self.kill_latched = false;
    }

    /// One tick: frame in, command out. On error the motors are zeroed
    /// before the error unwinds.
    pub fn step(&mut self) -> Result<TickOutcome> {
        match self.step_inner() {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.halt_motors();
                Err(e)
            }
        }
    }

    fn step_inner(&mut self) -> Result<TickOutcome> {
        if self.killed() {
            return Ok(self.halt(HaltReason::Kill));
        }

        let now = self.now_ms();
        let timeout = Duration::from_millis(self.tuning.pilot.tick_ms);
        let fresh = self
            .vision
            .wait_frame(timeout)
            .map_err(|e| crate::error::Report::new(map_vision_error(&*e)))
            .wrap_err("waiting for frame")?;
        if !fresh {
            return self.stale_frame_tick(now);
        }
        self.last_frame_ms = now;

        let detections = self.fetch_detections()?;
        let snapshot =
            SceneSnapshot::classify(&detections, &self.tuning.scene, self.tuning.pilot.lookahead);
        self.history.push(
            snapshot.count(Feature::LeftLine) as u32,
            snapshot.count(Feature::RightLine) as u32,
        );

        if self.tuning.standoff.enabled
            && let Some(obstacle) = snapshot.first_obstacle().copied()
        {
            return self.standoff_tick(obstacle, snapshot.sees_guide_line(), now);
        }

        if snapshot.sees_guide_line() {
            return self.tracking_tick(&snapshot, now);
        }
        self.lost_tick(now)
    }

    /// Run the brightness ladder until classification becomes usable.
    /// `None` means no level worked and the original was restored.
    pub fn ensure_brightness(&mut self) -> Result<Option<u8>> {
        let timeout = Duration::from_millis(self.tuning.pilot.tick_ms);
        scene::probe_brightness(
            &mut self.vision,
            &self.tuning.scene,
            &self.tuning.brightness,
            self.tuning.pilot.lookahead,
            timeout,
        )
    }

    /// Play the finale choreography, interruptible via `shutdown`.
    /// Runs after a kill halt, so the kill latch is deliberately not
    /// consulted here. Motors are zeroed afterwards.
    pub fn perform_finale(&mut self, shutdown: &AtomicBool) -> Result<()> {
        tracing::info!("performing finale routine");
        for step in dance::routine() {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            if let Some(text) = step.announce {
                self.say(text);
            }
            if let Err(e) = self.send(step.demand).wrap_err("finale step") {
                self.halt_motors();
                return Err(e);
            }
            self.clock.sleep(step.hold);
        }
        self.halt_motors();
        Ok(())
    }

    /// Best-effort zero-speed command; failures are logged, not propagated.
    pub fn halt_motors(&mut self) {
        if let Err(e) = self.drive.set_speeds(0, 0) {
            tracing::warn!(error = %e, "zeroing motors failed");
        }
    }

    fn halt(&mut self, reason: HaltReason) -> TickOutcome {
        self.halt_motors();
        self.mode = PilotMode::Halted;
        tracing::info!(%reason, "pilot halted");
        TickOutcome::Halted(reason)
    }

    fn killed(&mut self) -> bool {
        if self.kill_latched {
            return true;
        }
        if let Some(check) = &self.kill_check
            && check()
        {
            self.kill_latched = true;
        }
        self.kill_latched
    }

    #[inline]
    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    fn say(&self, text: &str) {
        if let Some(speaker) = &self.speaker {
            speaker.say(text);
        }
    }

    fn fetch_detections(&mut self) -> Result<Vec<Detection>> {
        self.vision
            .detections(self.tuning.scene.max_detections)
            .map_err(|e| crate::error::Report::new(map_vision_error(&*e)))
            .wrap_err("reading detections")
    }

    fn send(&mut self, demand: DriveDemand) -> Result<DriveCommand> {
        let command = if self.move_enabled {
            self.mixer.mix(demand)
        } else {
            DriveCommand::STOP
        };
        self.drive
            .set_speeds(command.left, command.right)
            .map_err(|e| crate::error::Report::new(map_actuator_error(&*e)))
            .wrap_err("setting speeds")?;
        Ok(command)
    }

    fn point_head(&mut self, pos: i32) -> Result<()> {
        self.vision
            .set_pan(pan_to_u16(pos))
            .map_err(|e| crate::error::Report::new(map_vision_error(&*e)))
            .wrap_err("setting pan")
    }

    /// No new frame inside the wait window. Without evidence the last
    /// command stands, unless frames have been missing long enough to
    /// count as lost; then stop rather than drive blind.
    fn stale_frame_tick(&mut self, now: u64) -> Result<TickOutcome> {
        let mut command = DriveCommand::STOP;
        if now.saturating_sub(self.last_frame_ms) > self.tuning.pilot.lost_timeout_ms {
            self.mode = PilotMode::Searching;
            command = self.send(DriveDemand::HALT)?;
            tracing::warn!("no fresh frames past the lost timeout, stopping");
        }
        Ok(TickOutcome::Running(TickReport {
            mode: self.mode,
            fresh_frame: false,
            saw_line: false,
            tracking_error: 0,
            pan_pos: self.servo.position(),
            bias: 0.0,
            throttle: 0.0,
            command,
            search_failed: false,
        }))
    }

    fn tracking_tick(&mut self, snapshot: &SceneSnapshot, now: u64) -> Result<TickOutcome> {
        self.mode = PilotMode::Tracking;
        self.last_seen_ms = now;

        let error = snapshot.tracking_error();
        let pan = self.servo.update(error);
        self.point_head(pan)?;
        let bias = crate::util::clamp_signed_unit(self.steer.update(self.servo.turn_ratio()));

        // Differential share grows with tracking error; the shared forward
        // component shrinks by the same amount, so sharp error means slow
        // and twisty, small error means fast and straight.
        let gain = error.unsigned_abs() as f32 / self.tuning.pilot.full_diff_error_px;
        let diff_drive = crate::util::clamp_unit(self.tuning.pilot.diff_drive_straight + gain);
        let throttle = self.tuning.pilot.base_throttle;

        self.announce_turn(bias);

        let command = self.send(DriveDemand {
            throttle,
            diff_drive,
            bias,
            advance: 1.0,
        })?;
        tracing::trace!(error, pan, bias, diff_drive, "tracking tick");
        Ok(TickOutcome::Running(TickReport {
            mode: self.mode,
            fresh_frame: true,
            saw_line: true,
            tracking_error: error,
            pan_pos: pan,
            bias,
            throttle,
            command,
            search_failed: false,
        }))
    }

    fn announce_turn(&self, bias: f32) {
        let threshold = self.tuning.pilot.say_bias_threshold;
        if bias > threshold {
            self.say("right");
        } else if bias < -threshold {
            self.say("left");
        }
    }

    /// Line not in this frame. Stop and wait briefly; past the timeout,
    /// escalate into recovery.
    fn lost_tick(&mut self, now: u64) -> Result<TickOutcome> {
        if now.saturating_sub(self.last_seen_ms) <= self.tuning.pilot.lost_timeout_ms {
            self.mode = PilotMode::Searching;
            let command = self.send(DriveDemand {
                throttle: 0.0,
                diff_drive: 1.0,
                bias: 0.0,
                advance: 1.0,
            })?;
            return Ok(TickOutcome::Running(TickReport {
                mode: self.mode,
                fresh_frame: true,
                saw_line: false,
                tracking_error: 0,
                pan_pos: self.servo.position(),
                bias: 0.0,
                throttle: 0.0,
                command,
                search_failed: false,
            }));
        }
        self.recover(now)
    }

    fn recover(&mut self, now: u64) -> Result<TickOutcome> {
        self.mode = PilotMode::Recovering;
        tracing::info!(
            silent_ms = now.saturating_sub(self.last_seen_ms),
            "guide line lost, recovering"
        );
        self.say("searching");

        if let Some(lean) = self.history.lean() {
            // Phase one: blind turn toward the side that produced more
            // features lately; head recentered for the reacquire.
            let bias = match lean {
                Lean::Left => -1.0,
                Lean::Right => 1.0,
            };
            self.servo.reset();
            self.point_head(self.servo.position())?;
            self.steer.set_point(0.0);
            let throttle = self.tuning.recovery.turn_throttle;
            let command = self.send(DriveDemand {
                throttle,
                diff_drive: 1.0,
                bias,
                advance: 1.0,
            })?;
            // Grant the turn a full timeout window before escalating.
            self.last_seen_ms = now;
            return Ok(TickOutcome::Running(TickReport {
                mode: self.mode,
                fresh_frame: true,
                saw_line: false,
                tracking_error: 0,
                pan_pos: self.servo.position(),
                bias,
                throttle,
                command,
                search_failed: false,
            }));
        }
        self.sweep()
    }

    /// Phase two: sweep the head across its travel, re-querying the sensor
    /// at each stop until the line shows up. Blocking, but bounded by the
    /// travel range and the per-stop frame wait.
    fn sweep(&mut self) -> Result<TickOutcome> {
        let step = i32::from(self.tuning.recovery.sweep_step.max(1));
        let timeout = Duration::from_millis(self.tuning.pilot.tick_ms);
        let mut pos = self.tuning.servo.min_pos;
        while pos <= self.tuning.servo.max_pos {
            if self.killed() {
                return Ok(self.halt(HaltReason::Kill));
            }
            self.point_head(pos)?;
            let fresh = self
                .vision
                .wait_frame(timeout)
                .map_err(|e| crate::error::Report::new(map_vision_error(&*e)))
                .wrap_err("waiting for frame")?;
            if fresh {
                let detections = self.fetch_detections()?;
                let snapshot = SceneSnapshot::classify(
                    &detections,
                    &self.tuning.scene,
                    self.tuning.pilot.lookahead,
                );
                if snapshot.sees_guide_line() {
                    return self.reacquire(pos, &snapshot);
                }
            }
            pos += step;
        }
        self.retreat()
    }

    fn reacquire(&mut self, pan: i32, snapshot: &SceneSnapshot) -> Result<TickOutcome> {
        let error = snapshot.tracking_error();
        self.servo.set_position(pan);
        let bias = crate::util::clamp_signed_unit(self.steer.update(self.servo.turn_ratio()));
        // Throttle starts high and is cut by how far off-center the line
        // reappeared, bounded so the vehicle still moves.
        let cut = (error.unsigned_abs() as f32 / self.tuning.recovery.reacquire_error_px)
            .min(MAX_REACQUIRE_CUT);
        let throttle = crate::util::clamp_unit(self.tuning.recovery.reacquire_throttle - cut);
        let command = self.send(DriveDemand {
            throttle,
            diff_drive: self.tuning.recovery.reacquire_diff_drive,
            bias,
            advance: 1.0,
        })?;
        self.last_seen_ms = self.now_ms();
        self.mode = PilotMode::Tracking;
        self.say("found it");
        tracing::info!(pan, error, "guide line reacquired");
        Ok(TickOutcome::Running(TickReport {
            mode: self.mode,
            fresh_frame: true,
            saw_line: true,
            tracking_error: error,
            pan_pos: pan,
            bias,
            throttle,
            command,
            search_failed: false,
        }))
    }

    /// The sweep came up empty: back up a little so the next cycle sees a
    /// wider slice of track, and tell the caller the search failed.
    fn retreat(&mut self) -> Result<TickOutcome> {
        tracing::warn!("pan sweep found no guide line, backing off");
        self.say("backing up");
        self.servo.reset();
        self.point_head(self.servo.position())?;
        let throttle = self.tuning.recovery.turn_throttle;
        let command = self.send(DriveDemand {
            throttle,
            diff_drive: 0.0,
            bias: 0.0,
            advance: -1.0,
        })?;
        self.last_seen_ms = self.now_ms();
        Ok(TickOutcome::Running(TickReport {
            mode: self.mode,
            fresh_frame: true,
            saw_line: false,
            tracking_error: 0,
            pan_pos: self.servo.position(),
            bias: 0.0,
            throttle,
            command,
            search_failed: true,
        }))
    }

    fn standoff_tick(
        &mut self,
        obstacle: Detection,
        saw_line: bool,
        now: u64,
    ) -> Result<TickOutcome> {
        self.mode = PilotMode::Standoff;
        // Pursuit is deliberate; don't let the lost timer fire mid-chase.
        self.last_seen_ms = now;

        let error = self.tuning.scene.center_x - i32::from(obstacle.x);
        let pan = self.servo.update(error);
        self.point_head(pan)?;
        let bias = crate::util::clamp_signed_unit(self.steer.update(self.servo.turn_ratio()));
        let distance = standoff::object_distance_mm(obstacle.width, &self.tuning.standoff);
        let demand = standoff::pursuit_demand(
            distance,
            error,
            bias,
            self.tuning.scene.center_x,
            &self.tuning.standoff,
        );
        let command = self.send(demand)?;
        tracing::trace!(distance, error, "standoff tick");
        Ok(TickOutcome::Running(TickReport {
            mode: self.mode,
            fresh_frame: true,
            saw_line,
            tracking_error: error,
            pan_pos: pan,
            bias,
            throttle: demand.throttle,
            command,
            search_failed: false,
        }))
    }
}

#[inline]
fn pan_to_u16(pos: i32) -> u16 {
    pos.clamp(0, i32::from(u16::MAX)) as u16
}

fn validate(tuning: &Tuning) -> Result<()> {
    let fail = |msg| Err(crate::error::Report::new(BuildError::InvalidConfig(msg)));
    if tuning.pilot.tick_ms == 0 {
        return fail("tick_ms must be >= 1");
    }
    if tuning.pilot.lost_timeout_ms == 0 {
        return fail("lost_timeout_ms must be >= 1");
    }
    if tuning.pilot.lookahead > 2 {
        return fail("lookahead must be 0, 1, or 2");
    }
    if tuning.pilot.full_diff_error_px <= 0.0 {
        return fail("full_diff_error_px must be > 0");
    }
    if tuning.servo.max_pos <= tuning.servo.min_pos {
        return fail("servo range must be non-empty");
    }
    if tuning.servo.min_pos < 0 || tuning.servo.max_pos > i32::from(u16::MAX) {
        return fail("servo range must fit the wire format");
    }
    if tuning.drive.max_speed <= 0 || tuning.drive.max_speed > i32::from(i16::MAX) {
        return fail("max_speed must fit i16 motor commands");
    }
    if tuning.drive.deadband < 0 || tuning.drive.deadband >= tuning.drive.max_speed {
        return fail("deadband must be inside [0, max_speed)");
    }
    if tuning.recovery.sweep_step == 0 {
        return fail("sweep_step must be >= 1");
    }
    if tuning.recovery.reacquire_error_px <= 0.0 {
        return fail("reacquire_error_px must be > 0");
    }
    if tuning.scene.max_detections == 0 {
        return fail("max_detections must be >= 1");
    }
    if tuning.scene.center_x < 0 {
        return fail("center_x must be >= 0");
    }
    Ok(())
}
