//! [`ControlLoop`] – the per-tick perceive → decide → act orchestrator.
//!
//! Each tick:
//!
//! 1. **Ingest** – copy the [`Telemetry`] snapshot into the [`RoverState`].
//! 2. **Perceive** – run the [`Perception`] pipeline on the camera frame,
//!    updating the polar summaries and the world map.
//! 3. **Decide** – run [`decision_step`] against the [`DriveConfig`].
//! 4. **Act** – hand the resulting [`DriveCommand`] to the caller, or with
//!    [`ControlLoop::run_step`] straight to an
//!    [`Actuation`](rockhound_hal::Actuation) sink.
//!
//! The loop is single-threaded and never blocks: pacing ticks against frame
//! arrival is the caller's business.  Time is passed in, never read, so runs
//! are reproducible.
//!
//! # Pickup handshake
//!
//! When a tick sets `send_pickup` the actuation layer issues the pickup and
//! the loop must then be told via [`ControlLoop::acknowledge_pickup`].
//! [`run_step`][ControlLoop::run_step] does both.
//!
//! # Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//!
//! use rockhound_hal::{SimConfig, SimRover};
//! use rockhound_perception::PerceptionConfig;
//! use rockhound_runtime::control_loop::ControlLoop;
//! use rockhound_runtime::decision::DriveConfig;
//! use rockhound_types::Mode;
//!
//! let start = Instant::now();
//! let mut rover = SimRover::new(SimConfig::default());
//! let mut control =
//!     ControlLoop::new(PerceptionConfig::default(), DriveConfig::default(), start).unwrap();
//!
//! for _ in 0..5 {
//!     let now = start + Duration::from_secs_f64(rover.elapsed());
//!     let report = control.run_step(&mut rover, now).unwrap();
//!     assert_eq!(report.mode, Mode::Forward);
//! }
//! assert!(rover.pose().x > 100.0);
//! ```

use std::time::Instant;

use chrono::{DateTime, Utc};
use rockhound_hal::Rover;
use rockhound_perception::{Perception, PerceptionConfig, WorldMap};
use rockhound_types::{DriveCommand, Mode, Pose, RgbImage, RoverError, Telemetry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::decision::{DriveConfig, check_pickup, decision_step};
use crate::state::RoverState;

// ────────────────────────────────────────────────────────────────────────────
// TickReport
// ────────────────────────────────────────────────────────────────────────────

/// Summary of one tick, for logs and the CLI's JSON-lines output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub timestamp: DateTime<Utc>,
    /// Zero-based tick index.
    pub tick: u64,
    pub pose: Pose,
    pub velocity: f64,
    pub mode: Mode,
    pub throttle: f64,
    pub brake: f64,
    pub steer: f64,
    /// Whether this tick requested a pickup.
    pub send_pickup: bool,
    pub nav_pixels: usize,
    pub sample_visible: bool,
    pub map_updated: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ────────────────────────────────────────────────────────────────────────────

/// Owns the [`RoverState`] and the perception stage for a whole run.
pub struct ControlLoop {
    perception: Perception,
    drive: DriveConfig,
    state: RoverState,
    ticks: u64,
    last_map_updated: bool,
}

impl ControlLoop {
    /// Build a loop starting in [`Mode::Forward`] with an empty world map.
    ///
    /// # Errors
    ///
    /// [`RoverError::InvalidConfig`] or [`RoverError::DegenerateCalibration`]
    /// when either configuration is unusable.
    pub fn new(
        perception: PerceptionConfig,
        drive: DriveConfig,
        now: Instant,
    ) -> Result<Self, RoverError> {
        drive.validate()?;
        let world_size = perception.world_size;
        let perception = Perception::new(perception)?;
        Ok(Self {
            perception,
            drive,
            state: RoverState::new(world_size, now),
            ticks: 0,
            last_map_updated: false,
        })
    }

    /// Start in `mode` instead of [`Mode::Forward`].
    pub fn with_initial_mode(mut self, mode: Mode) -> Self {
        self.state.mode = mode;
        self
    }

    pub fn state(&self) -> &RoverState {
        &self.state
    }

    pub fn world_map(&self) -> &WorldMap {
        &self.state.world_map
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one tick on `frame` and `telemetry`, returning the command to
    /// actuate.
    ///
    /// On a perception error only the pickup trigger runs; the drive outputs
    /// and the perception fields stay as they were and the tick is not
    /// counted.
    pub fn tick(
        &mut self,
        frame: &RgbImage,
        telemetry: &Telemetry,
        now: Instant,
    ) -> Result<DriveCommand, RoverError> {
        let span = info_span!("tick", tick = self.ticks);
        let _enter = span.enter();

        self.state.ingest(telemetry);
        match self.state.perceive(&mut self.perception, frame) {
            Ok(updated) => self.last_map_updated = updated,
            Err(e) => {
                self.without_frame();
                return Err(e);
            }
        }
        decision_step(&mut self.state, &self.drive, now);
        self.ticks += 1;

        let command = self.state.command();
        debug!(
            mode = %self.state.mode,
            throttle = command.throttle,
            brake = command.brake,
            steer = command.steer,
            send_pickup = command.send_pickup,
            "tick complete"
        );
        Ok(command)
    }

    fn without_frame(&mut self) {
        self.last_map_updated = false;
        check_pickup(&mut self.state);
    }

    /// Clear `send_pickup` once the actuation layer has issued the pickup.
    pub fn acknowledge_pickup(&mut self) {
        self.state.send_pickup = false;
    }

    /// Capture, tick and actuate against one rover link.
    ///
    /// # Errors
    ///
    /// Propagates camera, perception and actuation failures.  A camera
    /// failure still runs the pickup trigger on fresh telemetry.  A pickup
    /// request that was not actuated stays set and is retried next tick.
    pub fn run_step<R: Rover + ?Sized>(
        &mut self,
        rover: &mut R,
        now: Instant,
    ) -> Result<TickReport, RoverError> {
        let telemetry = rover.telemetry();
        let frame = match rover.capture() {
            Ok(frame) => frame,
            Err(e) => {
                self.state.ingest(&telemetry);
                self.without_frame();
                return Err(e);
            }
        };
        let command = self.tick(&frame, &telemetry, now)?;
        let report = self.report();

        rover.actuate(&command)?;
        if command.send_pickup {
            self.acknowledge_pickup();
        }
        Ok(report)
    }

    /// Report for the most recent tick.
    pub fn report(&self) -> TickReport {
        let s = &self.state;
        TickReport {
            timestamp: Utc::now(),
            tick: self.ticks.saturating_sub(1),
            pose: s.pose,
            velocity: s.velocity,
            mode: s.mode,
            throttle: s.throttle,
            brake: s.brake,
            steer: s.steer,
            send_pickup: s.send_pickup,
            nav_pixels: s.nav_count(),
            sample_visible: s.sample_dist.is_some(),
            map_updated: self.last_map_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rockhound_hal::{Actuation, Camera, SimConfig, SimRover, TelemetrySource};
    use rockhound_perception::Layer;

    use super::*;

    fn control(start: Instant) -> ControlLoop {
        ControlLoop::new(PerceptionConfig::default(), DriveConfig::default(), start).unwrap()
    }

    /// One `run_step` on the simulator's clock.
    fn step(control: &mut ControlLoop, rover: &mut SimRover, start: Instant) -> TickReport {
        let now = start + Duration::from_secs_f64(rover.elapsed());
        control.run_step(rover, now).unwrap()
    }

    #[test]
    fn open_ground_drives_forward_and_maps_terrain() {
        let start = Instant::now();
        let mut rover = SimRover::new(SimConfig::default());
        let mut control = control(start);

        for _ in 0..20 {
            let report = step(&mut control, &mut rover, start);
            assert_eq!(report.mode, Mode::Forward);
            assert_eq!(report.throttle, 0.2);
            assert!(report.steer.abs() < 1.0);
            assert!(report.map_updated);
        }
        assert_eq!(control.ticks(), 20);
        assert!(rover.telemetry().velocity > 1.0);
        assert!(control.world_map().coverage(Layer::Navigable) > 0);
        assert_eq!(control.world_map().coverage(Layer::Sample), 0);
    }

    #[test]
    fn facing_the_arena_wall_stops_then_turns_in_place() {
        let start = Instant::now();
        let mut rover = SimRover::new(SimConfig::default()).at(Pose::new(200.0, 100.0, 0.0));
        let mut control = control(start);

        let first = step(&mut control, &mut rover, start);
        assert_eq!(first.nav_pixels, 0);
        assert_eq!(first.mode, Mode::Stop);
        assert_eq!(first.brake, 10.0);

        let second = step(&mut control, &mut rover, start);
        assert_eq!(second.mode, Mode::Stop);
        assert_eq!((second.throttle, second.brake, second.steer), (0.0, 0.0, -15.0));
        assert!(rover.pose().yaw > 300.0);
        assert!(control.world_map().coverage(Layer::Obstacle) > 0);
    }

    #[test]
    fn pickup_handshake_completes_a_collection() {
        let start = Instant::now();
        let mut rover = SimRover::new(SimConfig::default()).with_sample(100.3, 100.0);
        let mut control = control(start);

        let report = step(&mut control, &mut rover, start);
        assert!(report.send_pickup);
        assert_eq!(report.mode, Mode::Forward);
        assert!(!control.state().send_pickup);
        assert!(rover.telemetry().picking_up);

        for _ in 1..rover.config().pickup_steps {
            let report = step(&mut control, &mut rover, start);
            assert!(!report.send_pickup);
        }
        assert_eq!(rover.collected(), 1);
        assert!(!rover.telemetry().picking_up);
    }

    #[test]
    fn tilted_rover_keeps_driving_without_mapping() {
        let start = Instant::now();
        let mut rover = SimRover::new(SimConfig::default()).with_tilt(3.0, 0.0);
        let mut control = control(start);

        let report = step(&mut control, &mut rover, start);
        assert!(!report.map_updated);
        assert_eq!(report.throttle, 0.2);
        assert_eq!(control.world_map().coverage(Layer::Navigable), 0);
    }

    #[test]
    fn visible_sample_switches_to_face_sample() {
        let start = Instant::now();
        let mut rover = SimRover::new(SimConfig::default()).with_sample(103.0, 100.0);
        let mut control = control(start);

        let report = step(&mut control, &mut rover, start);
        assert!(report.sample_visible);
        assert_eq!(report.mode, Mode::FaceSample);
        assert!(control.world_map().coverage(Layer::Sample) > 0);
    }

    #[test]
    fn drives_up_to_a_sample_and_collects_it() {
        let start = Instant::now();
        let mut rover = SimRover::new(SimConfig::default()).with_sample(103.0, 101.2);
        let mut control = control(start);

        let mut modes = Vec::new();
        let mut requested = false;
        for _ in 0..300 {
            let report = step(&mut control, &mut rover, start);
            if modes.last() != Some(&report.mode) {
                modes.push(report.mode);
            }
            requested |= report.send_pickup;
            if rover.collected() == 1 {
                break;
            }
        }

        assert_eq!(rover.collected(), 1);
        assert_eq!(rover.samples_remaining(), 0);
        assert!(requested);
        assert_eq!(modes[0], Mode::FaceSample);
        assert!(modes.contains(&Mode::ApproachSample));
        assert!(rover.pose().x > 101.0);
    }

    #[test]
    fn initial_mode_is_honoured() {
        let control = control(Instant::now()).with_initial_mode(Mode::Stop);
        assert_eq!(control.state().mode, Mode::Stop);
    }

    #[test]
    fn invalid_drive_config_is_rejected() {
        let drive = DriveConfig {
            max_vel: f64::INFINITY,
            ..Default::default()
        };
        let err = ControlLoop::new(PerceptionConfig::default(), drive, Instant::now())
            .err()
            .unwrap();
        assert!(matches!(err, RoverError::InvalidConfig(_)));
    }

    struct FaultyDrive {
        inner: SimRover,
    }

    impl Camera for FaultyDrive {
        fn id(&self) -> &str {
            "faulty"
        }
        fn capture(&mut self) -> Result<RgbImage, RoverError> {
            self.inner.capture()
        }
    }

    impl TelemetrySource for FaultyDrive {
        fn telemetry(&self) -> Telemetry {
            self.inner.telemetry()
        }
    }

    impl Actuation for FaultyDrive {
        fn actuate(&mut self, _: &DriveCommand) -> Result<(), RoverError> {
            Err(RoverError::HardwareFault {
                component: "drive".to_string(),
                details: "link lost".to_string(),
            })
        }
    }

    #[test]
    fn failed_actuation_keeps_pickup_pending() {
        let start = Instant::now();
        let mut rover = FaultyDrive {
            inner: SimRover::new(SimConfig::default()).with_sample(100.3, 100.0),
        };
        let mut control = control(start);

        let err = control.run_step(&mut rover, start).unwrap_err();
        assert!(matches!(err, RoverError::HardwareFault { .. }));
        assert!(control.state().send_pickup);
        assert_eq!(control.ticks(), 1);
    }

    struct BlindCamera {
        inner: SimRover,
    }

    impl Camera for BlindCamera {
        fn id(&self) -> &str {
            "blind"
        }
        fn capture(&mut self) -> Result<RgbImage, RoverError> {
            Err(RoverError::HardwareFault {
                component: "camera".to_string(),
                details: "no frame".to_string(),
            })
        }
    }

    impl TelemetrySource for BlindCamera {
        fn telemetry(&self) -> Telemetry {
            self.inner.telemetry()
        }
    }

    impl Actuation for BlindCamera {
        fn actuate(&mut self, command: &DriveCommand) -> Result<(), RoverError> {
            self.inner.actuate(command)
        }
    }

    #[test]
    fn camera_failure_still_requests_pickup() {
        let start = Instant::now();
        let mut rover = BlindCamera {
            inner: SimRover::new(SimConfig::default()).with_sample(100.3, 100.0),
        };
        let mut control = control(start).with_initial_mode(Mode::Stop);

        let err = control.run_step(&mut rover, start).unwrap_err();
        assert!(matches!(err, RoverError::HardwareFault { .. }));
        assert!(control.state().send_pickup);
        assert_eq!(control.state().mode, Mode::Forward);
        assert!(control.state().nav_angles.is_none());
        assert_eq!(control.ticks(), 0);
    }

    #[test]
    fn camera_failure_away_from_samples_changes_nothing() {
        let start = Instant::now();
        let mut rover = BlindCamera {
            inner: SimRover::new(SimConfig::default()),
        };
        let mut control = control(start).with_initial_mode(Mode::Stop);

        assert!(control.run_step(&mut rover, start).is_err());
        assert!(!control.state().send_pickup);
        assert_eq!(control.state().mode, Mode::Stop);
    }

    #[test]
    fn report_serializes_as_json_line() {
        let start = Instant::now();
        let mut rover = SimRover::new(SimConfig::default());
        let mut control = control(start);
        let report = control.run_step(&mut rover, start).unwrap();

        let line = serde_json::to_string(&report).unwrap();
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["mode"], "forward");
        assert_eq!(value["tick"], 0);
        assert_eq!(value["throttle"], 0.2);
        assert_eq!(value["send_pickup"], false);
        let back: TickReport = serde_json::from_str(&line).unwrap();
        assert_eq!(back.timestamp, report.timestamp);
        assert_eq!(back.nav_pixels, report.nav_pixels);
    }
}
