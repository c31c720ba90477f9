//! In-process rover simulator for headless runs and tests.
//!
//! [`SimRover`] implements [`Camera`], [`TelemetrySource`] and [`Actuation`]
//! at once, so the full perception and decision stack can be driven without
//! the external simulator.  It models:
//!
//! - point kinematics with throttle, drag, braking and steer-proportional yaw
//!   rate (the rover can turn in place);
//! - a pinhole camera over a flat, sand-coloured ground plane, inside a
//!   rectangular arena whose outside reads as rock wall;
//! - yellow sample rocks lying on the ground, the `near_sample` flag, and a
//!   pickup that takes a fixed number of steps and removes the sample.
//!
//! # Example
//!
//! ```rust
//! use rockhound_hal::{Actuation, Camera, SimConfig, SimRover, TelemetrySource};
//! use rockhound_types::{DriveCommand, Pose};
//!
//! let mut rover = SimRover::new(SimConfig::default())
//!     .at(Pose::new(100.0, 100.0, 0.0))
//!     .with_sample(101.0, 100.0);
//!
//! let frame = rover.capture().unwrap();
//! assert_eq!((frame.width(), frame.height()), (320, 160));
//!
//! rover
//!     .actuate(&DriveCommand { throttle: 0.2, ..Default::default() })
//!     .unwrap();
//! assert!(rover.telemetry().velocity > 0.0);
//! ```

use rockhound_types::{DriveCommand, Pose, RgbImage, RoverError, Telemetry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::actuator::{Actuation, check_finite};
use crate::camera::Camera;
use crate::telemetry::TelemetrySource;

/// Ground colour; passes the default navigable threshold.
pub const SAND: [u8; 3] = [190, 175, 160];
/// Sample colour; passes the default sample threshold.
pub const ROCK: [u8; 3] = [200, 180, 20];
/// Arena wall colour; fails both thresholds.
pub const WALL: [u8; 3] = [90, 70, 50];
/// Everything above the vanishing row.
pub const SKY: [u8; 3] = [80, 110, 160];

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunables for [`SimRover`].  Every field has a default, so an empty TOML
/// table is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_frame_width")]
    pub frame_width: usize,
    #[serde(default = "default_frame_height")]
    pub frame_height: usize,
    /// Simulated seconds advanced per actuation.
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Image row of the horizon of the ground plane.
    #[serde(default = "default_vanishing_row")]
    pub vanishing_row: f64,
    /// Ground distance of a pixel row is `ground_gain / (row - vanishing_row)`.
    #[serde(default = "default_ground_gain")]
    pub ground_gain: f64,
    /// Horizontal focal length in pixels.
    #[serde(default = "default_focal_px")]
    pub focal_px: f64,
    /// Acceleration per unit throttle, units/s².
    #[serde(default = "default_accel_gain")]
    pub accel_gain: f64,
    /// Linear drag coefficient, 1/s.
    #[serde(default = "default_drag")]
    pub drag: f64,
    /// Deceleration per unit brake, units/s².
    #[serde(default = "default_brake_gain")]
    pub brake_gain: f64,
    /// Yaw rate per degree of steer, 1/s.
    #[serde(default = "default_turn_rate")]
    pub turn_rate: f64,
    /// Reach of the arm.  The rover brakes once the sample is within a unit
    /// of the camera's nearest visible ground, so this must exceed that
    /// stopping distance plus `sample_radius`.
    #[serde(default = "default_pickup_radius")]
    pub pickup_radius: f64,
    /// Actuations a pickup takes to complete.
    #[serde(default = "default_pickup_steps")]
    pub pickup_steps: u32,
    #[serde(default = "default_sample_radius")]
    pub sample_radius: f64,
    /// Lower-left corner of the drivable arena.
    #[serde(default = "default_arena_min")]
    pub arena_min: [f64; 2],
    /// Upper-right corner of the drivable arena.
    #[serde(default = "default_arena_max")]
    pub arena_max: [f64; 2],
}

fn default_frame_width() -> usize {
    320
}
fn default_frame_height() -> usize {
    160
}
fn default_dt() -> f64 {
    0.1
}
fn default_vanishing_row() -> f64 {
    75.0
}
fn default_ground_gain() -> f64 {
    39.0
}
fn default_focal_px() -> f64 {
    150.0
}
fn default_accel_gain() -> f64 {
    5.0
}
fn default_drag() -> f64 {
    0.5
}
fn default_brake_gain() -> f64 {
    1.0
}
fn default_turn_rate() -> f64 {
    1.0
}
fn default_pickup_radius() -> f64 {
    2.0
}
fn default_pickup_steps() -> u32 {
    10
}
fn default_sample_radius() -> f64 {
    0.3
}
fn default_arena_min() -> [f64; 2] {
    [0.0, 0.0]
}
fn default_arena_max() -> [f64; 2] {
    [200.0, 200.0]
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            dt: default_dt(),
            vanishing_row: default_vanishing_row(),
            ground_gain: default_ground_gain(),
            focal_px: default_focal_px(),
            accel_gain: default_accel_gain(),
            drag: default_drag(),
            brake_gain: default_brake_gain(),
            turn_rate: default_turn_rate(),
            pickup_radius: default_pickup_radius(),
            pickup_steps: default_pickup_steps(),
            sample_radius: default_sample_radius(),
            arena_min: default_arena_min(),
            arena_max: default_arena_max(),
        }
    }
}

impl SimConfig {
    /// Reject settings the renderer or the integrator cannot work with.
    pub fn validate(&self) -> Result<(), RoverError> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(RoverError::InvalidConfig(format!(
                "frame must be nonempty, got {}x{}",
                self.frame_width, self.frame_height
            )));
        }
        for (name, value) in [("dt", self.dt), ("focal_px", self.focal_px)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(RoverError::InvalidConfig(format!(
                    "sim.{name} must be positive, got {value}"
                )));
            }
        }
        let rates = [
            ("vanishing_row", self.vanishing_row),
            ("ground_gain", self.ground_gain),
            ("accel_gain", self.accel_gain),
            ("drag", self.drag),
            ("brake_gain", self.brake_gain),
            ("turn_rate", self.turn_rate),
            ("pickup_radius", self.pickup_radius),
            ("sample_radius", self.sample_radius),
        ];
        if let Some((name, value)) = rates.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(RoverError::InvalidConfig(format!(
                "sim.{name} must be non-negative, got {value}"
            )));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRover
// ────────────────────────────────────────────────────────────────────────────

/// A simulated rover.  See the [module docs](self).
#[derive(Debug, Clone)]
pub struct SimRover {
    config: SimConfig,
    pose: Pose,
    velocity: f64,
    samples: Vec<[f64; 2]>,
    pickup_remaining: Option<u32>,
    collected: usize,
    elapsed: f64,
}

impl SimRover {
    /// A rover at rest in the middle of the arena, facing +x, with no
    /// samples.
    pub fn new(config: SimConfig) -> Self {
        let cx = (config.arena_min[0] + config.arena_max[0]) / 2.0;
        let cy = (config.arena_min[1] + config.arena_max[1]) / 2.0;
        Self {
            config,
            pose: Pose::new(cx, cy, 0.0),
            velocity: 0.0,
            samples: Vec::new(),
            pickup_remaining: None,
            collected: 0,
            elapsed: 0.0,
        }
    }

    /// Place the rover at `pose`.
    pub fn at(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    /// Start with forward speed `velocity`.
    pub fn moving(mut self, velocity: f64) -> Self {
        self.velocity = velocity;
        self
    }

    /// Drop a sample rock at world `(x, y)`.
    pub fn with_sample(mut self, x: f64, y: f64) -> Self {
        self.samples.push([x, y]);
        self
    }

    /// Hold the body at a fixed pitch and roll, degrees.
    pub fn with_tilt(mut self, pitch: f64, roll: f64) -> Self {
        self.pose.pitch = pitch;
        self.pose.roll = roll;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Samples still lying in the arena.
    pub fn samples_remaining(&self) -> usize {
        self.samples.len()
    }

    /// Samples picked up so far.
    pub fn collected(&self) -> usize {
        self.collected
    }

    /// Simulated seconds since construction.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    fn picking_up(&self) -> bool {
        self.pickup_remaining.is_some()
    }

    fn nearest_sample(&self) -> Option<(usize, f64)> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, s)| (i, (s[0] - self.pose.x).hypot(s[1] - self.pose.y)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn near_sample(&self) -> bool {
        self.nearest_sample()
            .is_some_and(|(_, d)| d <= self.config.pickup_radius)
    }

    fn in_arena(&self, x: f64, y: f64) -> bool {
        let (lo, hi) = (self.config.arena_min, self.config.arena_max);
        lo[0] <= x && x <= hi[0] && lo[1] <= y && y <= hi[1]
    }

    /// Colour of the ground at world `(x, y)`.
    fn ground_color(&self, x: f64, y: f64) -> [u8; 3] {
        if !self.in_arena(x, y) {
            return WALL;
        }
        let r = self.config.sample_radius;
        if self
            .samples
            .iter()
            .any(|s| (s[0] - x).hypot(s[1] - y) <= r)
        {
            ROCK
        } else {
            SAND
        }
    }

    fn render(&self) -> RgbImage {
        let cfg = &self.config;
        let (w, h) = (cfg.frame_width, cfg.frame_height);
        let mut frame = RgbImage::blank(w, h);
        let (sin, cos) = self.pose.yaw.to_radians().sin_cos();
        let half = w as f64 / 2.0;

        for row in 0..h {
            let depth = row as f64 + 0.5 - cfg.vanishing_row;
            if depth <= 0.0 {
                frame.fill_rect(0, row, w, row + 1, SKY);
                continue;
            }
            let ahead = cfg.ground_gain / depth;
            for col in 0..w {
                let left = (half - (col as f64 + 0.5)) * ahead / cfg.focal_px;
                let x = self.pose.x + ahead * cos - left * sin;
                let y = self.pose.y + ahead * sin + left * cos;
                frame.set_pixel(col, row, self.ground_color(x, y));
            }
        }
        frame
    }

    fn integrate(&mut self, command: &DriveCommand) {
        let cfg = &self.config;
        let dt = cfg.dt;

        let accel = command.throttle * cfg.accel_gain - cfg.drag * self.velocity;
        let mut v = self.velocity + accel * dt;
        if command.brake > 0.0 {
            let cut = (command.brake * cfg.brake_gain * dt).min(v.abs());
            v -= cut.copysign(v);
        }
        if command.throttle == 0.0 && v.abs() < 0.05 {
            v = 0.0;
        }
        self.velocity = v;

        self.pose.yaw = (self.pose.yaw + command.steer * cfg.turn_rate * dt).rem_euclid(360.0);
        let (sin, cos) = self.pose.yaw.to_radians().sin_cos();
        self.pose.x += v * cos * dt;
        self.pose.y += v * sin * dt;
    }

    fn advance_pickup(&mut self) {
        let Some(remaining) = self.pickup_remaining.as_mut() else {
            return;
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining > 0 {
            return;
        }
        self.pickup_remaining = None;
        if let Some((i, _)) = self.nearest_sample() {
            let [x, y] = self.samples.remove(i);
            self.collected += 1;
            info!(x, y, collected = self.collected, "sample collected");
        }
    }
}

impl Camera for SimRover {
    fn id(&self) -> &str {
        "sim_front_rgb"
    }

    fn capture(&mut self) -> Result<RgbImage, RoverError> {
        Ok(self.render())
    }
}

impl TelemetrySource for SimRover {
    fn telemetry(&self) -> Telemetry {
        Telemetry {
            pose: self.pose,
            velocity: self.velocity,
            near_sample: self.near_sample(),
            picking_up: self.picking_up(),
        }
    }
}

impl Actuation for SimRover {
    fn actuate(&mut self, command: &DriveCommand) -> Result<(), RoverError> {
        check_finite("sim_drive", command)?;
        self.elapsed += self.config.dt;

        if command.send_pickup && !self.picking_up() {
            if self.near_sample() {
                debug!(steps = self.config.pickup_steps, "pickup started");
                self.pickup_remaining = Some(self.config.pickup_steps.max(1));
                self.velocity = 0.0;
            } else {
                debug!("pickup requested out of reach, ignored");
            }
        }

        if self.picking_up() {
            self.advance_pickup();
        } else {
            self.integrate(command);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rover() -> SimRover {
        SimRover::new(SimConfig::default()).at(Pose::new(100.0, 100.0, 0.0))
    }

    fn drive(throttle: f64, brake: f64, steer: f64) -> DriveCommand {
        DriveCommand {
            throttle,
            brake,
            steer,
            send_pickup: false,
        }
    }

    // ── Camera ────────────────────────────────────────────────────────────

    #[test]
    fn open_ground_renders_sand_below_sky() {
        let frame = rover().capture().unwrap();
        assert_eq!(frame.pixel(160, 0), SKY);
        assert_eq!(frame.pixel(160, 74), SKY);
        assert_eq!(frame.pixel(160, 159), SAND);
        assert_eq!(frame.pixel(0, 120), SAND);
    }

    #[test]
    fn arena_edge_renders_as_wall() {
        let mut r = rover().at(Pose::new(199.0, 100.0, 0.0));
        let frame = r.capture().unwrap();
        // Row 159 looks ~0.46 ahead, row 100 ~1.53 ahead.
        assert_eq!(frame.pixel(160, 159), SAND);
        assert_eq!(frame.pixel(160, 100), WALL);
    }

    #[test]
    fn sample_appears_ahead_and_to_the_left() {
        let mut ahead = rover().with_sample(101.0, 100.0);
        assert_eq!(ahead.capture().unwrap().pixel(160, 113), ROCK);

        let mut left = rover().with_sample(101.0, 100.5);
        let frame = left.capture().unwrap();
        assert_eq!(frame.pixel(85, 113), ROCK);
        assert_eq!(frame.pixel(235, 113), SAND);
    }

    #[test]
    fn yaw_rotates_the_view() {
        // Facing +y, a sample at +x is off to the right and out of view.
        let mut r = rover().at(Pose::new(100.0, 100.0, 90.0)).with_sample(101.0, 100.0);
        let frame = r.capture().unwrap();
        assert!(frame.data().chunks_exact(3).all(|px| px != ROCK));
    }

    // ── Kinematics ────────────────────────────────────────────────────────

    #[test]
    fn throttle_accelerates_and_moves_forward() {
        let mut r = rover();
        r.actuate(&drive(0.2, 0.0, 0.0)).unwrap();
        let t = r.telemetry();
        assert!((t.velocity - 0.1).abs() < 1e-12);
        assert!((t.pose.x - 100.01).abs() < 1e-12);
        assert_eq!(t.pose.y, 100.0);
        assert!((r.elapsed() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn sustained_throttle_approaches_terminal_velocity() {
        let mut r = rover();
        for _ in 0..200 {
            r.actuate(&drive(0.2, 0.0, 0.0)).unwrap();
        }
        assert!((r.telemetry().velocity - 2.0).abs() < 0.01);
    }

    #[test]
    fn brake_stops_the_rover() {
        let mut r = rover().moving(2.0);
        for _ in 0..3 {
            r.actuate(&drive(0.0, 10.0, 0.0)).unwrap();
        }
        assert_eq!(r.telemetry().velocity, 0.0);
    }

    #[test]
    fn steer_turns_in_place_and_wraps_yaw() {
        let mut r = rover();
        r.actuate(&drive(0.0, 0.0, -15.0)).unwrap();
        let t = r.telemetry();
        assert!((t.pose.yaw - 358.5).abs() < 1e-9);
        assert_eq!((t.pose.x, t.pose.y), (100.0, 100.0));
    }

    #[test]
    fn tilt_is_reported() {
        let r = rover().with_tilt(2.0, 359.0);
        let t = r.telemetry();
        assert_eq!((t.pose.pitch, t.pose.roll), (2.0, 359.0));
    }

    #[test]
    fn non_finite_command_is_rejected() {
        let mut r = rover();
        let err = r.actuate(&drive(f64::INFINITY, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, RoverError::HardwareFault { .. }));
        assert_eq!(r.elapsed(), 0.0);
    }

    // ── Pickup ────────────────────────────────────────────────────────────

    #[test]
    fn pickup_runs_to_completion_and_removes_sample() {
        let mut r = rover().with_sample(100.3, 100.0);
        assert!(r.telemetry().near_sample);

        let pickup = DriveCommand {
            send_pickup: true,
            ..Default::default()
        };
        r.actuate(&pickup).unwrap();
        assert!(r.telemetry().picking_up);

        for _ in 1..r.config().pickup_steps {
            r.actuate(&DriveCommand::default()).unwrap();
        }
        let t = r.telemetry();
        assert!(!t.picking_up);
        assert!(!t.near_sample);
        assert_eq!(r.samples_remaining(), 0);
        assert_eq!(r.collected(), 1);
    }

    #[test]
    fn pickup_out_of_reach_is_ignored() {
        let mut r = rover().with_sample(105.0, 100.0);
        r.actuate(&DriveCommand {
            send_pickup: true,
            ..Default::default()
        })
        .unwrap();
        assert!(!r.telemetry().picking_up);
        assert_eq!(r.samples_remaining(), 1);
    }

    #[test]
    fn rover_holds_still_while_picking_up() {
        let mut r = rover().with_sample(100.2, 100.0);
        r.actuate(&DriveCommand {
            send_pickup: true,
            ..Default::default()
        })
        .unwrap();
        r.actuate(&drive(1.0, 0.0, 15.0)).unwrap();
        let t = r.telemetry();
        assert_eq!(t.velocity, 0.0);
        assert_eq!(t.pose.x, 100.0);
        assert_eq!(t.pose.yaw, 0.0);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn unusable_config_is_rejected() {
        let bad = [
            SimConfig {
                frame_width: 0,
                ..Default::default()
            },
            SimConfig {
                frame_height: 0,
                ..Default::default()
            },
            SimConfig {
                focal_px: 0.0,
                ..Default::default()
            },
            SimConfig {
                focal_px: -150.0,
                ..Default::default()
            },
            SimConfig {
                dt: f64::NAN,
                ..Default::default()
            },
            SimConfig {
                drag: -0.5,
                ..Default::default()
            },
        ];
        for cfg in bad {
            let err = cfg.validate().unwrap_err();
            assert!(matches!(err, RoverError::InvalidConfig(_)), "{cfg:?}");
        }
    }

    #[test]
    fn empty_table_uses_defaults() {
        let cfg: SimConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, SimConfig::default());
    }
}
