//! [`RoverState`] – the single mutable record the control loop threads
//! through perception and decision every tick.

use std::time::Instant;

use rockhound_perception::{Perception, WorldMap};
use rockhound_types::{DriveCommand, Mode, Pose, RgbImage, RoverError, Telemetry};

/// Everything the rover knows and has decided, updated in place each tick.
///
/// Created once at startup and never rebuilt mid-run; the
/// [`world_map`][Self::world_map] accumulates for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct RoverState {
    // ── Telemetry ─────────────────────────────────────────────────────────
    /// Position, yaw, pitch and roll (degrees).
    pub pose: Pose,
    pub velocity: f64,
    pub near_sample: bool,
    pub picking_up: bool,

    // ── Decision ──────────────────────────────────────────────────────────
    pub mode: Mode,
    pub throttle: f64,
    pub brake: f64,
    /// Degrees, positive to the left, within `±max_steer`.
    pub steer: f64,
    /// Pickup request for the actuation layer; cleared once issued.
    pub send_pickup: bool,
    /// Start of the current approach window.
    pub sample_timer: Instant,

    // ── Perception ────────────────────────────────────────────────────────
    /// Bearings (radians) of navigable pixels.  `None` until the first frame
    /// has been perceived; an empty vector means "perceived, nothing open".
    pub nav_angles: Option<Vec<f64>>,
    /// Distances (top-down pixels) of navigable pixels, parallel to
    /// [`nav_angles`][Self::nav_angles].
    pub nav_dists: Option<Vec<f64>>,
    /// Distance to the nearest visible sample pixel.
    pub sample_dist: Option<f64>,
    /// Mean bearing (radians) of the visible sample pixels.
    pub sample_angle: Option<f64>,
    pub world_map: WorldMap,
    /// Debug overlay of the latest frame.
    pub vision_image: Option<RgbImage>,
}

impl RoverState {
    /// A fresh state in [`Mode::Forward`] with an empty `world_size` map.
    pub fn new(world_size: usize, now: Instant) -> Self {
        Self {
            pose: Pose::default(),
            velocity: 0.0,
            near_sample: false,
            picking_up: false,
            mode: Mode::default(),
            throttle: 0.0,
            brake: 0.0,
            steer: 0.0,
            send_pickup: false,
            sample_timer: now,
            nav_angles: None,
            nav_dists: None,
            sample_dist: None,
            sample_angle: None,
            world_map: WorldMap::new(world_size),
            vision_image: None,
        }
    }

    /// Copy one telemetry snapshot into the state.
    pub fn ingest(&mut self, telemetry: &Telemetry) {
        self.pose = telemetry.pose;
        self.velocity = telemetry.velocity;
        self.near_sample = telemetry.near_sample;
        self.picking_up = telemetry.picking_up;
    }

    /// Run `perception` on `frame` and store the result.
    ///
    /// Touches only the perception fields and the world map, never the
    /// mode or the outputs.  Returns whether the map accepted the frame.
    pub fn perceive(
        &mut self,
        perception: &mut Perception,
        frame: &RgbImage,
    ) -> Result<bool, RoverError> {
        let out = perception.step(frame, &self.pose, &mut self.world_map)?;
        self.nav_angles = Some(out.nav_angles);
        self.nav_dists = Some(out.nav_dists);
        self.sample_dist = out.sample.map(|s| s.dist);
        self.sample_angle = out.sample.map(|s| s.angle);
        self.vision_image = Some(out.vision_image);
        Ok(out.map_updated)
    }

    /// Navigable pixel count of the latest frame, 0 before the first.
    pub fn nav_count(&self) -> usize {
        self.nav_angles.as_ref().map_or(0, Vec::len)
    }

    /// Snapshot of the current outputs.
    pub fn command(&self) -> DriveCommand {
        DriveCommand {
            throttle: self.throttle,
            brake: self.brake,
            steer: self.steer,
            send_pickup: self.send_pickup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rockhound_perception::{Layer, PerceptionConfig};

    const SAND: [u8; 3] = [200, 190, 180];

    #[test]
    fn new_state_has_no_perception_yet() {
        let s = RoverState::new(200, Instant::now());
        assert_eq!(s.mode, Mode::Forward);
        assert!(s.nav_angles.is_none());
        assert!(s.sample_dist.is_none());
        assert_eq!(s.nav_count(), 0);
        assert_eq!(s.world_map.size(), 200);
    }

    #[test]
    fn ingest_copies_telemetry() {
        let mut s = RoverState::new(10, Instant::now());
        let mut pose = Pose::new(3.0, 4.0, 90.0);
        pose.roll = 1.5;
        s.ingest(&Telemetry {
            pose,
            velocity: 0.7,
            near_sample: true,
            picking_up: true,
        });
        assert_eq!((s.pose.x, s.pose.y), (3.0, 4.0));
        assert_eq!(s.pose.roll, 1.5);
        assert_eq!(s.velocity, 0.7);
        assert!(s.near_sample && s.picking_up);
    }

    #[test]
    fn perceive_fills_perception_fields_and_leaves_mode() {
        let mut perception = Perception::new(PerceptionConfig::default()).unwrap();
        let mut s = RoverState::new(200, Instant::now());
        s.pose = Pose::new(100.0, 100.0, 0.0);
        s.mode = Mode::Stop;
        s.sample_dist = Some(3.0);
        s.sample_angle = Some(0.2);

        let mut frame = RgbImage::blank(320, 160);
        frame.fill_rect(0, 0, 320, 160, SAND);
        let updated = s.perceive(&mut perception, &frame).unwrap();

        assert!(updated);
        assert!(s.nav_count() > 0);
        assert_eq!(s.nav_dists.as_ref().map(Vec::len), Some(s.nav_count()));
        assert!(s.sample_dist.is_none());
        assert!(s.sample_angle.is_none());
        assert!(s.vision_image.is_some());
        assert_eq!(s.mode, Mode::Stop);
        assert!(s.world_map.coverage(Layer::Navigable) > 0);
    }

    #[test]
    fn tilted_frame_still_perceives_but_skips_map() {
        let mut perception = Perception::new(PerceptionConfig::default()).unwrap();
        let mut s = RoverState::new(200, Instant::now());
        s.pose = Pose::new(100.0, 100.0, 0.0);
        s.pose.pitch = 5.0;

        let mut frame = RgbImage::blank(320, 160);
        frame.fill_rect(0, 0, 320, 160, SAND);
        assert!(!s.perceive(&mut perception, &frame).unwrap());
        assert!(s.nav_count() > 0);
        assert_eq!(s.world_map, WorldMap::new(200));
    }

    #[test]
    fn command_mirrors_outputs() {
        let mut s = RoverState::new(10, Instant::now());
        s.throttle = 0.2;
        s.brake = 0.0;
        s.steer = -4.0;
        s.send_pickup = true;
        assert_eq!(
            s.command(),
            DriveCommand {
                throttle: 0.2,
                brake: 0.0,
                steer: -4.0,
                send_pickup: true,
            }
        );
    }
}
