//! Per-frame perception pipeline.
//!
//! [`Perception::step`] runs the whole chain for one camera frame:
//! warp → classify → project → accumulate → polar summary.  It never touches
//! the rover's decision mode; the caller copies the returned
//! [`PerceptionOutput`] into its state.
//!
//! # Example
//!
//! ```rust
//! use rockhound_perception::pipeline::{Perception, PerceptionConfig};
//! use rockhound_perception::world_map::WorldMap;
//! use rockhound_types::{Pose, RgbImage};
//!
//! let config = PerceptionConfig::default();
//! let mut perception = Perception::new(config).unwrap();
//! let mut map = WorldMap::new(200);
//!
//! // Bright sand everywhere: lots of navigable terrain, no sample.
//! let mut frame = RgbImage::blank(320, 160);
//! frame.fill_rect(0, 0, 320, 160, [200, 190, 180]);
//!
//! let out = perception.step(&frame, &Pose::new(100.0, 100.0, 0.0), &mut map).unwrap();
//! assert!(!out.nav_angles.is_empty());
//! assert!(out.sample.is_none());
//! assert!(out.map_updated);
//! ```

use rockhound_types::{Pose, RgbImage, RoverError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::{ColorRange, classify};
use crate::image::Mask;
use crate::transform::{Homography, Quad, perspective_warp, rotate_and_translate, rover_coords, to_polar};
use crate::world_map::{Observation, StabilityGate, WorldMap};

/// Frame size the default calibration was measured on.
pub const REFERENCE_FRAME_SIZE: (usize, usize) = (320, 160);

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Camera calibration, colour bands and map geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionConfig {
    /// Corners of a known one-metre floor square as seen by the camera.
    #[serde(default = "default_calibration_source")]
    pub calibration_source: Quad,
    /// Half-size, in top-down pixels, of the destination square.
    #[serde(default = "default_dst_size")]
    pub dst_size: f64,
    /// Gap between the destination square and the bottom of the image.
    #[serde(default = "default_bottom_offset")]
    pub bottom_offset: f64,
    /// First camera row that can show floor.
    #[serde(default = "default_horizon_row")]
    pub horizon_row: usize,
    #[serde(default = "default_navigable")]
    pub navigable: ColorRange,
    #[serde(default = "default_sample")]
    pub sample: ColorRange,
    /// World map side length in cells.
    #[serde(default = "default_world_size")]
    pub world_size: usize,
    #[serde(default)]
    pub stability: StabilityGate,
}

fn default_calibration_source() -> Quad {
    [[14.0, 140.0], [301.0, 140.0], [200.0, 96.0], [118.0, 96.0]]
}
fn default_dst_size() -> f64 {
    5.0
}
fn default_bottom_offset() -> f64 {
    6.0
}
fn default_horizon_row() -> usize {
    82
}
fn default_navigable() -> ColorRange {
    ColorRange::NAVIGABLE
}
fn default_sample() -> ColorRange {
    ColorRange::SAMPLE
}
fn default_world_size() -> usize {
    200
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            calibration_source: default_calibration_source(),
            dst_size: default_dst_size(),
            bottom_offset: default_bottom_offset(),
            horizon_row: default_horizon_row(),
            navigable: default_navigable(),
            sample: default_sample(),
            world_size: default_world_size(),
            stability: StabilityGate::default(),
        }
    }
}

impl PerceptionConfig {
    /// Top-down pixels per world unit: the destination square spans one unit.
    pub fn scale(&self) -> f64 {
        2.0 * self.dst_size
    }

    /// Bottom-centred destination square for a `width × height` frame, in the
    /// same corner order as [`calibration_source`](Self::calibration_source).
    pub fn destination(&self, width: usize, height: usize) -> Quad {
        let cx = width as f64 / 2.0;
        let bottom = height as f64 - self.bottom_offset;
        let top = bottom - 2.0 * self.dst_size;
        [
            [cx - self.dst_size, bottom],
            [cx + self.dst_size, bottom],
            [cx + self.dst_size, top],
            [cx - self.dst_size, top],
        ]
    }

    /// Reject values that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<(), RoverError> {
        if !(self.dst_size.is_finite() && self.dst_size > 0.0) {
            return Err(RoverError::InvalidConfig(format!(
                "dst_size must be positive, got {}",
                self.dst_size
            )));
        }
        if !self.bottom_offset.is_finite() || self.bottom_offset < 0.0 {
            return Err(RoverError::InvalidConfig(format!(
                "bottom_offset must be non-negative, got {}",
                self.bottom_offset
            )));
        }
        if self.world_size == 0 {
            return Err(RoverError::InvalidConfig("world_size must be nonzero".to_string()));
        }
        let tolerances = [self.stability.pitch_tolerance, self.stability.roll_tolerance];
        if tolerances.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(RoverError::InvalidConfig(
                "stability tolerances must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

/// Nearest visible sample in rover-frame polar coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleFix {
    /// Distance of the closest sample pixel, top-down pixels.
    pub dist: f64,
    /// Mean bearing of all sample pixels, radians.
    pub angle: f64,
}

/// Everything one frame contributes to the rover state.
#[derive(Debug, Clone, PartialEq)]
pub struct PerceptionOutput {
    pub nav_dists: Vec<f64>,
    pub nav_angles: Vec<f64>,
    pub sample: Option<SampleFix>,
    /// Debug view: obstacles red, samples green, navigable blue.
    pub vision_image: RgbImage,
    /// Whether the stability gate let this frame into the map.
    pub map_updated: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Perception
// ────────────────────────────────────────────────────────────────────────────

/// Calibration derived for one frame size.
#[derive(Debug, Clone)]
struct FrameCalibration {
    width: usize,
    height: usize,
    homography: Homography,
    /// Top-down footprint of the camera's floor view.
    visible_floor: Mask,
}

/// The perception stage.  Holds the configuration and a calibration cache
/// keyed on frame size.
#[derive(Debug, Clone)]
pub struct Perception {
    config: PerceptionConfig,
    calibration: Option<FrameCalibration>,
}

impl Perception {
    /// Validate `config` and check that its calibration is usable.
    pub fn new(config: PerceptionConfig) -> Result<Self, RoverError> {
        config.validate()?;
        let (width, height) = REFERENCE_FRAME_SIZE;
        Homography::from_quads(&config.calibration_source, &config.destination(width, height))?;
        Ok(Self {
            config,
            calibration: None,
        })
    }

    /// Process one camera frame taken at `pose`, integrating it into `map`.
    pub fn step(
        &mut self,
        frame: &RgbImage,
        pose: &Pose,
        map: &mut WorldMap,
    ) -> Result<PerceptionOutput, RoverError> {
        let Self {
            config,
            calibration,
        } = self;
        let calibration = ensure_calibration(calibration, config, frame.width(), frame.height())?;

        let warped = perspective_warp(frame, &calibration.homography)?;
        let masks = classify(
            &warped,
            &calibration.visible_floor,
            &config.navigable,
            &config.sample,
        );
        let vision_image = render_vision(&masks.obstacles, &masks.samples, &masks.navigable);

        let (nav_x, nav_y) = rover_coords(&masks.navigable);
        let (obs_x, obs_y) = rover_coords(&masks.obstacles);
        let (smp_x, smp_y) = rover_coords(&masks.samples);

        let scale = config.scale();
        let size = map.size();
        let to_world = |xs: &[f64], ys: &[f64]| {
            rotate_and_translate(xs, ys, pose.yaw, pose.x, pose.y, scale, size)
        };
        let observation = Observation {
            navigable: to_world(&nav_x, &nav_y),
            obstacles: to_world(&obs_x, &obs_y),
            samples: to_world(&smp_x, &smp_y),
        };

        let stable = config.stability.is_stable(pose.pitch, pose.roll);
        if !stable {
            warn!(pitch = pose.pitch, roll = pose.roll, "rover tilted; skipping map update");
        }
        let map_updated = map.integrate(&observation, stable);

        let (nav_dists, nav_angles) = to_polar(&nav_x, &nav_y);
        let sample = nearest_sample(&smp_x, &smp_y);

        debug!(
            navigable = nav_angles.len(),
            obstacles = obs_x.len(),
            samples = smp_x.len(),
            map_updated,
            "frame perceived"
        );

        Ok(PerceptionOutput {
            nav_dists,
            nav_angles,
            sample,
            vision_image,
            map_updated,
        })
    }
}

/// Return the cached calibration for a `width × height` frame, rebuilding it
/// when the frame size changes.
fn ensure_calibration<'a>(
    slot: &'a mut Option<FrameCalibration>,
    config: &PerceptionConfig,
    width: usize,
    height: usize,
) -> Result<&'a FrameCalibration, RoverError> {
    let stale = slot
        .as_ref()
        .is_none_or(|c| c.width != width || c.height != height);
    if stale {
        let dst = config.destination(width, height);
        let homography = Homography::from_quads(&config.calibration_source, &dst)?;
        let floor = Mask::below_row(width, height, config.horizon_row);
        let visible_floor = perspective_warp(&floor, &homography)?;
        debug!(width, height, "calibrated for frame size");
        *slot = Some(FrameCalibration {
            width,
            height,
            homography,
            visible_floor,
        });
    }
    slot.as_ref()
        .ok_or_else(|| RoverError::DegenerateCalibration("calibration unavailable".to_string()))
}

/// Closest distance and mean bearing of the sample pixels, if any.
fn nearest_sample(xs: &[f64], ys: &[f64]) -> Option<SampleFix> {
    if xs.is_empty() {
        return None;
    }
    let (dists, angles) = to_polar(xs, ys);
    let dist = dists.iter().copied().fold(f64::INFINITY, f64::min);
    let angle = angles.iter().sum::<f64>() / angles.len() as f64;
    Some(SampleFix { dist, angle })
}

fn render_vision(obstacles: &Mask, samples: &Mask, navigable: &Mask) -> RgbImage {
    let mut image = RgbImage::blank(navigable.width(), navigable.height());
    for (channel, mask) in [obstacles, samples, navigable].into_iter().enumerate() {
        for (row, col) in mask.nonzero() {
            let mut px = image.pixel(col, row);
            px[channel] = 255;
            image.set_pixel(col, row, px);
        }
    }
    image
}
