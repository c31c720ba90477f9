//! `rockhound-types` – shared data model for the rockhound rover stack.
//!
//! Everything that crosses a crate boundary lives here: the rover's control
//! [`Mode`], the per-tick [`Telemetry`] snapshot, the [`DriveCommand`] handed to
//! the actuation layer, the raw camera [`RgbImage`], and the workspace-wide
//! [`RoverError`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decision state of the rover.
///
/// Exactly one mode is active at a time; transitions only happen inside the
/// runtime's decision step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Explore by following the mean bearing of navigable terrain.
    #[default]
    Forward,
    /// Brake to a halt, then rotate in place until terrain opens up.
    Stop,
    /// Stop and turn in place until a visible sample is roughly ahead.
    FaceSample,
    /// Creep toward a sample and stop within pickup range.
    ApproachSample,
}

impl Mode {
    /// Stable lowercase name, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Forward => "forward",
            Mode::Stop => "stop",
            Mode::FaceSample => "face_sample",
            Mode::ApproachSample => "approach_sample",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = RoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "forward" => Ok(Mode::Forward),
            "stop" => Ok(Mode::Stop),
            "face_sample" => Ok(Mode::FaceSample),
            "approach_sample" => Ok(Mode::ApproachSample),
            other => Err(RoverError::UnknownMode(other.to_string())),
        }
    }
}

/// Rover pose in the world frame.
///
/// Angles are in degrees as reported by the simulator, stored on a `[0, 360)`
/// wrap.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            yaw,
            pitch: 0.0,
            roll: 0.0,
        }
    }
}

/// Telemetry snapshot delivered alongside every camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Telemetry {
    pub pose: Pose,
    /// Forward speed in world units per second.
    pub velocity: f64,
    /// Set by the simulator when a sample is within pickup reach.
    pub near_sample: bool,
    /// Set by the simulator while a pickup is in progress.
    pub picking_up: bool,
}

/// Control outputs produced by one decision step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriveCommand {
    pub throttle: f64,
    pub brake: f64,
    /// Steering angle in degrees, positive to the left.
    pub steer: f64,
    /// Request for the actuation layer to issue a pickup.
    pub send_pickup: bool,
}

/// An interleaved RGB24 camera frame, row-major, origin at the top-left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl RgbImage {
    /// Wrap a raw RGB24 buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::FrameSize`] when `data.len() != width * height * 3`.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self, RoverError> {
        let expected = width * height * 3;
        if data.len() != expected {
            return Err(RoverError::FrameSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// An all-black frame.
    pub fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 3],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The `[r, g, b]` triple at column `x`, row `y`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` lies outside the frame.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Overwrite the pixel at column `x`, row `y`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` lies outside the frame.
    pub fn set_pixel(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
        let i = (y * self.width + x) * 3;
        self.data[i..i + 3].copy_from_slice(&rgb);
    }

    /// Paint the rectangle `[x0, x1) × [y0, y1)` (clipped to the frame).
    pub fn fill_rect(&mut self, x0: usize, y0: usize, x1: usize, y1: usize, rgb: [u8; 3]) {
        for y in y0..y1.min(self.height) {
            for x in x0..x1.min(self.width) {
                self.set_pixel(x, y, rgb);
            }
        }
    }
}

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoverError {
    /// A mode name outside the closed set of rover modes. Always fatal: it
    /// means the rover state was corrupted or initialised incorrectly.
    #[error("Unknown rover mode: {0:?}")]
    UnknownMode(String),

    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("Degenerate calibration: {0}")]
    DegenerateCalibration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_every_known_name() {
        for mode in [
            Mode::Forward,
            Mode::Stop,
            Mode::FaceSample,
            Mode::ApproachSample,
        ] {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_is_an_error() {
        let err = "reverse".parse::<Mode>().unwrap_err();
        assert_eq!(err, RoverError::UnknownMode("reverse".to_string()));
        assert!(err.to_string().contains("reverse"));
    }

    #[test]
    fn mode_serializes_in_snake_case() {
        let json = serde_json::to_string(&Mode::ApproachSample).unwrap();
        assert_eq!(json, "\"approach_sample\"");
        let back: Mode = serde_json::from_str("\"face_sample\"").unwrap();
        assert_eq!(back, Mode::FaceSample);
        assert!(serde_json::from_str::<Mode>("\"dance\"").is_err());
    }

    #[test]
    fn default_mode_is_forward() {
        assert_eq!(Mode::default(), Mode::Forward);
    }

    #[test]
    fn rgb_image_rejects_wrong_buffer_length() {
        let err = RgbImage::from_raw(4, 2, vec![0; 10]).unwrap_err();
        assert_eq!(
            err,
            RoverError::FrameSize {
                expected: 24,
                actual: 10
            }
        );
    }

    #[test]
    fn rgb_image_pixel_access() {
        let mut img = RgbImage::blank(3, 2);
        img.set_pixel(2, 1, [10, 20, 30]);
        assert_eq!(img.pixel(2, 1), [10, 20, 30]);
        assert_eq!(img.pixel(0, 0), [0, 0, 0]);
        assert_eq!(&img.data()[15..18], &[10, 20, 30]);
    }

    #[test]
    fn fill_rect_is_clipped_to_frame() {
        let mut img = RgbImage::blank(4, 4);
        img.fill_rect(2, 2, 10, 10, [255, 255, 255]);
        assert_eq!(img.pixel(3, 3), [255, 255, 255]);
        assert_eq!(img.pixel(1, 3), [0, 0, 0]);
    }

    #[test]
    fn hardware_fault_display() {
        let err = RoverError::HardwareFault {
            component: "front_camera".to_string(),
            details: "buffer underrun".to_string(),
        };
        assert!(err.to_string().contains("front_camera"));
    }
}
