//! Generic `Camera` trait for the rover's forward-facing image source.

use rockhound_types::{RgbImage, RoverError};

/// A camera or frame source.
///
/// The control loop pulls exactly one frame per tick through this trait, so a
/// live simulator link, a replay of recorded frames and [`SimRover`] are
/// interchangeable.
///
/// [`SimRover`]: crate::sim::SimRover
pub trait Camera {
    /// Stable identifier for this camera, e.g. `"front_rgb"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if no frame can be produced
    /// (e.g. the link dropped or the buffer is malformed).
    fn capture(&mut self) -> Result<RgbImage, RoverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReplayCamera {
        frames: Vec<RgbImage>,
    }

    impl Camera for ReplayCamera {
        fn id(&self) -> &str {
            "replay"
        }

        fn capture(&mut self) -> Result<RgbImage, RoverError> {
            self.frames.pop().ok_or_else(|| RoverError::HardwareFault {
                component: self.id().to_string(),
                details: "replay exhausted".to_string(),
            })
        }
    }

    #[test]
    fn replay_camera_yields_frames_then_faults() {
        let mut cam = ReplayCamera {
            frames: vec![RgbImage::blank(2, 2)],
        };
        assert_eq!(cam.capture().unwrap().width(), 2);
        let err = cam.capture().unwrap_err();
        assert!(err.to_string().contains("replay exhausted"));
    }
}
