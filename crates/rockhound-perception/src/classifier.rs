//! Colour-threshold terrain classifier.
//!
//! Navigable ground in the simulator is light sand, rock samples are saturated
//! yellow.  Both are found by requiring every RGB channel to fall inside an
//! inclusive band.  Obstacles are not thresholded at all: they are whatever
//! the camera can see on the floor that is not navigable.

use rockhound_types::RgbImage;
use serde::{Deserialize, Serialize};

use crate::image::Mask;

/// Inclusive per-channel band `low[c] <= pixel[c] <= high[c]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub low: [u8; 3],
    pub high: [u8; 3],
}

impl ColorRange {
    pub const fn new(low: [u8; 3], high: [u8; 3]) -> Self {
        Self { low, high }
    }

    /// Light ground the rover can drive on.
    pub const NAVIGABLE: Self = Self::new([130, 140, 150], [255, 255, 255]);

    /// Yellow rock samples.
    pub const SAMPLE: Self = Self::new([120, 120, 0], [255, 255, 70]);

    /// `true` iff each channel independently lies inside its band.
    pub fn contains(&self, rgb: [u8; 3]) -> bool {
        (0..3).all(|c| self.low[c] <= rgb[c] && rgb[c] <= self.high[c])
    }
}

/// Binary mask of the pixels whose colour lies inside `range`.
pub fn color_thresh(image: &RgbImage, range: &ColorRange) -> Mask {
    let (w, h) = (image.width(), image.height());
    let mut mask = Mask::zeros(w, h);
    for (i, px) in image.data().chunks_exact(3).enumerate() {
        if range.contains([px[0], px[1], px[2]]) {
            mask.set(i % w, i / w, true);
        }
    }
    mask
}

/// The three masks produced for one top-down frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerrainMasks {
    pub navigable: Mask,
    pub obstacles: Mask,
    pub samples: Mask,
}

/// Classify a warped frame.
///
/// `visible_floor` is the warped field-of-view mask: navigable and obstacle
/// pixels only exist inside it.  Samples are kept wherever they appear.
pub fn classify(
    warped: &RgbImage,
    visible_floor: &Mask,
    navigable: &ColorRange,
    sample: &ColorRange,
) -> TerrainMasks {
    let navigable = color_thresh(warped, navigable).and(visible_floor);
    let obstacles = visible_floor.and_not(&navigable);
    let samples = color_thresh(warped, sample);
    TerrainMasks {
        navigable,
        obstacles,
        samples,
    }
}
