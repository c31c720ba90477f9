//! Raster primitives shared by the transform and classifier stages.
//!
//! [`Raster`] abstracts over interleaved 8-bit images so the perspective warp
//! runs identically on the three-channel camera frame and on a single-channel
//! [`Mask`].

use rockhound_types::{RgbImage, RoverError};

/// An interleaved, row-major 8-bit image with a fixed channel count.
pub trait Raster: Sized {
    /// Samples per pixel.
    const CHANNELS: usize;

    fn width(&self) -> usize;
    fn height(&self) -> usize;

    /// All samples, `width * height * CHANNELS` long.
    fn samples(&self) -> &[u8];

    /// Rebuild a raster of the same kind from raw samples.
    fn from_samples(width: usize, height: usize, samples: Vec<u8>) -> Result<Self, RoverError>;
}

impl Raster for RgbImage {
    const CHANNELS: usize = 3;

    fn width(&self) -> usize {
        RgbImage::width(self)
    }

    fn height(&self) -> usize {
        RgbImage::height(self)
    }

    fn samples(&self) -> &[u8] {
        self.data()
    }

    fn from_samples(width: usize, height: usize, samples: Vec<u8>) -> Result<Self, RoverError> {
        RgbImage::from_raw(width, height, samples)
    }
}

/// A single-channel binary image. Any nonzero sample counts as set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Mask {
    /// A mask with every pixel cleared.
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// A mask with every row at or below `first_row` set.
    ///
    /// Used for the visible-floor mask: rows above the horizon never show
    /// ground and must not contribute navigable or obstacle pixels.
    pub fn below_row(width: usize, height: usize, first_row: usize) -> Self {
        let mut mask = Self::zeros(width, height);
        let start = first_row.min(height) * width;
        mask.data[start..].fill(1);
        mask
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        self.data[y * self.width + x] = u8::from(on);
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// Pixel-wise `self AND other`.
    pub fn and(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a && b)
    }

    /// Pixel-wise `self AND NOT other`.
    pub fn and_not(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a && !b)
    }

    /// `(row, column)` of every set pixel in row-major order.
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let width = self.width;
        self.data
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0)
            .map(move |(i, _)| (i / width, i % width))
    }

    fn zip_with(&self, other: &Mask, f: impl Fn(bool, bool) -> bool) -> Mask {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| u8::from(f(a != 0, b != 0)))
            .collect();
        Mask {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

impl Raster for Mask {
    const CHANNELS: usize = 1;

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn samples(&self) -> &[u8] {
        &self.data
    }

    fn from_samples(width: usize, height: usize, samples: Vec<u8>) -> Result<Self, RoverError> {
        if samples.len() != width * height {
            return Err(RoverError::FrameSize {
                expected: width * height,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data: samples,
        })
    }
}
