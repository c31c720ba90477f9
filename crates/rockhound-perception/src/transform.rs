//! Geometric transform chain: camera image → top-down view → rover frame →
//! polar / world grid.
//!
//! All functions are pure.  The chain used every tick is:
//!
//! 1. [`perspective_warp`] – project the camera frame (and the visible-floor
//!    mask) onto a top-down view using a calibrated [`Homography`].
//! 2. [`rover_coords`] – turn every set pixel of a top-down mask into
//!    rover-frame coordinates (x forward, y left, pixel units).
//! 3. [`to_polar`] – (distance, bearing) of those pixels, used for steering.
//! 4. [`rotate_and_translate`] – rotate by yaw, scale and translate into the
//!    world grid, saturating out-of-range points onto the map edge.
//!
//! # Example
//!
//! ```rust
//! use rockhound_perception::transform::Homography;
//!
//! // A pure scaling: the unit square onto a 2×2 square.
//! let src = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
//! let dst = [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]];
//! let h = Homography::from_quads(&src, &dst).unwrap();
//!
//! let p = h.apply([0.5, 0.25]).unwrap();
//! assert!((p[0] - 1.0).abs() < 1e-9);
//! assert!((p[1] - 0.5).abs() < 1e-9);
//! ```

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use rockhound_types::RoverError;

use crate::image::{Mask, Raster};

const EPS: f64 = 1e-12;

/// An image-plane point `[x, y]` (column, row).
pub type Point2 = [f64; 2];

/// Four corresponding points defining a projective transform.
pub type Quad = [Point2; 4];

// ────────────────────────────────────────────────────────────────────────────
// Homography
// ────────────────────────────────────────────────────────────────────────────

/// A 3×3 projective transform together with its inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Homography {
    /// Solve for the transform mapping each `src[i]` onto `dst[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::DegenerateCalibration`] when the points do not
    /// determine an invertible transform (repeated or collinear corners).
    pub fn from_quads(src: &Quad, dst: &Quad) -> Result<Self, RoverError> {
        // Eight unknowns h00..h21 with h22 fixed to 1; two equations per pair.
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for (i, (&[x, y], &[u, v])) in src.iter().zip(dst).enumerate() {
            let r = 2 * i;
            a[(r, 0)] = x;
            a[(r, 1)] = y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -x * u;
            a[(r, 7)] = -y * u;
            b[r] = u;

            a[(r + 1, 3)] = x;
            a[(r + 1, 4)] = y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -x * v;
            a[(r + 1, 7)] = -y * v;
            b[r + 1] = v;
        }

        let h = a
            .lu()
            .solve(&b)
            .filter(|h| h.iter().all(|c| c.is_finite()))
            .ok_or_else(|| {
                RoverError::DegenerateCalibration(
                    "calibration corners are repeated or collinear".to_string(),
                )
            })?;

        let forward = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        let inverse = forward.try_inverse().ok_or_else(|| {
            RoverError::DegenerateCalibration("projective transform is singular".to_string())
        })?;

        Ok(Self { forward, inverse })
    }

    /// Map a source-image point into the destination image.
    pub fn apply(&self, p: Point2) -> Option<Point2> {
        project(&self.forward, p)
    }

    /// Map a destination-image point back into the source image.
    pub fn apply_inverse(&self, p: Point2) -> Option<Point2> {
        project(&self.inverse, p)
    }
}

fn project(m: &Matrix3<f64>, p: Point2) -> Option<Point2> {
    let v = m * Vector3::new(p[0], p[1], 1.0);
    let w = v[2];
    if !w.is_finite() || w.abs() <= EPS || !v[0].is_finite() || !v[1].is_finite() {
        return None;
    }
    Some([v[0] / w, v[1] / w])
}

// ────────────────────────────────────────────────────────────────────────────
// Perspective warp
// ────────────────────────────────────────────────────────────────────────────

/// Warp `image` through `homography`, keeping the input dimensions.
///
/// Each output pixel is pulled from the source by the inverse transform with
/// bilinear interpolation.  Taps that fall outside the source read as zero, so
/// regions the camera never saw stay black (or cleared, for a [`Mask`]).
pub fn perspective_warp<R: Raster>(image: &R, homography: &Homography) -> Result<R, RoverError> {
    let (w, h, ch) = (image.width(), image.height(), R::CHANNELS);
    let src = image.samples();
    let mut out = vec![0u8; w * h * ch];

    for y in 0..h {
        for x in 0..w {
            let Some([sx, sy]) = homography.apply_inverse([x as f64, y as f64]) else {
                continue;
            };
            let (x0, y0) = (sx.floor(), sy.floor());
            let (fx, fy) = (sx - x0, sy - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);
            let base = (y * w + x) * ch;

            for c in 0..ch {
                let tap = |xi: i64, yi: i64| -> f64 {
                    if xi < 0 || yi < 0 || xi >= w as i64 || yi >= h as i64 {
                        0.0
                    } else {
                        f64::from(src[(yi as usize * w + xi as usize) * ch + c])
                    }
                };
                let v = tap(x0, y0) * (1.0 - fx) * (1.0 - fy)
                    + tap(x0 + 1, y0) * fx * (1.0 - fy)
                    + tap(x0, y0 + 1) * (1.0 - fx) * fy
                    + tap(x0 + 1, y0 + 1) * fx * fy;
                out[base + c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    R::from_samples(w, h, out)
}

/// Solve the transform for `src → dst` and warp `image` through it.
pub fn perspective_transform<R: Raster>(image: &R, src: &Quad, dst: &Quad) -> Result<R, RoverError> {
    let homography = Homography::from_quads(src, dst)?;
    perspective_warp(image, &homography)
}

// ────────────────────────────────────────────────────────────────────────────
// Rover frame and polar coordinates
// ────────────────────────────────────────────────────────────────────────────

/// Rover-frame coordinates of every set pixel of a top-down `mask`.
///
/// The rover sits at the bottom-centre of the image:
/// `x = height − row` (forward), `y = width/2 − column` (left).
pub fn rover_coords(mask: &Mask) -> (Vec<f64>, Vec<f64>) {
    let height = mask.height() as f64;
    let half_width = mask.width() as f64 / 2.0;
    mask.nonzero()
        .map(|(row, col)| (height - row as f64, half_width - col as f64))
        .unzip()
}

/// `(distance, angle)` of each rover-frame point; angle in radians from the
/// forward axis, positive to the left.
pub fn to_polar(xs: &[f64], ys: &[f64]) -> (Vec<f64>, Vec<f64>) {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| ((x * x + y * y).sqrt(), y.atan2(x)))
        .unzip()
}

// ────────────────────────────────────────────────────────────────────────────
// World frame
// ────────────────────────────────────────────────────────────────────────────

/// Integer cell of the world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridCell {
    pub x: usize,
    pub y: usize,
}

/// Rotate rover-frame points counter-clockwise by `yaw_deg`.
pub fn rotate_pix(xs: &[f64], ys: &[f64], yaw_deg: f64) -> (Vec<f64>, Vec<f64>) {
    let (sin, cos) = yaw_deg.to_radians().sin_cos();
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| (x * cos - y * sin, x * sin + y * cos))
        .unzip()
}

/// Scale rotated points down by `scale` pixels per world unit and offset them
/// by the rover position.
pub fn translate_pix(
    xs: &[f64],
    ys: &[f64],
    x_pos: f64,
    y_pos: f64,
    scale: f64,
) -> (Vec<f64>, Vec<f64>) {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| (x / scale + x_pos, y / scale + y_pos))
        .unzip()
}

/// Project rover-frame points into world grid cells.
///
/// Points beyond the map are saturated onto the nearest edge cell rather than
/// dropped.  Coordinates are clipped to `[0, world_size − 1]` and then rounded
/// down, which matches truncating toward zero before clipping.
pub fn rotate_and_translate(
    xs: &[f64],
    ys: &[f64],
    yaw_deg: f64,
    x_pos: f64,
    y_pos: f64,
    scale: f64,
    world_size: usize,
) -> Vec<GridCell> {
    let (xr, yr) = rotate_pix(xs, ys, yaw_deg);
    let (xt, yt) = translate_pix(&xr, &yr, x_pos, y_pos, scale);
    let max = world_size.saturating_sub(1) as f64;
    let to_index = |v: f64| v.clamp(0.0, max).floor() as usize;
    xt.iter()
        .zip(&yt)
        .map(|(&x, &y)| GridCell {
            x: to_index(x),
            y: to_index(y),
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
