//! `rockhound-perception` – turns a camera frame into navigation data.
//!
//! Every tick the rover's camera frame is warped to a top-down view,
//! classified into terrain, projected into the world, and summarised as
//! polar bearings the decision layer can steer by.
//!
//! # Modules
//!
//! - [`image`] – [`Raster`][image::Raster] abstraction and the binary
//!   [`Mask`][image::Mask] used between stages.
//! - [`transform`] – [`Homography`][transform::Homography], perspective warp,
//!   rover-frame, polar and world-grid conversions.
//! - [`classifier`] – [`ColorRange`][classifier::ColorRange] thresholds for
//!   navigable ground and rock samples; obstacles are derived.
//! - [`world_map`] – [`WorldMap`][world_map::WorldMap]: monotonic hit-count
//!   grid guarded by a pitch/roll [`StabilityGate`][world_map::StabilityGate].
//! - [`pipeline`] – [`Perception`][pipeline::Perception]: runs all of the
//!   above for one frame and returns a
//!   [`PerceptionOutput`][pipeline::PerceptionOutput].

pub mod classifier;
pub mod image;
pub mod pipeline;
pub mod transform;
pub mod world_map;

pub use pipeline::{Perception, PerceptionConfig, PerceptionOutput, SampleFix};
pub use world_map::{Layer, WorldMap};
