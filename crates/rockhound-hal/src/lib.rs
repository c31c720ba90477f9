//! `rockhound-hal` – the rover's collaborators behind traits.
//!
//! The control loop never talks to a simulator or a vehicle directly; it
//! talks to these traits, so drivers can be swapped without touching the
//! perception or decision code.
//!
//! # Modules
//!
//! - [`camera`] – [`Camera`][camera::Camera]: one RGB frame per tick.
//! - [`telemetry`] – [`TelemetrySource`][telemetry::TelemetrySource]: pose,
//!   speed and pickup flags.
//! - [`actuator`] – [`Actuation`][actuator::Actuation]: throttle, brake,
//!   steer and the pickup request.
//! - [`sim`] – [`SimRover`][sim::SimRover]: an in-process simulator that
//!   implements all three, for headless runs and tests.

pub mod actuator;
pub mod camera;
pub mod sim;
pub mod telemetry;

pub use actuator::Actuation;
pub use camera::Camera;
pub use sim::{SimConfig, SimRover};
pub use telemetry::TelemetrySource;

/// A complete rover link: one value that is camera, telemetry source and
/// drive train at once, as a simulator connection usually is.
///
/// Blanket-implemented for every type implementing the three seams.
pub trait Rover: Camera + TelemetrySource + Actuation {}

impl<T: Camera + TelemetrySource + Actuation + ?Sized> Rover for T {}
