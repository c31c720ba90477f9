//! `rockhound-runtime` – the rover's control loop.
//!
//! Ties perception and decision together over a single [`RoverState`] and
//! drives a [`Rover`][rockhound_hal::Rover] link one tick at a time.
//!
//! # Modules
//!
//! - [`state`] – [`RoverState`][state::RoverState]: the mutable record
//!   threaded through every tick, including the world map.
//! - [`decision`] – [`decision_step`][decision::decision_step] and
//!   [`DriveConfig`][decision::DriveConfig]: the four-mode state machine
//!   producing throttle, brake, steer and the pickup request.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: the
//!   perceive → decide → act orchestrator and its per-tick
//!   [`TickReport`][control_loop::TickReport].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with optional OTLP span export.

pub mod control_loop;
pub mod decision;
pub mod state;
pub mod telemetry;

pub use control_loop::{ControlLoop, TickReport};
pub use decision::{DriveConfig, check_pickup, decision_step};
pub use state::RoverState;
pub use telemetry::{TracerProviderGuard, init_tracing};
