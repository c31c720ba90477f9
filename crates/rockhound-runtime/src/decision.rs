//! Decision state machine.
//!
//! [`decision_step`] reads the perception fields of a [`RoverState`] plus its
//! telemetry and writes throttle, brake, steer, the mode and the pickup
//! request.  It is a pure function of the state, the [`DriveConfig`] and the
//! injected clock, so identical inputs always produce identical outputs.
//!
//! | Mode | Behaviour |
//! |---|---|
//! | `Forward` | follow the mean navigable bearing; stop when terrain runs out; face any visible sample |
//! | `Stop` | brake to rest, then turn in place until enough terrain opens up |
//! | `FaceSample` | brake to rest, then turn until the sample is roughly ahead |
//! | `ApproachSample` | creep toward the sample, brake inside pickup range, give up after a timeout |
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//!
//! use rockhound_runtime::decision::{DriveConfig, decision_step};
//! use rockhound_runtime::state::RoverState;
//! use rockhound_types::Mode;
//!
//! let cfg = DriveConfig::default();
//! let now = Instant::now();
//! let mut state = RoverState::new(200, now);
//!
//! // Almost no navigable terrain ahead: brake and switch to Stop.
//! state.nav_angles = Some(vec![0.0; 10]);
//! decision_step(&mut state, &cfg, now);
//!
//! assert_eq!(state.mode, Mode::Stop);
//! assert_eq!(state.brake, cfg.brake_set);
//! ```

use std::time::Instant;

use rockhound_types::{Mode, RoverError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::RoverState;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Drive thresholds and setpoints.  Constant for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Navigable pixel count below which `Forward` gives up and stops.
    #[serde(default = "default_stop_forward")]
    pub stop_forward: usize,
    /// Navigable pixel count at which `Stop` drives off again.
    #[serde(default = "default_go_forward")]
    pub go_forward: usize,
    #[serde(default = "default_max_vel")]
    pub max_vel: f64,
    #[serde(default = "default_throttle_set")]
    pub throttle_set: f64,
    #[serde(default = "default_brake_set")]
    pub brake_set: f64,
    /// Seconds an approach may go without a sample fix.
    #[serde(default = "default_sample_timeout")]
    pub sample_timeout: f64,
    /// Steering limit, degrees either side.
    #[serde(default = "default_max_steer")]
    pub max_steer: f64,
    /// Speed at or below which the rover counts as stopped.
    #[serde(default = "default_stopped_velocity")]
    pub stopped_velocity: f64,
    /// Bearing (degrees) inside which a sample counts as ahead.
    #[serde(default = "default_facing_tolerance_deg")]
    pub facing_tolerance_deg: f64,
    /// Sample distance (top-down pixels) at which the approach brakes.
    #[serde(default = "default_pickup_distance")]
    pub pickup_distance: f64,
    /// Throttle while searching for a lost sample.
    #[serde(default = "default_creep_throttle")]
    pub creep_throttle: f64,
    /// Throttle while closing in on a visible sample.
    #[serde(default = "default_approach_throttle")]
    pub approach_throttle: f64,
    /// Share of the terrain bearing blended into the steer on each
    /// approach timeout.
    #[serde(default = "default_course_correction_gain")]
    pub course_correction_gain: f64,
}

fn default_stop_forward() -> usize {
    50
}
fn default_go_forward() -> usize {
    500
}
fn default_max_vel() -> f64 {
    2.0
}
fn default_throttle_set() -> f64 {
    0.2
}
fn default_brake_set() -> f64 {
    10.0
}
fn default_sample_timeout() -> f64 {
    5.0
}
fn default_max_steer() -> f64 {
    15.0
}
fn default_stopped_velocity() -> f64 {
    0.2
}
fn default_facing_tolerance_deg() -> f64 {
    10.0
}
fn default_pickup_distance() -> f64 {
    10.0
}
fn default_creep_throttle() -> f64 {
    0.05
}
fn default_approach_throttle() -> f64 {
    0.1
}
fn default_course_correction_gain() -> f64 {
    0.5
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            stop_forward: default_stop_forward(),
            go_forward: default_go_forward(),
            max_vel: default_max_vel(),
            throttle_set: default_throttle_set(),
            brake_set: default_brake_set(),
            sample_timeout: default_sample_timeout(),
            max_steer: default_max_steer(),
            stopped_velocity: default_stopped_velocity(),
            facing_tolerance_deg: default_facing_tolerance_deg(),
            pickup_distance: default_pickup_distance(),
            creep_throttle: default_creep_throttle(),
            approach_throttle: default_approach_throttle(),
            course_correction_gain: default_course_correction_gain(),
        }
    }
}

impl DriveConfig {
    /// Reject non-finite or negative tunables.
    pub fn validate(&self) -> Result<(), RoverError> {
        let fields = [
            ("max_vel", self.max_vel),
            ("throttle_set", self.throttle_set),
            ("brake_set", self.brake_set),
            ("sample_timeout", self.sample_timeout),
            ("max_steer", self.max_steer),
            ("stopped_velocity", self.stopped_velocity),
            ("facing_tolerance_deg", self.facing_tolerance_deg),
            ("pickup_distance", self.pickup_distance),
            ("creep_throttle", self.creep_throttle),
            ("approach_throttle", self.approach_throttle),
            ("course_correction_gain", self.course_correction_gain),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(RoverError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    fn clip_steer(&self, degrees: f64) -> f64 {
        degrees.clamp(-self.max_steer, self.max_steer)
    }

    /// Clipped mean bearing of `angles` in degrees; `None` for an empty set.
    fn mean_steer(&self, angles: &[f64]) -> Option<f64> {
        if angles.is_empty() {
            return None;
        }
        let mean = angles.iter().map(|a| a.to_degrees()).sum::<f64>() / angles.len() as f64;
        Some(self.clip_steer(mean))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Decision step
// ────────────────────────────────────────────────────────────────────────────

/// Advance the state machine by one tick.
///
/// A no-op for the outputs and mode until the first frame has been
/// perceived (`nav_angles` is `None`).  The pickup trigger is checked every
/// tick regardless.
pub fn decision_step(state: &mut RoverState, cfg: &DriveConfig, now: Instant) {
    let before = state.mode;

    if let Some(nav_angles) = state.nav_angles.take() {
        match state.mode {
            Mode::Forward => forward(state, cfg, &nav_angles),
            Mode::Stop => stop(state, cfg, &nav_angles),
            Mode::FaceSample => face_sample(state, cfg, now),
            Mode::ApproachSample => approach_sample(state, cfg, &nav_angles, now),
        }
        state.nav_angles = Some(nav_angles);
    }
    pickup_trigger(state);
    log_transition(before, state.mode);
}

/// Run only the pickup trigger, for a tick whose frame never reached the
/// state machine (camera or perception failure).
pub fn check_pickup(state: &mut RoverState) {
    let before = state.mode;
    pickup_trigger(state);
    log_transition(before, state.mode);
}

fn pickup_trigger(state: &mut RoverState) {
    if state.near_sample && state.velocity == 0.0 && !state.picking_up {
        if !state.send_pickup {
            info!(x = state.pose.x, y = state.pose.y, "requesting sample pickup");
        }
        state.send_pickup = true;
        state.sample_dist = None;
        state.sample_angle = None;
        state.mode = Mode::Forward;
    }
}

fn log_transition(before: Mode, after: Mode) {
    if after != before {
        info!(from = %before, to = %after, "mode transition");
    }
}

fn forward(state: &mut RoverState, cfg: &DriveConfig, nav_angles: &[f64]) {
    if state.sample_angle.is_some() {
        state.mode = Mode::FaceSample;
    } else if nav_angles.len() >= cfg.stop_forward {
        state.throttle = if state.velocity < cfg.max_vel {
            cfg.throttle_set
        } else {
            0.0
        };
        state.brake = 0.0;
        if let Some(steer) = cfg.mean_steer(nav_angles) {
            state.steer = steer;
        }
    } else {
        state.throttle = 0.0;
        state.brake = cfg.brake_set;
        state.steer = 0.0;
        state.mode = Mode::Stop;
    }
}

fn stop(state: &mut RoverState, cfg: &DriveConfig, nav_angles: &[f64]) {
    if state.velocity > cfg.stopped_velocity {
        state.throttle = 0.0;
        state.brake = cfg.brake_set;
        state.steer = 0.0;
        return;
    }
    // Two independent checks; the second wins on a tie.
    if nav_angles.len() < cfg.go_forward {
        state.throttle = 0.0;
        state.brake = 0.0;
        state.steer = -cfg.max_steer;
    }
    if nav_angles.len() >= cfg.go_forward {
        state.throttle = cfg.throttle_set;
        state.brake = 0.0;
        if let Some(steer) = cfg.mean_steer(nav_angles) {
            state.steer = steer;
        }
        state.mode = Mode::Forward;
    }
}

fn face_sample(state: &mut RoverState, cfg: &DriveConfig, now: Instant) {
    if state.velocity > cfg.stopped_velocity {
        state.brake = cfg.brake_set;
        return;
    }
    state.brake = 0.0;
    match state.sample_angle.map(f64::to_degrees) {
        Some(bearing) if bearing.abs() > cfg.facing_tolerance_deg => {
            state.steer = cfg.clip_steer(bearing);
        }
        _ => {
            state.mode = Mode::ApproachSample;
            state.sample_timer = now;
        }
    }
}

fn approach_sample(state: &mut RoverState, cfg: &DriveConfig, nav_angles: &[f64], now: Instant) {
    let elapsed = now.saturating_duration_since(state.sample_timer).as_secs_f64();

    let (Some(dist), Some(angle)) = (state.sample_dist, state.sample_angle) else {
        if elapsed > cfg.sample_timeout {
            state.mode = Mode::Forward;
        } else {
            state.throttle = cfg.creep_throttle;
            state.steer /= 2.0;
        }
        return;
    };

    state.steer = cfg.clip_steer(angle.to_degrees());
    if dist > cfg.pickup_distance {
        if elapsed >= cfg.sample_timeout {
            if let Some(terrain) = cfg.mean_steer(nav_angles) {
                state.steer = cfg.clip_steer(state.steer + terrain * cfg.course_correction_gain);
            }
            state.sample_timer = now;
        }
        state.throttle = if state.velocity > cfg.stopped_velocity {
            0.0
        } else {
            cfg.approach_throttle
        };
        state.brake = 0.0;
    } else {
        state.throttle = 0.0;
        state.brake = cfg.brake_set;
        state.steer = 0.0;
    }
}
