//! Generic `Actuation` trait: the sink for throttle, brake, steer and pickup
//! commands.

use rockhound_types::{DriveCommand, RoverError};

/// The rover's drive train and sample arm.
///
/// When `command.send_pickup` is set the implementation issues the pickup.
/// The caller then clears its own `send_pickup` flag so the request is sent
/// only once.
pub trait Actuation {
    /// Apply one tick's command.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the command cannot be applied
    /// (e.g. a non-finite setpoint or a lost link).
    fn actuate(&mut self, command: &DriveCommand) -> Result<(), RoverError>;
}

/// Reject commands carrying NaN or infinite setpoints.
pub fn check_finite(component: &str, command: &DriveCommand) -> Result<(), RoverError> {
    let fields = [
        ("throttle", command.throttle),
        ("brake", command.brake),
        ("steer", command.steer),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(RoverError::HardwareFault {
                component: component.to_string(),
                details: format!("{name} setpoint {value} is not finite"),
            });
        }
    }
    Ok(())
}
