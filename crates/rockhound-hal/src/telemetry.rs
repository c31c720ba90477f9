//! Generic `TelemetrySource` trait: pose, speed and pickup flags.

use rockhound_types::Telemetry;

/// Anything that can report the rover's current [`Telemetry`].
pub trait TelemetrySource {
    /// Latest telemetry snapshot.  Called once per tick, right after the
    /// camera frame is captured.
    fn telemetry(&self) -> Telemetry;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rockhound_types::Pose;

    struct Fixed(Telemetry);

    impl TelemetrySource for Fixed {
        fn telemetry(&self) -> Telemetry {
            self.0
        }
    }

    #[test]
    fn fixed_source_reports_its_snapshot() {
        let t = Telemetry {
            pose: Pose::new(1.0, 2.0, 45.0),
            velocity: 0.5,
            near_sample: true,
            picking_up: false,
        };
        assert_eq!(Fixed(t).telemetry(), t);
    }
}
