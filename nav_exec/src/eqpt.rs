//! # Equipment interfaces
//!
//! The navigator does not drive any hardware itself. Instead it is given a
//! [`MotionActuator`] and a [`RangeSensor`] when it is constructed and issues
//! all of its demands through them. Hardware (or the simulated rover in
//! [`crate::sim`]) implements these traits.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Drive and steering demands for the rover.
///
/// Speeds are in the range `0..=100` and steer angles in `-35..=35` degrees. Units and scaling
/// beyond that are up to the implementation, as is the behaviour for out of range values.
pub trait MotionActuator {
    /// Drive forwards at `speed` with the steering set to `steer_deg`.
    ///
    /// Positive steer angles turn the rover to the right (clockwise seen from above).
    fn drive(&mut self, speed: f64, steer_deg: f64) -> Result<(), EqptError>;

    /// Drive backwards at `speed`, keeping the current steer angle.
    fn reverse(&mut self, speed: f64) -> Result<(), EqptError>;

    /// Stop all drive motors. Stop shall not change the steering angle.
    fn stop(&mut self) -> Result<(), EqptError>;

    /// Set the steering angle without changing the drive demand.
    fn set_steer_deg(&mut self, steer_deg: f64) -> Result<(), EqptError>;
}

/// A single forward facing range sensor.
pub trait RangeSensor {
    /// Read the distance to the nearest object in front of the rover in centimeters.
    ///
    /// A reading of zero (or any non-positive value) means no echo was received.
    fn read_distance_cm(&mut self) -> Result<f64, EqptError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised by equipment collaborators.
#[derive(Debug, thiserror::Error)]
pub enum EqptError {
    #[error("Equipment is not available: {0}")]
    Unavailable(String),

    #[error("Equipment rejected the command: {0}")]
    CommandRejected(String),
}

/// A record of a single actuator demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ActuatorCmd {
    Drive { speed: f64, steer_deg: f64 },
    Reverse { speed: f64 },
    Stop,
    SetSteer { steer_deg: f64 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ActuatorCmd {
    /// Returns true if the command makes the rover move.
    pub fn is_motion(&self) -> bool {
        matches!(self, ActuatorCmd::Drive { .. } | ActuatorCmd::Reverse { .. })
    }
}

/// Returns true if a range reading indicates an obstacle closer than `threshold_cm`.
///
/// Non-positive readings are "no echo" and never count as an obstacle, even though some sensors
/// also report zero when an object is too close to measure.
pub fn is_obstacle(distance_cm: f64, threshold_cm: f64) -> bool {
    distance_cm > 0.0 && distance_cm < threshold_cm
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_obstacle_boundaries() {
        let threshold = 25.0;

        assert!(!is_obstacle(threshold, threshold));
        assert!(!is_obstacle(0.0, threshold));
        assert!(!is_obstacle(-1.0, threshold));
        assert!(!is_obstacle(f64::NAN, threshold));
        assert!(!is_obstacle(120.0, threshold));
        assert!(is_obstacle(threshold - 1e-9, threshold));
        assert!(is_obstacle(15.0, threshold));
        assert!(is_obstacle(0.1, threshold));
    }

    #[test]
    fn test_is_motion() {
        assert!(ActuatorCmd::Drive { speed: 30.0, steer_deg: 0.0 }.is_motion());
        assert!(ActuatorCmd::Reverse { speed: 30.0 }.is_motion());
        assert!(!ActuatorCmd::Stop.is_motion());
        assert!(!ActuatorCmd::SetSteer { steer_deg: 0.0 }.is_motion());
    }
}
