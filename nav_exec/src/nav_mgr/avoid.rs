//! # Obstacle avoidance manouvre
//!
//! A fixed escape sequence run when an obstacle is detected: back up, turn right, drive past,
//! turn back left and resume navigation. One step is executed per control cycle. The sequence is
//! committed once started, range readings are not checked again until it has finished.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::delay::DelayMs;
use log::info;
use serde::{Deserialize, Serialize};

use super::{DriveDir, NavError, NavState, Navigator};
use crate::eqpt::{MotionActuator, RangeSensor};
use util::maths::wrap_deg_360;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the avoidance manouvre.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidParams {
    /// How long to reverse for.
    ///
    /// Units: seconds
    pub backup_duration_s: f64,

    /// Heading change of the turn away from and back towards the original heading.
    ///
    /// Units: degrees
    pub turn_angle_deg: f64,

    /// How long to drive forwards past the obstacle.
    ///
    /// Units: seconds
    pub bypass_duration_s: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Steps of the avoidance manouvre, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AvoidStep {
    /// Reverse in a straight line
    Backup,
    /// Turn right by the avoidance angle
    TurnAway,
    /// Drive forwards past the obstacle
    Bypass,
    /// Turn left by the avoidance angle, back to the original heading
    TurnBack,
    /// Hand back to navigation
    Rejoin,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for AvoidParams {
    fn default() -> Self {
        Self {
            backup_duration_s: 1.0,
            turn_angle_deg: 35.0,
            bypass_duration_s: 1.5,
        }
    }
}

impl AvoidStep {
    /// Position of the step in the sequence, `0..=4`.
    pub fn index(&self) -> u8 {
        match self {
            AvoidStep::Backup => 0,
            AvoidStep::TurnAway => 1,
            AvoidStep::Bypass => 2,
            AvoidStep::TurnBack => 3,
            AvoidStep::Rejoin => 4,
        }
    }

    /// The step after this one. `Rejoin` is the last step and has no successor.
    pub fn next(&self) -> Option<AvoidStep> {
        match self {
            AvoidStep::Backup => Some(AvoidStep::TurnAway),
            AvoidStep::TurnAway => Some(AvoidStep::Bypass),
            AvoidStep::Bypass => Some(AvoidStep::TurnBack),
            AvoidStep::TurnBack => Some(AvoidStep::Rejoin),
            AvoidStep::Rejoin => None,
        }
    }
}

impl<A, S, D> Navigator<A, S, D>
where
    A: MotionActuator,
    S: RangeSensor,
    D: DelayMs<u32>,
{
    /// Execute one step of the avoidance manouvre.
    ///
    /// Turning steps are advanced by [`Navigator::turn_to_heading`] once the turn completes, all
    /// other steps advance themselves. A step cut short by cancellation does not advance.
    pub(super) fn avoidance_action(&mut self, step: AvoidStep) -> Result<(), NavError> {
        let avoid = self.params.avoid.clone();

        match step {
            AvoidStep::Backup => {
                info!("Avoidance (1/4): Backing up...");
                if self.drive_segment(DriveDir::Reverse, avoid.backup_duration_s)? {
                    self.advance_avoidance();
                }
            }
            AvoidStep::TurnAway => {
                info!("Avoidance (2/4): Turning right {:.1}°...", avoid.turn_angle_deg);
                let target_deg = wrap_deg_360(self.pose().heading_deg - avoid.turn_angle_deg);
                self.turn_to_heading(target_deg, true)?;
            }
            AvoidStep::Bypass => {
                info!("Avoidance (3/4): Moving forward to bypass...");
                if self.drive_segment(DriveDir::Forward, avoid.bypass_duration_s)? {
                    let distance_m = self.params.drive.nominal_distance_m(avoid.bypass_duration_s);
                    self.odom.update(distance_m, 0.0);
                    self.advance_avoidance();
                }
            }
            AvoidStep::TurnBack => {
                info!(
                    "Avoidance (4/4): Turning left {:.1}° to re-align...",
                    avoid.turn_angle_deg
                );
                let target_deg = wrap_deg_360(self.pose().heading_deg + avoid.turn_angle_deg);
                self.turn_to_heading(target_deg, true)?;
            }
            AvoidStep::Rejoin => {
                info!("Avoidance complete. Resuming navigation.");
                self.set_state(NavState::Navigating);
            }
        }

        Ok(())
    }

    /// Move the avoidance manouvre on to its next step.
    ///
    /// Has no effect outside of the avoidance state or on the last step.
    pub(super) fn advance_avoidance(&mut self) {
        if let NavState::AvoidingObstacle(step) = self.state {
            if let Some(next) = step.next() {
                self.state = NavState::AvoidingObstacle(next);
            }
        }
    }
}
