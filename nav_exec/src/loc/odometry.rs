//! Dead-reckoning odometry estimator

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;
use nalgebra::Vector2;

use super::Pose;
use util::maths::wrap_deg_360;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Integrates commanded motion into an estimated [`Pose`].
///
/// Distances are never measured, they are the nominal speed multiplied by the commanded
/// duration, so the estimate drifts over time.
#[derive(Debug, Default, Clone)]
pub struct Odometry {
    pose: Pose,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Odometry {
    /// Create a new estimator starting at the given pose.
    pub fn new(start_pose: Pose) -> Self {
        Self {
            pose: Pose {
                position_m_lm: start_pose.position_m_lm,
                heading_deg: wrap_deg_360(start_pose.heading_deg),
            },
        }
    }

    /// The current pose estimate.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Update the estimate with one segment of motion.
    ///
    /// The heading change is applied first and the position is then advanced along the new
    /// heading, matching the way the rover executes discrete turn-or-drive segments.
    ///
    /// - `distance_moved_m` - distance travelled, only applied if positive.
    /// - `angle_turned_deg` - heading change, positive anticlockwise.
    pub fn update(&mut self, distance_moved_m: f64, angle_turned_deg: f64) {
        self.pose.heading_deg = wrap_deg_360(self.pose.heading_deg + angle_turned_deg);

        if distance_moved_m > 0.0 {
            let heading_rad = self.pose.heading_deg.to_radians();
            self.pose.position_m_lm +=
                distance_moved_m * Vector2::new(heading_rad.cos(), heading_rad.sin());
        }

        debug!("Odometry updated: {}", self.pose);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_pose_near(a: &Pose, b: &Pose) {
        assert!(
            (a.position_m_lm - b.position_m_lm).norm() < 1e-9
                && (a.heading_deg - b.heading_deg).abs() < 1e-9,
            "{} != {}",
            a,
            b
        );
    }

    #[test]
    fn test_straight_line() {
        let mut odom = Odometry::default();

        for _ in 0..8 {
            odom.update(0.125, 0.0);
        }

        assert_pose_near(
            &odom.pose(),
            &Pose {
                position_m_lm: Vector2::new(1.0, 0.0),
                heading_deg: 0.0,
            },
        );
    }

    #[test]
    fn test_turn_then_move() {
        let mut odom = Odometry::default();

        odom.update(1.0, 90.0);

        assert_pose_near(
            &odom.pose(),
            &Pose {
                position_m_lm: Vector2::new(0.0, 1.0),
                heading_deg: 90.0,
            },
        );

        // Moving first along the old heading and turning afterwards gives a different pose
        let start = Pose::default();
        let move_then_turn = Pose {
            position_m_lm: start.position_m_lm + Vector2::new(1.0, 0.0),
            heading_deg: 90.0,
        };
        assert!((odom.pose().position_m_lm - move_then_turn.position_m_lm).norm() > 1.0);
    }

    #[test]
    fn test_zero_update_is_identity() {
        let start = Pose {
            position_m_lm: Vector2::new(-0.3, 2.7),
            heading_deg: 123.4,
        };
        let mut odom = Odometry::new(start);

        for _ in 0..10 {
            odom.update(0.0, 0.0);
        }

        assert_eq!(odom.pose(), start);
    }

    #[test]
    fn test_heading_wraps() {
        let mut odom = Odometry::default();

        odom.update(0.0, -35.0);
        assert_pose_near(
            &odom.pose(),
            &Pose {
                position_m_lm: Vector2::zeros(),
                heading_deg: 325.0,
            },
        );

        odom.update(0.0, 400.0);
        assert!((odom.pose().heading_deg - 5.0).abs() < 1e-9);

        let odom = Odometry::new(Pose {
            position_m_lm: Vector2::zeros(),
            heading_deg: 720.0,
        });
        assert_eq!(odom.pose().heading_deg, 0.0);
    }

    #[test]
    fn test_negative_distance_ignored() {
        let mut odom = Odometry::default();

        odom.update(-0.5, 10.0);

        assert_eq!(odom.pose().position_m_lm, Vector2::zeros());
        assert!((odom.pose().heading_deg - 10.0).abs() < 1e-9);
    }
}
