//! # Localisation module
//!
//! This module provides the rover with an estimate of where it is. There is no absolute
//! positioning available, so the estimate comes entirely from dead-reckoning of the commanded
//! motion, see [`Odometry`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod odometry;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::Serialize;

pub use odometry::Odometry;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The estimated pose of the rover in the local map (LM) frame.
///
/// The LM frame has its origin where the rover was when the navigator was created, with LM_X
/// pointing along the rover's initial heading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pose {
    /// The position in the LM frame.
    ///
    /// Units: meters
    pub position_m_lm: Vector2<f64>,

    /// Heading, the angle from LM_X to the rover's forward axis, positive anticlockwise.
    ///
    /// Always in the range `[0, 360)`.
    ///
    /// Units: degrees
    pub heading_deg: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Pose {
    fn default() -> Self {
        Self {
            position_m_lm: Vector2::zeros(),
            heading_deg: 0.0,
        }
    }
}

impl Pose {
    pub fn x(&self) -> f64 {
        self.position_m_lm[0]
    }

    pub fn y(&self) -> f64 {
        self.position_m_lm[1]
    }

    /// Euclidian distance from this pose to the given point.
    pub fn distance_to(&self, point_m_lm: &Vector2<f64>) -> f64 {
        (point_m_lm - self.position_m_lm).norm()
    }

    /// Bearing from this pose to the given point, in degrees in the range `[0, 360)`.
    ///
    /// The bearing to the rover's own position is zero.
    pub fn bearing_to_deg(&self, point_m_lm: &Vector2<f64>) -> f64 {
        let delta = point_m_lm - self.position_m_lm;
        util::maths::wrap_deg_360(delta[1].atan2(delta[0]).to_degrees())
    }
}

impl std::fmt::Display for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pos=({:.2}, {:.2}), Head={:.1}°",
            self.x(),
            self.y(),
            self.heading_deg
        )
    }
}
