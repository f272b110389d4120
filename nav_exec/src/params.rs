//! # Navigation parameters
//!
//! All tuning constants of the navigator. They are loaded once from `nav_exec.toml` and are never
//! modified at runtime. Missing entries take the values in the `Default` implementations.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::{
    heading_ctrl::HeadingCtrlParams,
    nav_mgr::{AvoidParams, NavError},
    sim::SimParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Contents of the executable's parameter file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NavExecParams {
    pub nav: NavParams,

    pub sim: SimParams,
}

/// Parameters for the navigator and all of its components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavParams {
    /// Period of one outer control cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Distance to the goal under which the goal is considered reached.
    ///
    /// Units: meters
    pub goal_tolerance_m: f64,

    /// Range readings closer than this trigger the avoidance manouvre.
    ///
    /// Units: centimeters
    pub obstacle_threshold_cm: f64,

    /// Number of consecutive failed range sensor reads after which the run is aborted.
    pub max_consec_sensor_errors: u64,

    pub drive: DriveParams,

    pub heading_ctrl: HeadingCtrlParams,

    pub avoid: AvoidParams,
}

/// Parameters for straight line drive segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveParams {
    /// Nominal ground speed when driving at `forward_speed`. Used to convert drive durations into
    /// distances for the odometry.
    ///
    /// Units: meters/second
    pub meters_per_sec_at_forward_speed: f64,

    /// Speed demand for straight line segments, forwards and backwards.
    ///
    /// Units: 0..=100
    pub forward_speed: f64,

    /// Duration of one forward step while navigating.
    ///
    /// Units: seconds
    pub forward_step_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for NavParams {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.05,
            goal_tolerance_m: 0.1,
            obstacle_threshold_cm: 25.0,
            max_consec_sensor_errors: 5,
            drive: DriveParams::default(),
            heading_ctrl: HeadingCtrlParams::default(),
            avoid: AvoidParams::default(),
        }
    }
}

impl Default for DriveParams {
    fn default() -> Self {
        Self {
            meters_per_sec_at_forward_speed: 0.25,
            forward_speed: 30.0,
            forward_step_s: 0.5,
        }
    }
}

impl DriveParams {
    /// Distance the odometry credits for driving at `forward_speed` for `duration_s`.
    pub fn nominal_distance_m(&self, duration_s: f64) -> f64 {
        self.meters_per_sec_at_forward_speed * duration_s
    }
}

impl NavParams {
    /// Check the parameters can drive a navigation run.
    ///
    /// Non-finite values, or non-positive tolerances, periods and gains would stop the control
    /// loops from ever terminating.
    pub fn validate(&self) -> Result<(), NavError> {
        let hc = &self.heading_ctrl;

        let positive = [
            ("cycle_period_s", self.cycle_period_s),
            ("goal_tolerance_m", self.goal_tolerance_m),
            ("obstacle_threshold_cm", self.obstacle_threshold_cm),
            (
                "drive.meters_per_sec_at_forward_speed",
                self.drive.meters_per_sec_at_forward_speed,
            ),
            ("drive.forward_speed", self.drive.forward_speed),
            ("drive.forward_step_s", self.drive.forward_step_s),
            ("heading_ctrl.turn_speed", hc.turn_speed),
            ("heading_ctrl.heading_tolerance_deg", hc.heading_tolerance_deg),
            ("heading_ctrl.steer_gain", hc.steer_gain),
            ("heading_ctrl.max_steer_deg", hc.max_steer_deg),
            ("heading_ctrl.turn_tick_s", hc.turn_tick_s),
            ("heading_ctrl.turn_calib", hc.turn_calib),
        ];

        let non_negative = [
            ("avoid.backup_duration_s", self.avoid.backup_duration_s),
            ("avoid.turn_angle_deg", self.avoid.turn_angle_deg),
            ("avoid.bypass_duration_s", self.avoid.bypass_duration_s),
        ];

        for (name, value) in positive.iter() {
            if !value.is_finite() || *value <= 0.0 {
                return Err(NavError::InvalidParams(format!(
                    "{} must be finite and greater than zero, found {}",
                    name, value
                )));
            }
        }

        for (name, value) in non_negative.iter() {
            if !value.is_finite() || *value < 0.0 {
                return Err(NavError::InvalidParams(format!(
                    "{} must be finite and not negative, found {}",
                    name, value
                )));
            }
        }

        // A tolerance at or above the half turn would make every heading acceptable, and a
        // single controller step must not be able to jump across the whole tolerance band.
        if hc.heading_tolerance_deg >= 180.0 {
            return Err(NavError::InvalidParams(format!(
                "heading_ctrl.heading_tolerance_deg must be less than 180, found {}",
                hc.heading_tolerance_deg
            )));
        }
        if hc.steer_gain * hc.turn_tick_s * hc.turn_calib >= 2.0 {
            return Err(NavError::InvalidParams(format!(
                "heading controller loop gain {} is unstable, it must be less than 2",
                hc.steer_gain * hc.turn_tick_s * hc.turn_calib
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let params = NavParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.drive.nominal_distance_m(0.5), 0.125);
        assert_eq!(params.drive.nominal_distance_m(1.5), 0.375);
    }

    #[test]
    fn test_partial_file() {
        let params: NavExecParams = util::params::from_str(
            r#"
            [nav]
            goal_tolerance_m = 0.05

            [nav.avoid]
            turn_angle_deg = 45.0

            [sim]
            realtime = true
            "#,
        )
        .unwrap();

        assert_eq!(params.nav.goal_tolerance_m, 0.05);
        assert_eq!(params.nav.obstacle_threshold_cm, 25.0);
        assert_eq!(params.nav.avoid.turn_angle_deg, 45.0);
        assert_eq!(params.nav.avoid.backup_duration_s, 1.0);
        assert_eq!(params.nav.heading_ctrl.steer_gain, 2.0);
        assert!(params.sim.realtime);
    }

    #[test]
    fn test_invalid_params() {
        let mut params = NavParams::default();
        params.heading_ctrl.heading_tolerance_deg = 0.0;
        assert!(matches!(params.validate(), Err(NavError::InvalidParams(_))));

        let mut params = NavParams::default();
        params.cycle_period_s = std::f64::NAN;
        assert!(matches!(params.validate(), Err(NavError::InvalidParams(_))));

        let mut params = NavParams::default();
        params.avoid.bypass_duration_s = -1.0;
        assert!(matches!(params.validate(), Err(NavError::InvalidParams(_))));

        let mut params = NavParams::default();
        params.heading_ctrl.steer_gain = 20.0;
        assert!(matches!(params.validate(), Err(NavError::InvalidParams(_))));
    }
}
