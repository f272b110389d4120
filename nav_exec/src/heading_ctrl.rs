//! # Heading controller
//!
//! Proportional controller that steers the rover onto a target heading. Turning is done by driving
//! slowly with the steering deflected, so the rover cannot turn on the spot and each turn is a
//! blocking sequence of short fixed-length drive ticks.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::delay::DelayMs;
use log::{info, trace};
use serde::{Deserialize, Serialize};

use crate::{
    eqpt::{EqptError, MotionActuator},
    loc::Odometry,
    nav_mgr::CancelToken,
};
use util::{
    maths::{ang_err_deg, clamp, wrap_deg_360},
    time::secs_to_millis,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the heading controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingCtrlParams {
    /// Drive speed demand used while turning.
    ///
    /// Units: 0..=100
    pub turn_speed: f64,

    /// A heading error at or below this is considered on target.
    ///
    /// Units: degrees
    pub heading_tolerance_deg: f64,

    /// Proportional gain from heading error to steer angle.
    pub steer_gain: f64,

    /// Limit of the steering actuator, the steer demand is clamped to +/- this value.
    ///
    /// Units: degrees
    pub max_steer_deg: f64,

    /// Duration of one turning tick.
    ///
    /// Units: seconds
    pub turn_tick_s: f64,

    /// Empirical heading change per degree of steer per second of turning.
    pub turn_calib: f64,
}

/// The heading controller.
#[derive(Debug, Clone)]
pub struct HeadingCtrl {
    params: HeadingCtrlParams,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// How a call to [`HeadingCtrl::turn_to_heading`] ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TurnOutcome {
    /// The heading error is within tolerance.
    Complete {
        /// Number of turning ticks that were needed
        num_ticks: u64,
    },

    /// The run was cancelled part way through the turn.
    Cancelled,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for HeadingCtrlParams {
    fn default() -> Self {
        Self {
            turn_speed: 25.0,
            heading_tolerance_deg: 5.0,
            steer_gain: 2.0,
            max_steer_deg: 35.0,
            turn_tick_s: 0.1,
            turn_calib: 1.5,
        }
    }
}

impl TurnOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, TurnOutcome::Complete { .. })
    }
}

impl HeadingCtrl {
    pub fn new(params: HeadingCtrlParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &HeadingCtrlParams {
        &self.params
    }

    /// Signed shortest error from `current_deg` to `target_deg`, in `(-180, 180]`.
    pub fn heading_error_deg(&self, target_deg: f64, current_deg: f64) -> f64 {
        ang_err_deg(wrap_deg_360(target_deg), current_deg)
    }

    /// Returns true if the heading error needs no correction.
    pub fn within_tolerance(&self, heading_error_deg: f64) -> bool {
        heading_error_deg.abs() <= self.params.heading_tolerance_deg
    }

    /// Steer angle to command for the given heading error.
    ///
    /// The demand is `clamp(gain * error, -max, max)`. Heading error is positive anticlockwise
    /// while the actuator steers right for positive angles, so the demand is negated into the
    /// actuator frame.
    pub fn steer_demand_deg(&self, heading_error_deg: f64) -> f64 {
        -clamp(
            heading_error_deg * self.params.steer_gain,
            -self.params.max_steer_deg,
            self.params.max_steer_deg,
        )
    }

    /// Estimated heading change from one turning tick at the given steer angle.
    pub fn est_turn_deg(&self, steer_deg: f64) -> f64 {
        -steer_deg * self.params.turn_tick_s * self.params.turn_calib
    }

    /// Turn the rover onto `target_deg`.
    ///
    /// Blocks until the estimated heading is within tolerance of the target, then stops the rover
    /// and centres the steering. The cancellation token is checked throughout each tick, on
    /// cancellation the rover is stopped and the turn abandoned. An interrupted tick is not
    /// credited to the odometry.
    pub fn turn_to_heading<A, D>(
        &self,
        target_deg: f64,
        odom: &mut Odometry,
        actuator: &mut A,
        delay: &mut D,
        cancel: &CancelToken,
    ) -> Result<TurnOutcome, EqptError>
    where
        A: MotionActuator,
        D: DelayMs<u32>,
    {
        let target_deg = wrap_deg_360(target_deg);
        let tick_ms = secs_to_millis(self.params.turn_tick_s);

        let mut heading_error_deg = self.heading_error_deg(target_deg, odom.pose().heading_deg);
        let mut num_ticks = 0u64;

        while !self.within_tolerance(heading_error_deg) {
            if cancel.is_cancelled() {
                return abandon_turn(target_deg, actuator);
            }

            let steer_deg = self.steer_demand_deg(heading_error_deg);

            actuator.drive(self.params.turn_speed, steer_deg)?;
            if !cancel.delay_ms(delay, tick_ms) {
                return abandon_turn(target_deg, actuator);
            }

            odom.update(0.0, self.est_turn_deg(steer_deg));

            heading_error_deg = self.heading_error_deg(target_deg, odom.pose().heading_deg);
            num_ticks += 1;

            trace!(
                "Turning... Target: {:.1}°, Current: {:.1}°, Steer: {:.1}°",
                target_deg,
                odom.pose().heading_deg,
                steer_deg
            );
        }

        actuator.stop()?;
        actuator.set_steer_deg(0.0)?;

        info!(
            "Turn complete in {} ticks. Final heading: {:.1}°",
            num_ticks,
            odom.pose().heading_deg
        );

        Ok(TurnOutcome::Complete { num_ticks })
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Stop and centre the steering after a cancelled turn.
fn abandon_turn<A: MotionActuator>(
    target_deg: f64,
    actuator: &mut A,
) -> Result<TurnOutcome, EqptError> {
    actuator.stop()?;
    actuator.set_steer_deg(0.0)?;
    info!("Turn to {:.1}° cancelled", target_deg);

    Ok(TurnOutcome::Cancelled)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::eqpt::ActuatorCmd;
    use crate::loc::Pose;

    #[derive(Default)]
    struct LogActuator {
        cmds: Vec<ActuatorCmd>,
    }

    impl MotionActuator for LogActuator {
        fn drive(&mut self, speed: f64, steer_deg: f64) -> Result<(), EqptError> {
            self.cmds.push(ActuatorCmd::Drive { speed, steer_deg });
            Ok(())
        }
        fn reverse(&mut self, speed: f64) -> Result<(), EqptError> {
            self.cmds.push(ActuatorCmd::Reverse { speed });
            Ok(())
        }
        fn stop(&mut self) -> Result<(), EqptError> {
            self.cmds.push(ActuatorCmd::Stop);
            Ok(())
        }
        fn set_steer_deg(&mut self, steer_deg: f64) -> Result<(), EqptError> {
            self.cmds.push(ActuatorCmd::SetSteer { steer_deg });
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountDelay {
        total_ms: u64,
    }

    impl DelayMs<u32> for CountDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.total_ms += ms as u64;
        }
    }

    fn ctrl() -> HeadingCtrl {
        HeadingCtrl::new(HeadingCtrlParams::default())
    }

    #[test]
    fn test_steer_demand() {
        let c = ctrl();

        assert_eq!(c.steer_demand_deg(10.0), -20.0);
        assert_eq!(c.steer_demand_deg(-10.0), 20.0);
        assert_eq!(c.steer_demand_deg(90.0), -35.0);
        assert_eq!(c.steer_demand_deg(-170.0), 35.0);
        assert_eq!(c.steer_demand_deg(0.0), 0.0);
    }

    #[test]
    fn test_est_turn() {
        let c = ctrl();

        // Full right lock for one tick turns 5.25° clockwise
        assert!((c.est_turn_deg(35.0) + 5.25).abs() < 1e-12);
        assert!((c.est_turn_deg(-20.0) - 3.0).abs() < 1e-12);

        // Turning reduces the error that produced the demand
        for err in [-120.0, -30.0, -6.0, 6.0, 30.0, 120.0].iter() {
            let turned = c.est_turn_deg(c.steer_demand_deg(*err));
            assert_eq!(turned.signum(), err.signum());
        }
    }

    #[test]
    fn test_within_tolerance() {
        let c = ctrl();

        assert!(c.within_tolerance(5.0));
        assert!(c.within_tolerance(-5.0));
        assert!(!c.within_tolerance(5.0001));
    }

    #[test]
    fn test_turn_already_on_heading() {
        let c = ctrl();
        let mut odom = Odometry::default();
        let mut act = LogActuator::default();
        let mut delay = CountDelay::default();

        let out = c
            .turn_to_heading(363.0, &mut odom, &mut act, &mut delay, &CancelToken::new())
            .unwrap();

        assert_eq!(out, TurnOutcome::Complete { num_ticks: 0 });
        assert_eq!(
            act.cmds,
            vec![ActuatorCmd::Stop, ActuatorCmd::SetSteer { steer_deg: 0.0 }]
        );
        assert_eq!(delay.total_ms, 0);
        assert_eq!(odom.pose(), Pose::default());
    }

    #[test]
    fn test_turn_right() {
        let c = ctrl();
        let mut odom = Odometry::default();
        let mut act = LogActuator::default();
        let mut delay = CountDelay::default();

        let out = c
            .turn_to_heading(-35.0, &mut odom, &mut act, &mut delay, &CancelToken::new())
            .unwrap();

        let num_ticks = match out {
            TurnOutcome::Complete { num_ticks } => num_ticks,
            TurnOutcome::Cancelled => panic!("Turn was cancelled"),
        };
        assert!(num_ticks > 0);
        assert_eq!(delay.total_ms, num_ticks * 100);

        let err = c.heading_error_deg(325.0, odom.pose().heading_deg);
        assert!(err.abs() <= 5.0, "Final error {}", err);

        // Every drive is a right turn at turn speed and the sequence ends stopped and centred
        let drives: Vec<_> = act.cmds.iter().filter(|c| c.is_motion()).collect();
        assert_eq!(drives.len() as u64, num_ticks);
        for d in drives {
            match d {
                ActuatorCmd::Drive { speed, steer_deg } => {
                    assert_eq!(*speed, 25.0);
                    assert!(*steer_deg > 0.0 && *steer_deg <= 35.0);
                }
                other => panic!("Unexpected command {:?}", other),
            }
        }
        assert_eq!(
            &act.cmds[act.cmds.len() - 2..],
            &[ActuatorCmd::Stop, ActuatorCmd::SetSteer { steer_deg: 0.0 }]
        );

        // Turning on the spot does not move the estimate
        assert_eq!(odom.pose().position_m_lm, Pose::default().position_m_lm);
    }

    #[test]
    fn test_turn_half_turn() {
        let c = ctrl();
        let mut odom = Odometry::default();
        let mut act = LogActuator::default();
        let mut delay = CountDelay::default();

        let out = c
            .turn_to_heading(180.0, &mut odom, &mut act, &mut delay, &CancelToken::new())
            .unwrap();

        assert!(out.is_complete());
        assert!(c.heading_error_deg(180.0, odom.pose().heading_deg).abs() <= 5.0);
    }

    /// Delay which cancels the token once a given amount of time has passed.
    struct CancelAfterDelay {
        cancel: CancelToken,
        cancel_at_ms: u64,
        total_ms: u64,
        ms_after_cancel: u64,
    }

    impl DelayMs<u32> for CancelAfterDelay {
        fn delay_ms(&mut self, ms: u32) {
            if self.cancel.is_cancelled() {
                self.ms_after_cancel += ms as u64;
            }
            self.total_ms += ms as u64;
            if self.total_ms >= self.cancel_at_ms {
                self.cancel.cancel();
            }
        }
    }

    #[test]
    fn test_turn_cancelled_mid_tick() {
        let c = ctrl();
        let mut odom = Odometry::default();
        let mut act = LogActuator::default();
        let cancel = CancelToken::new();
        let mut delay = CancelAfterDelay {
            cancel: cancel.clone(),
            cancel_at_ms: 150,
            total_ms: 0,
            ms_after_cancel: 0,
        };

        let out = c
            .turn_to_heading(90.0, &mut odom, &mut act, &mut delay, &cancel)
            .unwrap();

        assert_eq!(out, TurnOutcome::Cancelled);
        assert_eq!(delay.total_ms, 150);
        assert_eq!(delay.ms_after_cancel, 0);

        // One full tick is credited, the interrupted one is not
        assert!((odom.pose().heading_deg - 5.25).abs() < 1e-9);

        assert_eq!(act.cmds.iter().filter(|c| c.is_motion()).count(), 2);
        assert_eq!(
            &act.cmds[act.cmds.len() - 2..],
            &[ActuatorCmd::Stop, ActuatorCmd::SetSteer { steer_deg: 0.0 }]
        );
    }

    #[test]
    fn test_turn_cancelled() {
        let c = ctrl();
        let mut odom = Odometry::default();
        let mut act = LogActuator::default();
        let mut delay = CountDelay::default();

        let cancel = CancelToken::new();
        cancel.cancel();

        let out = c
            .turn_to_heading(90.0, &mut odom, &mut act, &mut delay, &cancel)
            .unwrap();

        assert_eq!(out, TurnOutcome::Cancelled);
        assert_eq!(
            act.cmds,
            vec![ActuatorCmd::Stop, ActuatorCmd::SetSteer { steer_deg: 0.0 }]
        );
        assert_eq!(odom.pose(), Pose::default());
    }
}
