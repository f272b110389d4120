//! # Navigation manager
//!
//! This module implements the [`Navigator`] state machine, which drives the rover towards a goal
//! using dead-reckoning. The navigator is in one of the following states:
//!
//! - `Idle` - No navigation run is active.
//! - `Navigating` - Turning towards the goal and driving at it in short forward steps.
//! - `AvoidingObstacle` - Executing the fixed avoidance manouvre, the state carries the current
//!   step of the manouvre.
//! - `GoalReached` - The estimated pose is within tolerance of the goal, the run is over.
//!
//! Each control cycle the range sensor is read, the state is updated from the reading and the
//! action of the (new) state is executed. All actions block the calling thread.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod avoid;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use embedded_hal::blocking::delay::DelayMs;
use log::{debug, error, info, trace, warn};
use nalgebra::Vector2;
use serde::Serialize;

pub use self::avoid::{AvoidParams, AvoidStep};
use crate::{
    eqpt::{is_obstacle, EqptError, MotionActuator, RangeSensor},
    heading_ctrl::{HeadingCtrl, TurnOutcome},
    loc::{Odometry, Pose},
    params::NavParams,
};
use util::{module::State, time::secs_to_millis};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest single wait between checks of a [`CancelToken`].
pub const CANCEL_POLL_PERIOD_MS: u32 = 10;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Navigation manager
///
/// Owns the rover's collaborators (actuator, range sensor and delay provider) along with the pose
/// estimate and the navigation state. All changes to the pose and state go through this struct.
///
/// When dropped the navigator commands the actuator to stop.
pub struct Navigator<A, S, D>
where
    A: MotionActuator,
    S: RangeSensor,
    D: DelayMs<u32>,
{
    params: NavParams,

    heading_ctrl: HeadingCtrl,

    actuator: A,

    sensor: S,

    delay: D,

    /// Dead-reckoning pose estimate
    odom: Odometry,

    state: NavState,

    /// Goal of the current (or most recent) run
    goal: Option<Goal>,

    cancel: CancelToken,

    report: StatusReport,

    /// Number of control cycles executed by this navigator
    num_ticks: u64,

    /// Number of consecutive failed range sensor reads
    num_consec_sensor_errors: u64,
}

/// A goal position in the local map frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Goal {
    /// Units: meters
    pub position_m_lm: Vector2<f64>,
}

/// Shared flag used to cancel a navigation run from another thread, for example a signal handler.
///
/// Once cancelled a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

/// Status report produced by each control cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    /// Number of control cycles executed
    pub num_ticks: u64,

    /// State after the cycle
    pub state: NavState,

    /// Avoidance step after the cycle, if avoiding
    pub avoid_step: Option<u8>,

    /// Pose estimate after the cycle
    pub pose: Pose,

    /// Distance to the goal after the cycle
    pub dist_to_goal_m: Option<f64>,

    /// Heading error to the goal after the cycle
    pub head_err_deg: Option<f64>,

    /// The range reading the cycle was run with
    pub range_cm: f64,

    /// True if the range reading counts as an obstacle
    pub obstacle_detected: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors that can occur in the navigation manager.
#[derive(Debug, thiserror::Error)]
pub enum NavError {
    #[error("Invalid goal ({x}, {y}), goal coordinates must be finite numbers")]
    InvalidGoal { x: f64, y: f64 },

    #[error("Invalid navigation parameters: {0}")]
    InvalidParams(String),

    #[error("A navigation run is already in progress (state {0})")]
    RunInProgress(NavState),

    #[error("The navigator is navigating but no goal has been set")]
    NoGoal,

    #[error("Actuator error: {0}")]
    Actuator(EqptError),

    #[error("Range sensor failed {count} consecutive times, last error: {last}")]
    SensorFailed { count: u64, last: EqptError },
}

/// State of the navigator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum NavState {
    Idle,
    Navigating,
    AvoidingObstacle(AvoidStep),
    GoalReached,
}

/// How a navigation run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavOutcome {
    /// The goal was reached, with the final pose estimate.
    GoalReached(Pose),

    /// The run was cancelled, with the pose estimate at cancellation.
    Cancelled(Pose),
}

/// Direction of a straight line drive segment.
#[derive(Debug, Clone, Copy)]
enum DriveDir {
    Forward,
    Reverse,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<A, S, D> Navigator<A, S, D>
where
    A: MotionActuator,
    S: RangeSensor,
    D: DelayMs<u32>,
{
    /// Create a new navigator at the origin of the local map, in the `Idle` state.
    pub fn new(params: NavParams, actuator: A, sensor: S, delay: D) -> Result<Self, NavError> {
        params.validate()?;

        Ok(Self {
            heading_ctrl: HeadingCtrl::new(params.heading_ctrl.clone()),
            params,
            actuator,
            sensor,
            delay,
            odom: Odometry::default(),
            state: NavState::Idle,
            goal: None,
            cancel: CancelToken::new(),
            report: StatusReport::default(),
            num_ticks: 0,
            num_consec_sensor_errors: 0,
        })
    }

    /// Replace the navigator's cancellation token, so that a token created before the navigator
    /// (for example one shared with a signal handler) cancels its runs.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get a token which cancels this navigator's runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn pose(&self) -> Pose {
        self.odom.pose()
    }

    pub fn goal(&self) -> Option<Goal> {
        self.goal
    }

    pub fn params(&self) -> &NavParams {
        &self.params
    }

    /// The status report of the latest control cycle.
    pub fn report(&self) -> &StatusReport {
        &self.report
    }

    /// Drive to the given goal, returning once it's reached or the run is cancelled.
    ///
    /// The goal is validated before anything else happens, an invalid goal leaves the navigator
    /// untouched. Whichever way the run ends the actuator is commanded to stop. On error the
    /// navigator is left `Idle`.
    pub fn navigate_to_point(&mut self, goal_x_m: f64, goal_y_m: f64) -> Result<NavOutcome, NavError> {
        let goal = Goal::new(goal_x_m, goal_y_m)?;

        self.start(goal)?;

        let result = self.run();

        let stop_result = self.actuator.stop();

        match result {
            Ok(outcome) => match stop_result {
                Ok(()) => {
                    info!("--- Navigation Complete ---");
                    Ok(outcome)
                }
                Err(stop_err) => {
                    error!("Could not stop the rover at the end of the run: {}", stop_err);
                    self.set_state(NavState::Idle);
                    Err(NavError::Actuator(stop_err))
                }
            },
            Err(e) => {
                if let Err(stop_err) = stop_result {
                    error!("Could not stop the rover after a failed run: {}", stop_err);
                }
                self.set_state(NavState::Idle);
                Err(e)
            }
        }
    }

    /// Start a new run towards `goal`.
    ///
    /// Runs can be started from `Idle` or after a previous goal has been reached, the pose
    /// estimate carries over between runs.
    pub fn start(&mut self, goal: Goal) -> Result<(), NavError> {
        match self.state {
            NavState::Idle | NavState::GoalReached => (),
            s => return Err(NavError::RunInProgress(s)),
        }

        info!(
            "--- Starting Navigation to Goal: ({:.2}, {:.2}) ---",
            goal.x(),
            goal.y()
        );

        self.goal = Some(goal);
        self.num_consec_sensor_errors = 0;
        self.set_state(NavState::Navigating);

        Ok(())
    }

    /// Returns true if the current state ends a run.
    pub fn is_run_finished(&self) -> bool {
        matches!(self.state, NavState::Idle | NavState::GoalReached)
    }

    /// Execute one complete control cycle: read the range sensor, process the reading and wait
    /// for the cycle period.
    ///
    /// The wait is cut short if the run is cancelled.
    pub fn tick(&mut self) -> Result<(), NavError> {
        let range_cm = self.read_range_cm()?;

        self.proc(&range_cm)?;

        let period_ms = secs_to_millis(self.params.cycle_period_s);
        if !self.cancel.delay_ms(&mut self.delay, period_ms) {
            debug!("Cycle delay cut short by cancellation");
        }

        Ok(())
    }

    /// Update the state from a fresh range reading.
    ///
    /// Only `Navigating` reacts to readings: goal arrival is checked first, then the obstacle
    /// threshold. A reading of zero is "no echo" and does not count as an obstacle.
    pub fn update_state(&mut self, range_cm: f64) {
        if self.state != NavState::Navigating {
            return;
        }

        if self.is_goal_reached() {
            self.set_state(NavState::GoalReached);
        } else if is_obstacle(range_cm, self.params.obstacle_threshold_cm) {
            info!("Obstacle at {:.1} cm", range_cm);
            self.set_state(NavState::AvoidingObstacle(AvoidStep::Backup));
        }
    }

    /// Execute the action of the current state.
    pub fn execute_action(&mut self) -> Result<(), NavError> {
        match self.state {
            NavState::Idle => Ok(()),
            NavState::Navigating => self.navigation_action(),
            NavState::AvoidingObstacle(step) => self.avoidance_action(step),
            NavState::GoalReached => self.actuator.stop().map_err(NavError::Actuator),
        }
    }

    /// Returns true if the pose estimate is strictly within tolerance of the goal.
    pub fn is_goal_reached(&self) -> bool {
        match self.dist_to_goal_m() {
            Some(d) => {
                debug!("Distance to goal: {:.2} m", d);
                d < self.params.goal_tolerance_m
            }
            None => false,
        }
    }

    /// Turn the rover onto `target_deg` using the heading controller.
    ///
    /// If `is_avoidance_turn` is set and the turn completes the avoidance manouvre is advanced to
    /// its next step.
    pub fn turn_to_heading(
        &mut self,
        target_deg: f64,
        is_avoidance_turn: bool,
    ) -> Result<TurnOutcome, NavError> {
        let outcome = self
            .heading_ctrl
            .turn_to_heading(
                target_deg,
                &mut self.odom,
                &mut self.actuator,
                &mut self.delay,
                &self.cancel,
            )
            .map_err(NavError::Actuator)?;

        if is_avoidance_turn && outcome.is_complete() {
            self.advance_avoidance();
        }

        Ok(outcome)
    }

    /// Main loop of a run, exits once the run is finished.
    fn run(&mut self) -> Result<NavOutcome, NavError> {
        while !self.is_run_finished() {
            if self.cancel.is_cancelled() {
                return self.cancel_run();
            }

            self.tick()?;
        }

        match self.state {
            NavState::GoalReached => Ok(NavOutcome::GoalReached(self.pose())),
            _ => Ok(NavOutcome::Cancelled(self.pose())),
        }
    }

    /// Stop the rover and abandon the run.
    fn cancel_run(&mut self) -> Result<NavOutcome, NavError> {
        warn!("Navigation cancelled in state {}", self.state);

        self.actuator.stop().map_err(NavError::Actuator)?;
        self.set_state(NavState::Idle);

        Ok(NavOutcome::Cancelled(self.pose()))
    }

    /// Action of the `Navigating` state: turn towards the goal if needed, otherwise take one step
    /// forwards.
    fn navigation_action(&mut self) -> Result<(), NavError> {
        let goal = self.goal.ok_or(NavError::NoGoal)?;
        let pose = self.pose();

        let target_deg = pose.bearing_to_deg(&goal.position_m_lm);
        let heading_error_deg = self.heading_ctrl.heading_error_deg(target_deg, pose.heading_deg);

        if self.heading_ctrl.within_tolerance(heading_error_deg) {
            self.move_forward_step()
        } else {
            self.turn_to_heading(target_deg, false).map(|_| ())
        }
    }

    /// Drive forwards for one step and credit the odometry with the nominal distance.
    ///
    /// A step cut short by cancellation is not credited.
    fn move_forward_step(&mut self) -> Result<(), NavError> {
        debug!("Moving forward...");

        let step_s = self.params.drive.forward_step_s;
        if self.drive_segment(DriveDir::Forward, step_s)? {
            self.odom.update(self.params.drive.nominal_distance_m(step_s), 0.0);
        }

        Ok(())
    }

    /// Drive in a straight line for `duration_s` then stop.
    ///
    /// Returns `false` if the run was cancelled part way through the segment, in which case the
    /// rover is stopped as soon as the cancellation is seen. The odometry is not updated, that is
    /// left to the caller.
    fn drive_segment(&mut self, dir: DriveDir, duration_s: f64) -> Result<bool, NavError> {
        let speed = self.params.drive.forward_speed;

        let start_result = match dir {
            DriveDir::Forward => self.actuator.drive(speed, 0.0),
            DriveDir::Reverse => self
                .actuator
                .set_steer_deg(0.0)
                .and_then(|_| self.actuator.reverse(speed)),
        };
        start_result.map_err(NavError::Actuator)?;

        let completed = self
            .cancel
            .delay_ms(&mut self.delay, secs_to_millis(duration_s));

        self.actuator.stop().map_err(NavError::Actuator)?;

        if !completed {
            warn!("Drive segment cut short by cancellation");
        }

        Ok(completed)
    }

    /// Read the range sensor.
    ///
    /// A failed read is treated as "no echo" for this cycle, unless the limit on consecutive
    /// failures has been exceeded.
    fn read_range_cm(&mut self) -> Result<f64, NavError> {
        match self.sensor.read_distance_cm() {
            Ok(d) => {
                self.num_consec_sensor_errors = 0;
                Ok(d)
            }
            Err(e) => {
                self.num_consec_sensor_errors += 1;

                if self.num_consec_sensor_errors > self.params.max_consec_sensor_errors {
                    error!(
                        "Maximum number of consecutive range sensor errors ({}) has been exceeded",
                        self.params.max_consec_sensor_errors
                    );
                    return Err(NavError::SensorFailed {
                        count: self.num_consec_sensor_errors,
                        last: e,
                    });
                }

                warn!("Could not read the range sensor: {}", e);
                Ok(0.0)
            }
        }
    }

    fn dist_to_goal_m(&self) -> Option<f64> {
        self.goal
            .map(|g| self.odom.pose().distance_to(&g.position_m_lm))
    }

    fn set_state(&mut self, new_state: NavState) {
        if new_state != self.state {
            info!("State Change: {} -> {}", self.state, new_state);
        }
        self.state = new_state;
    }

    fn update_report(&mut self, range_cm: f64) {
        let pose = self.pose();

        self.report = StatusReport {
            num_ticks: self.num_ticks,
            state: self.state,
            avoid_step: match self.state {
                NavState::AvoidingObstacle(step) => Some(step.index()),
                _ => None,
            },
            pose,
            dist_to_goal_m: self.dist_to_goal_m(),
            head_err_deg: self.goal.map(|g| {
                self.heading_ctrl
                    .heading_error_deg(pose.bearing_to_deg(&g.position_m_lm), pose.heading_deg)
            }),
            range_cm,
            obstacle_detected: is_obstacle(range_cm, self.params.obstacle_threshold_cm),
        };

        match serde_json::to_string(&self.report) {
            Ok(s) => trace!("Navigator status: {}", s),
            Err(e) => warn!("Could not serialize the status report: {}", e),
        }
    }
}

impl<A, S, D> State for Navigator<A, S, D>
where
    A: MotionActuator,
    S: RangeSensor,
    D: DelayMs<u32>,
{
    /// A range reading in centimeters
    type InputData = f64;
    type OutputData = NavState;
    type StatusReport = StatusReport;
    type ProcError = NavError;

    /// Process one control cycle with the given range reading.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        self.num_ticks += 1;

        self.update_state(*input_data);
        self.execute_action()?;

        self.update_report(*input_data);

        Ok((self.state, self.report.clone()))
    }
}

impl<A, S, D> Drop for Navigator<A, S, D>
where
    A: MotionActuator,
    S: RangeSensor,
    D: DelayMs<u32>,
{
    fn drop(&mut self) {
        if let Err(e) = self.actuator.stop() {
            error!("Could not stop the rover while shutting down: {}", e);
        }
    }
}

impl Goal {
    /// Create a new goal, which must have finite coordinates.
    pub fn new(x_m: f64, y_m: f64) -> Result<Self, NavError> {
        if !x_m.is_finite() || !y_m.is_finite() {
            return Err(NavError::InvalidGoal { x: x_m, y: y_m });
        }

        Ok(Self {
            position_m_lm: Vector2::new(x_m, y_m),
        })
    }

    pub fn x(&self) -> f64 {
        self.position_m_lm[0]
    }

    pub fn y(&self) -> f64 {
        self.position_m_lm[1]
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the run.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Wait for `ms` milliseconds on `delay`, checking for cancellation at least every
    /// [`CANCEL_POLL_PERIOD_MS`].
    ///
    /// Returns `true` if the whole period elapsed without the token being cancelled. Once
    /// cancelled no further time is spent waiting.
    pub fn delay_ms<D: DelayMs<u32>>(&self, delay: &mut D, ms: u32) -> bool {
        let mut remaining_ms = ms;

        while remaining_ms > 0 {
            if self.is_cancelled() {
                return false;
            }

            let chunk_ms = remaining_ms.min(CANCEL_POLL_PERIOD_MS);
            delay.delay_ms(chunk_ms);
            remaining_ms -= chunk_ms;
        }

        !self.is_cancelled()
    }
}

impl Default for NavState {
    fn default() -> Self {
        NavState::Idle
    }
}

impl Display for NavState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavState::Idle => write!(f, "NavState::Idle"),
            NavState::Navigating => write!(f, "NavState::Navigating"),
            NavState::AvoidingObstacle(step) => {
                write!(f, "NavState::AvoidingObstacle({})", step.index())
            }
            NavState::GoalReached => write!(f, "NavState::GoalReached"),
        }
    }
}
