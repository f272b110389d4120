//! # Simulated rover
//!
//! A kinematic stand-in for the rover hardware, used by the executable and the tests. The rover is
//! modelled as a bicycle with front wheel steering driving through a flat world containing
//! circular obstacles. The range sensor ray casts against the obstacles.
//!
//! Time only passes in the simulation when the navigator delays, so a run executes as fast as the
//! host allows unless `realtime` is set.
//!
//! All collaborators handed out by a [`SimRover`] share the same world, and every actuator demand
//! is recorded so that runs can be inspected afterwards.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{cell::RefCell, collections::VecDeque, rc::Rc, thread, time::Duration};

use embedded_hal::blocking::delay::DelayMs;
use log::trace;
use nalgebra::Vector2;
use serde::Deserialize;

use crate::{
    eqpt::{ActuatorCmd, EqptError, MotionActuator, RangeSensor},
    loc::Pose,
};
use util::maths::{lin_map, wrap_deg_360};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum integration step of the physics.
const PHYSICS_STEP_S: f64 = 0.01;

/// Mechanical limit of the simulated steering.
const MAX_STEER_DEG: f64 = 35.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the simulated rover and its world.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Ground speed at a speed demand of 100.
    ///
    /// Units: meters/second
    pub max_speed_ms: f64,

    /// Distance between the front and rear axles.
    ///
    /// Units: meters
    pub wheelbase_m: f64,

    /// Readings further than this are reported as no echo.
    ///
    /// Units: centimeters
    pub max_range_cm: f64,

    /// If true delays sleep the calling thread as well as advancing the simulation.
    pub realtime: bool,

    pub obstacles: Vec<Obstacle>,
}

/// A circular obstacle in the local map frame.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Obstacle {
    pub x_m: f64,
    pub y_m: f64,
    pub radius_m: f64,
}

/// The simulated rover, hands out the collaborators used by the navigator.
#[derive(Debug, Clone)]
pub struct SimRover {
    world: Rc<RefCell<SimWorld>>,
}

/// Simulated drive and steering actuator.
#[derive(Debug, Clone)]
pub struct SimActuator {
    world: Rc<RefCell<SimWorld>>,
}

/// Simulated forward facing range sensor.
#[derive(Debug, Clone)]
pub struct SimRangeSensor {
    world: Rc<RefCell<SimWorld>>,
}

/// Delay provider which advances the simulation.
#[derive(Debug, Clone)]
pub struct SimDelay {
    world: Rc<RefCell<SimWorld>>,
}

#[derive(Debug)]
struct SimWorld {
    params: SimParams,

    /// True pose of the rover
    pose: Pose,

    /// Signed ground speed, negative when reversing
    speed_ms: f64,

    /// Positive to the right
    steer_deg: f64,

    commands: Vec<ActuatorCmd>,

    /// Readings returned by the sensor before it falls back to ray casting
    scripted_ranges: VecDeque<f64>,

    elapsed_s: f64,

    actuator_fault: bool,

    sensor_fault: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            // A demand of 30 gives the nominal 0.25 m/s
            max_speed_ms: 0.25 / 0.3,
            wheelbase_m: 0.16,
            max_range_cm: 300.0,
            realtime: false,
            obstacles: Vec::new(),
        }
    }
}

impl SimRover {
    /// Create a new simulated rover at the origin, facing along the X axis.
    pub fn new(params: SimParams) -> Self {
        Self {
            world: Rc::new(RefCell::new(SimWorld {
                params,
                pose: Pose::default(),
                speed_ms: 0.0,
                steer_deg: 0.0,
                commands: Vec::new(),
                scripted_ranges: VecDeque::new(),
                elapsed_s: 0.0,
                actuator_fault: false,
                sensor_fault: false,
            })),
        }
    }

    pub fn actuator(&self) -> SimActuator {
        SimActuator {
            world: self.world.clone(),
        }
    }

    pub fn range_sensor(&self) -> SimRangeSensor {
        SimRangeSensor {
            world: self.world.clone(),
        }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay {
            world: self.world.clone(),
        }
    }

    /// All actuator demands accepted so far, in order.
    pub fn commands(&self) -> Vec<ActuatorCmd> {
        self.world.borrow().commands.clone()
    }

    /// The true pose of the rover.
    pub fn true_pose(&self) -> Pose {
        self.world.borrow().pose
    }

    /// Simulated time elapsed since the rover was created.
    pub fn elapsed_s(&self) -> f64 {
        self.world.borrow().elapsed_s
    }

    /// Queue readings to be returned by the range sensor, in order, before it goes back to ray
    /// casting.
    pub fn script_ranges<I: IntoIterator<Item = f64>>(&self, ranges_cm: I) {
        self.world.borrow_mut().scripted_ranges.extend(ranges_cm);
    }

    /// While set every actuator demand fails.
    pub fn set_actuator_fault(&self, fault: bool) {
        self.world.borrow_mut().actuator_fault = fault;
    }

    /// While set every range sensor read fails.
    pub fn set_sensor_fault(&self, fault: bool) {
        self.world.borrow_mut().sensor_fault = fault;
    }
}

impl SimWorld {
    /// Accept an actuator demand, or reject it if the actuator is faulty or the demand is outside
    /// the actuator's range.
    fn accept(&mut self, cmd: ActuatorCmd) -> Result<(), EqptError> {
        if self.actuator_fault {
            return Err(EqptError::Unavailable(format!(
                "simulated actuator fault, {:?} not executed",
                cmd
            )));
        }

        let (speed, steer_deg) = match cmd {
            ActuatorCmd::Drive { speed, steer_deg } => (Some(speed), Some(steer_deg)),
            ActuatorCmd::Reverse { speed } => (Some(speed), None),
            ActuatorCmd::Stop => (None, None),
            ActuatorCmd::SetSteer { steer_deg } => (None, Some(steer_deg)),
        };

        if let Some(s) = speed {
            if !(0.0..=100.0).contains(&s) {
                return Err(EqptError::CommandRejected(format!(
                    "speed {} is outside 0..=100",
                    s
                )));
            }
        }
        if let Some(s) = steer_deg {
            if !(-MAX_STEER_DEG..=MAX_STEER_DEG).contains(&s) {
                return Err(EqptError::CommandRejected(format!(
                    "steer angle {}° is outside +/-{}°",
                    s, MAX_STEER_DEG
                )));
            }
        }

        match cmd {
            ActuatorCmd::Drive { speed, steer_deg } => {
                self.speed_ms = self.ground_speed_ms(speed);
                self.steer_deg = steer_deg;
            }
            ActuatorCmd::Reverse { speed } => self.speed_ms = -self.ground_speed_ms(speed),
            ActuatorCmd::Stop => self.speed_ms = 0.0,
            ActuatorCmd::SetSteer { steer_deg } => self.steer_deg = steer_deg,
        }

        self.commands.push(cmd);

        Ok(())
    }

    fn ground_speed_ms(&self, speed: f64) -> f64 {
        lin_map((0.0, 100.0), (0.0, self.params.max_speed_ms), speed)
    }

    /// Advance the simulation by `dt_s`.
    fn advance(&mut self, dt_s: f64) {
        let mut remaining_s = dt_s;

        while remaining_s > 0.0 {
            let step_s = remaining_s.min(PHYSICS_STEP_S);
            self.step(step_s);
            remaining_s -= step_s;
        }

        self.elapsed_s += dt_s;
    }

    /// Single integration step of the bicycle model.
    fn step(&mut self, dt_s: f64) {
        if self.speed_ms == 0.0 {
            return;
        }

        let heading_rad = self.pose.heading_deg.to_radians();

        self.pose.position_m_lm +=
            self.speed_ms * dt_s * Vector2::new(heading_rad.cos(), heading_rad.sin());

        // Positive steer is to the right, which is clockwise, which decreases the heading
        let yaw_rate_rads =
            -self.speed_ms * self.steer_deg.to_radians().tan() / self.params.wheelbase_m;
        self.pose.heading_deg =
            wrap_deg_360(self.pose.heading_deg + (yaw_rate_rads * dt_s).to_degrees());
    }

    /// Distance to the nearest obstacle along the rover's heading, in centimeters.
    ///
    /// Returns 0 if nothing is in range, or if the rover is inside an obstacle.
    fn ray_cast_cm(&self) -> f64 {
        let heading_rad = self.pose.heading_deg.to_radians();
        let dir = Vector2::new(heading_rad.cos(), heading_rad.sin());
        let origin = self.pose.position_m_lm;

        let mut nearest_m: Option<f64> = None;

        for obs in self.params.obstacles.iter() {
            let to_centre = Vector2::new(obs.x_m, obs.y_m) - origin;
            let r2 = obs.radius_m * obs.radius_m;

            if to_centre.norm_squared() <= r2 {
                return 0.0;
            }

            let along_m = to_centre.dot(&dir);
            if along_m <= 0.0 {
                continue;
            }

            let perp2 = to_centre.norm_squared() - along_m * along_m;
            if perp2 > r2 {
                continue;
            }

            let hit_m = along_m - (r2 - perp2).sqrt();
            nearest_m = Some(match nearest_m {
                Some(n) => n.min(hit_m),
                None => hit_m,
            });
        }

        match nearest_m {
            Some(d) if d * 100.0 <= self.params.max_range_cm => d * 100.0,
            _ => 0.0,
        }
    }
}

impl MotionActuator for SimActuator {
    fn drive(&mut self, speed: f64, steer_deg: f64) -> Result<(), EqptError> {
        self.world
            .borrow_mut()
            .accept(ActuatorCmd::Drive { speed, steer_deg })
    }

    fn reverse(&mut self, speed: f64) -> Result<(), EqptError> {
        self.world.borrow_mut().accept(ActuatorCmd::Reverse { speed })
    }

    fn stop(&mut self) -> Result<(), EqptError> {
        self.world.borrow_mut().accept(ActuatorCmd::Stop)
    }

    fn set_steer_deg(&mut self, steer_deg: f64) -> Result<(), EqptError> {
        self.world
            .borrow_mut()
            .accept(ActuatorCmd::SetSteer { steer_deg })
    }
}

impl RangeSensor for SimRangeSensor {
    fn read_distance_cm(&mut self) -> Result<f64, EqptError> {
        let mut world = self.world.borrow_mut();

        if world.sensor_fault {
            return Err(EqptError::Unavailable(
                "simulated range sensor fault".into(),
            ));
        }

        let distance_cm = match world.scripted_ranges.pop_front() {
            Some(d) => d,
            None => world.ray_cast_cm(),
        };

        trace!("Sim range: {:.1} cm", distance_cm);

        Ok(distance_cm)
    }
}

impl DelayMs<u32> for SimDelay {
    fn delay_ms(&mut self, ms: u32) {
        let realtime = {
            let mut world = self.world.borrow_mut();
            world.advance(ms as f64 / 1000.0);
            world.params.realtime
        };

        if realtime {
            thread::sleep(Duration::from_millis(ms as u64));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_drive_straight() {
        let rover = SimRover::new(SimParams::default());
        let mut act = rover.actuator();
        let mut delay = rover.delay();

        act.drive(30.0, 0.0).unwrap();
        delay.delay_ms(500);
        act.stop().unwrap();
        delay.delay_ms(500);

        let pose = rover.true_pose();
        assert!((pose.x() - 0.125).abs() < 1e-9, "{}", pose);
        assert!(pose.y().abs() < 1e-9);
        assert!((rover.elapsed_s() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reverse() {
        let rover = SimRover::new(SimParams::default());
        let mut act = rover.actuator();
        let mut delay = rover.delay();

        act.reverse(30.0).unwrap();
        delay.delay_ms(1000);

        assert!((rover.true_pose().x() + 0.25).abs() < 1e-9);
        assert_eq!(rover.true_pose().heading_deg, 0.0);
    }

    #[test]
    fn test_right_steer_turns_clockwise() {
        let rover = SimRover::new(SimParams::default());
        let mut act = rover.actuator();
        let mut delay = rover.delay();

        act.drive(25.0, 35.0).unwrap();
        delay.delay_ms(200);

        let heading = rover.true_pose().heading_deg;
        assert!(heading > 180.0 && heading < 360.0, "heading {}", heading);
        assert!(rover.true_pose().y() < 0.0);
    }

    #[test]
    fn test_stop_keeps_steer() {
        let rover = SimRover::new(SimParams::default());
        let mut act = rover.actuator();

        act.drive(30.0, -20.0).unwrap();
        act.stop().unwrap();

        let world = rover.world.borrow();
        assert_eq!(world.speed_ms, 0.0);
        assert_eq!(world.steer_deg, -20.0);
        assert_eq!(
            world.commands,
            vec![
                ActuatorCmd::Drive {
                    speed: 30.0,
                    steer_deg: -20.0
                },
                ActuatorCmd::Stop,
            ]
        );
    }

    #[test]
    fn test_out_of_range_demands_rejected() {
        let rover = SimRover::new(SimParams::default());
        let mut act = rover.actuator();

        act.drive(30.0, 10.0).unwrap();

        for res in vec![
            act.set_steer_deg(50.0),
            act.drive(30.0, -35.5),
            act.drive(120.0, 0.0),
            act.reverse(-5.0),
            act.drive(std::f64::NAN, 0.0),
        ] {
            match res {
                Err(EqptError::CommandRejected(_)) => (),
                other => panic!("Expected a rejected command, got {:?}", other),
            }
        }

        // Rejected demands change nothing
        let world = rover.world.borrow();
        assert_eq!(world.steer_deg, 10.0);
        assert_eq!(world.speed_ms, world.ground_speed_ms(30.0));
        assert_eq!(world.commands.len(), 1);

        // The limits themselves are accepted
        drop(world);
        assert!(act.drive(100.0, 35.0).is_ok());
        assert!(act.set_steer_deg(-35.0).is_ok());
    }

    #[test]
    fn test_range_sensor() {
        let rover = SimRover::new(SimParams {
            obstacles: vec![
                Obstacle {
                    x_m: 1.0,
                    y_m: 0.0,
                    radius_m: 0.2,
                },
                Obstacle {
                    x_m: -0.5,
                    y_m: 0.0,
                    radius_m: 0.1,
                },
            ],
            ..Default::default()
        });
        let mut sensor = rover.range_sensor();

        // Only the obstacle in front is seen
        assert!((sensor.read_distance_cm().unwrap() - 80.0).abs() < 1e-9);

        rover.script_ranges(vec![15.0, 0.0]);
        assert_eq!(sensor.read_distance_cm().unwrap(), 15.0);
        assert_eq!(sensor.read_distance_cm().unwrap(), 0.0);
        assert!((sensor.read_distance_cm().unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_range_sensor_out_of_range() {
        let rover = SimRover::new(SimParams {
            obstacles: vec![Obstacle {
                x_m: 5.0,
                y_m: 0.0,
                radius_m: 0.5,
            }],
            ..Default::default()
        });

        assert_eq!(rover.range_sensor().read_distance_cm().unwrap(), 0.0);
    }

    #[test]
    fn test_faults() {
        let rover = SimRover::new(SimParams::default());
        let mut act = rover.actuator();
        let mut sensor = rover.range_sensor();

        rover.set_actuator_fault(true);
        rover.set_sensor_fault(true);

        assert!(act.drive(30.0, 0.0).is_err());
        assert!(sensor.read_distance_cm().is_err());
        assert!(rover.commands().is_empty());

        rover.set_actuator_fault(false);
        rover.set_sensor_fault(false);

        assert!(act.stop().is_ok());
        assert!(sensor.read_distance_cm().is_ok());
        assert_eq!(rover.commands(), vec![ActuatorCmd::Stop]);
    }
}
