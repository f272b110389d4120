//! # Navigation library.
//!
//! Waypoint navigation for a small car-like rover. The library allows the executable and the
//! integration tests to access items defined inside the navigation crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Equipment interfaces - the actuator and range sensor traits the navigator drives
pub mod eqpt;

/// Heading controller - turns the rover onto a target heading
pub mod heading_ctrl;

/// Localisation module - dead-reckoning estimate of where the rover is
pub mod loc;

/// Navigation manager - the state machine which drives the rover to a goal
pub mod nav_mgr;

/// Parameters for the navigation executable
pub mod params;

/// Simulated rover - kinematic stand-in for the hardware
pub mod sim;
