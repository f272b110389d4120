//! Main navigation executable entry point.
//!
//! Drives the simulated rover from the origin to the goal given on the command line.
//!
//! # Usage
//!
//! ```text
//! nav_exec [-v|-vv] [--params <file>] [--realtime] <goal-x> <goal-y>
//! ```
//!
//! The run can be cancelled with Ctrl-C, the rover is always commanded to stop before the
//! executable exits.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use structopt::StructOpt;

// Internal
use nav_lib::{
    nav_mgr::{NavOutcome, Navigator},
    params::NavExecParams,
    sim::SimRover,
};
use util::{
    host,
    logger::{level_from_verbosity, logger_init},
    session::Session,
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Drive the rover to a goal position using dead-reckoning.
#[derive(Debug, StructOpt)]
#[structopt(name = "nav_exec", setting = structopt::clap::AppSettings::AllowNegativeNumbers)]
struct Args {
    /// X coordinate of the goal in meters
    goal_x: f64,

    /// Y coordinate of the goal in meters
    goal_y: f64,

    /// Increase the log verbosity, -v for debug and -vv for trace
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    /// Parameter file, relative to the params directory
    #[structopt(long = "params", default_value = "nav_exec.toml")]
    params: String,

    /// Run the simulation in real time
    #[structopt(long = "realtime")]
    realtime: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("nav_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(level_from_verbosity(args.verbose), &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Waypoint Navigation Executable\n");
    info!("Running on: {}", host::get_host_info());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let mut params: NavExecParams =
        util::params::load(&args.params).wrap_err("Could not load the navigation parameters")?;

    if args.realtime {
        params.sim.realtime = true;
    }

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let rover = SimRover::new(params.sim.clone());

    let mut navigator = Navigator::new(
        params.nav.clone(),
        rover.actuator(),
        rover.range_sensor(),
        rover.delay(),
    )
    .wrap_err("Failed to initialise the navigator")?;

    let cancel = navigator.cancel_token();
    ctrlc::set_handler(move || {
        cancel.cancel();
    })
    .wrap_err("Failed to set the Ctrl-C handler")?;

    info!("Initialisation complete\n");

    // ---- RUN ----

    let outcome = navigator
        .navigate_to_point(args.goal_x, args.goal_y)
        .wrap_err("Navigation failed")?;

    match outcome {
        NavOutcome::GoalReached(pose) => info!("Goal reached, estimated pose: {}", pose),
        NavOutcome::Cancelled(pose) => warn!("Navigation cancelled, estimated pose: {}", pose),
    }

    info!(
        "Simulated rover finished at {} after {:.2} s",
        rover.true_pose(),
        rover.elapsed_s()
    );

    // ---- SHUTDOWN ----

    drop(navigator);

    info!("End of execution");

    Ok(())
}
