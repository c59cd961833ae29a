//! Main convoy executable entry point.
//!
//! # Architecture
//!
//! The executable runs a whole convoy in simulation:
//!
//!     - Initialise the session and logging
//!     - Load the simulation parameters
//!     - Initialise one convoy control module per agent
//!     - Main loop, once per cycle:
//!         - Deliver the mail posted during the last cycle
//!         - Convoy control processing for each agent
//!         - Vehicle motion
//!     - Save and print the run summary

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::info;
use owo_colors::OwoColorize;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use convoy_lib::{
    convoy_ctrl::ConvoyCtrl,
    sim::{Sim, SimParams, SimSummary},
};
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "convoy_exec", about = "Runs a simulated convoy")]
struct Opts {
    /// Number of cycles to run, overriding the parameter file
    #[structopt(short, long)]
    ticks: Option<u64>,

    /// Drop every nth message on the bus
    #[structopt(long)]
    drop_every: Option<u64>,

    /// Duplicate every nth message on the bus
    #[structopt(long)]
    duplicate_every: Option<u64>,

    /// Run in real time rather than as fast as possible
    #[structopt(short, long)]
    realtime: bool,

    /// Log debug and trace messages
    #[structopt(short, long)]
    verbose: bool,

    /// Print the summary as json
    #[structopt(long)]
    json: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session =
        Session::new("convoy_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    let level = match opts.verbose {
        true => LevelFilter::Trace,
        false => LevelFilter::Info,
    };
    logger_init(level, &session).wrap_err("Failed to initialise logging")?;

    info!("Convoy Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let mut sim_params: SimParams =
        util::params::load("sim.toml").wrap_err("Could not load sim params")?;

    if let Some(t) = opts.ticks {
        sim_params.num_ticks = t;
    }
    if let Some(n) = opts.drop_every {
        sim_params.bus.drop_every = n;
    }
    if let Some(n) = opts.duplicate_every {
        sim_params.bus.duplicate_every = n;
    }
    if !sim_params.cycle_period_s.is_finite() || sim_params.cycle_period_s <= 0.0 {
        sim_params.cycle_period_s = CYCLE_PERIOD_S;
    }

    info!("Sim parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let cycle_period_s = sim_params.cycle_period_s;
    let num_ticks = sim_params.num_ticks;
    let mut sim = Sim::new(sim_params, |name| {
        let mut ctrl = ConvoyCtrl::new(name);
        ctrl.init("convoy_ctrl.toml", &session)?;
        info!("ConvoyCtrl init complete for {}", ctrl.name());
        Ok(ctrl)
    })
    .wrap_err("Failed to initialise the simulation")?;

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    if opts.realtime {
        let cycle_period = Duration::from_secs_f64(cycle_period_s);

        while sim.tick() < num_ticks {
            // Get cycle start time
            let cycle_start_instant = Instant::now();

            sim.step().wrap_err("Error during the simulation cycle")?;

            // Sleep for the rest of the cycle
            if let Some(d) = cycle_period.checked_sub(cycle_start_instant.elapsed()) {
                thread::sleep(d);
            }
        }
    } else {
        sim.run().wrap_err("Error during the simulation")?;
    }

    // ---- SUMMARY ----

    let summary = sim.summary();
    session
        .save_json("sim_summary.json", &summary)
        .wrap_err("Could not save the simulation summary")?;

    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).wrap_err("Could not serialise the summary")?
        );
    } else {
        print_summary(&summary);
    }

    Ok(())
}

/// Print the end of run summary.
fn print_summary(summary: &SimSummary) {
    println!(
        "\n{} after {} cycles ({:.1} s)",
        match summary.converged {
            true => "Converged".green().to_string(),
            false => "Not converged".red().to_string(),
        },
        summary.ticks,
        summary.time_s
    );

    for a in summary.agents.iter() {
        println!(
            "  {:<8} {:<10} order {:<12} at ({:>7.1}, {:>7.1}) {:.2} m/s, {} points in, {} relayed",
            a.name.bold(),
            format!("{:?}", a.role).cyan(),
            a.ordering,
            a.x_m,
            a.y_m,
            a.speed_ms,
            a.totals.points_received,
            a.totals.points_relayed
        );
    }

    println!(
        "  bus: {} posted, {} delivered, {} dropped, {} duplicated",
        summary.bus.posted,
        summary.bus.delivered,
        summary.bus.dropped.yellow(),
        summary.bus.duplicated
    );
}
