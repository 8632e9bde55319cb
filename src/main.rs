//! orbitsim - orbital propagation from the command line

mod analysis;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use orbitsim::data::{load_registry, load_settings};
use orbitsim::propagation::SimulationSettings;

use analysis::{BodiesArgs, HohmannArgs, PropagateArgs, SimulateArgs};

#[derive(Parser, Debug)]
#[command(name = "orbitsim", version, about = "Multi-body orbital propagation")]
struct Cli {
    /// Body catalog (.json or .json.gz), defaults to the built-in solar system
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Simulation settings (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog bodies with their SOI radii and data sources
    Bodies(BodiesArgs),
    /// Bulk-propagate a satellite and write the trajectory as JSON
    Propagate(PropagateArgs),
    /// Compute a Hohmann transfer between two circular orbits
    Hohmann(HohmannArgs),
    /// Run the live simulation loop with one satellite
    Simulate(SimulateArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let settings = match &cli.config {
        Some(path) => load_settings(path)?,
        None => SimulationSettings::default(),
    };

    match cli.command {
        Command::Hohmann(args) => analysis::run_hohmann(args),
        Command::Bodies(args) => {
            let registry = load_registry(cli.catalog.as_deref())?;
            analysis::run_bodies(args, registry, &settings)
        }
        Command::Propagate(args) => {
            let registry = load_registry(cli.catalog.as_deref())?;
            analysis::run_propagate(args, registry, &settings)
        }
        Command::Simulate(args) => {
            let registry = load_registry(cli.catalog.as_deref())?;
            analysis::run_simulate(args, registry, settings)
        }
    }
}
