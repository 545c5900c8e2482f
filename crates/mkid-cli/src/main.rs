use std::error::Error;
use std::io;

use clap::{ArgAction, Parser, Subcommand};
use commands::{
    apply::{self, ApplyArgs},
    fetch::{self, FetchArgs},
    inspect::{self, InspectArgs},
    validate::{self, ValidateArgs},
    version::{self, VersionArgs},
};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "mkid-pipe", about = "MKID calibration pipeline driver")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a calibration solution, fitting one if the store has no match.
    Fetch(FetchArgs),
    /// Fetch and apply solutions to a photon table (wavecal before flatcal).
    Apply(ApplyArgs),
    /// List the solutions filed in the store.
    Inspect(InspectArgs),
    /// Validate a configuration and optionally a dataset.
    Validate(ValidateArgs),
    /// Print version information.
    Version(VersionArgs),
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Fetch(args) => fetch::run(&args),
        Command::Apply(args) => apply::run(&args),
        Command::Inspect(args) => inspect::run(&args),
        Command::Validate(args) => validate::run(&args),
        Command::Version(args) => version::run(&args),
    }
}
