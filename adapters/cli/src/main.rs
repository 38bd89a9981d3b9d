#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs headless ChipNotes rounds.

mod autoplayer;
mod data;
mod simulate;
mod storage;

use std::path::PathBuf;

use anyhow::{bail, Result};
use chipnotes_system_modes::seed_from_date_string;
use chipnotes_system_validation::{validate_clips, validate_pack, ValidationReport};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chipnotes", version, about = "Bird-sound ear-training round engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play one round with a simulated player and record the result
    Simulate(SimulateArgs),

    /// Check a pack definition and, optionally, its clip records
    Validate {
        /// Pack definition JSON file
        #[arg(long)]
        pack: PathBuf,

        /// Clip records JSON file
        #[arg(long)]
        clips: Option<PathBuf>,
    },

    /// Print the daily challenge seed for a calendar date
    Seed {
        /// Date string, e.g. 2024-01-15
        date: String,
    },
}

/// Mode selected on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Campaign,
    Practice,
    Challenge,
    Random,
}

/// Options of the `simulate` subcommand.
#[derive(clap::Args, Debug)]
struct SimulateArgs {
    /// Pack definition JSON file
    #[arg(long)]
    pack: PathBuf,

    /// Clip records JSON file
    #[arg(long)]
    clips: PathBuf,

    /// Game mode to play
    #[arg(long, value_enum, default_value = "campaign")]
    mode: ModeArg,

    /// Campaign level to play instead of the current one
    #[arg(long)]
    level: Option<u32>,

    /// Campaign accuracy percentage needed to unlock the next level
    #[arg(long, default_value_t = chipnotes_system_modes::DEFAULT_UNLOCK_THRESHOLD)]
    unlock_threshold: f64,

    /// Species to drill in practice mode
    #[arg(long)]
    species: Option<String>,

    /// Date for the daily challenge
    #[arg(long)]
    date: Option<String>,

    /// Explicit scheduling seed
    #[arg(long)]
    seed: Option<u64>,

    /// Challenge length in milliseconds
    #[arg(long, default_value_t = chipnotes_system_modes::DEFAULT_CHALLENGE_MS)]
    duration_ms: u64,

    /// Random session length in milliseconds before quitting
    #[arg(long, default_value = "60000")]
    session_ms: u64,

    /// Probability that the simulated player names the right species
    #[arg(long, default_value = "0.8")]
    accuracy: f64,

    /// Seed of the simulated player, derived from the round seed by default
    #[arg(long)]
    player_seed: Option<u64>,

    /// Engine tuning TOML file
    #[arg(long)]
    tuning: Option<PathBuf>,

    /// Progress file to load and update
    #[arg(long)]
    progress: Option<PathBuf>,
}

/// Entry point for the ChipNotes command-line interface.
fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        error!(error = %format!("{err:#}"), "command_failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Simulate(args) => simulate::run(&args),
        Commands::Validate { pack, clips } => validate(&pack, clips.as_deref()),
        Commands::Seed { date } => {
            println!("{}", seed_from_date_string(&date));
            Ok(())
        }
    }
}

fn validate(pack: &std::path::Path, clips: Option<&std::path::Path>) -> Result<()> {
    let definition = data::load_pack_definition(pack)?;
    let mut failures = report("pack", &validate_pack(&definition));
    if let Some(clips) = clips {
        let clips = data::load_clips(clips)?;
        failures += report("clips", &validate_clips(&clips));
    }
    if failures > 0 {
        bail!("{failures} validation error(s) in pack `{}`", definition.pack_id);
    }
    println!(
        "pack `{}` is valid ({} species)",
        definition.pack_id,
        definition.species.len()
    );
    Ok(())
}

fn report(subject: &str, report: &ValidationReport) -> usize {
    for field_error in report.errors() {
        println!("{subject}: {field_error}");
    }
    report.errors().len()
}
