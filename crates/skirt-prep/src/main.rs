//! Command-line entry point for the SKIRT preparation tools.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use skirt_prep::check::{self, CheckArgs};
use skirt_prep::config::PrepConfig;
use skirt_prep::extract::{self, ExtractArgs};
use skirt_prep::ski::{self, SkiArgs};
use skirt_prep::views::{self, CamerasArgs, ViewsArgs};
use skirt_prep::PrepError;

#[derive(Parser)]
#[command(name = "skirt_prep")]
#[command(about = "Convert FIRE snapshots into SKIRT input files")]
struct Cli {
    /// TOML file with pipeline defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract star/gas particle tables from FIRE HDF5 snapshots
    Extract(ExtractArgs),

    /// Generate camera directions on a Fibonacci sphere
    Views(ViewsArgs),

    /// Build the SKIRT .ski parameter file
    Ski(SkiArgs),

    /// Report Cartesian camera positions for the view list
    Cameras(CamerasArgs),

    /// Sanity-check tables and verify per-view output images
    Check(CheckArgs),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), PrepError> {
    let config = PrepConfig::load_or_default(cli.config.as_deref())?;
    match &cli.command {
        Commands::Extract(args) => extract::run(args, &config),
        Commands::Views(args) => views::run_views(args),
        Commands::Ski(args) => ski::run(args, &config),
        Commands::Cameras(args) => views::run_cameras(args),
        Commands::Check(args) => check::run(args),
    }
}
