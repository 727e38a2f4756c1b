//! Command-line entry point for the SKIRT post-processing tools.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use skirt_post::config::PostConfig;
use skirt_post::frames::{self, FramesArgs};
use skirt_post::rgb::{self, RgbArgs};
use skirt_post::PostError;

#[derive(Parser)]
#[command(name = "skirt_post")]
#[command(about = "Render SKIRT FITS output into raster images")]
struct Cli {
    /// TOML file with pipeline defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render colormapped PNG/JPEG frames from FITS images or cubes
    Frames(FramesArgs),

    /// Compose false-color RGB images from spectral cubes
    Rgb(RgbArgs),
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

fn run(cli: &Cli) -> Result<(), PostError> {
    let config = PostConfig::load_or_default(cli.config.as_deref())?;
    match &cli.command {
        Commands::Frames(args) => frames::run(args, &config),
        Commands::Rgb(args) => rgb::run(args, &config),
    }
}
