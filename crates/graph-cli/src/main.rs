//! `service-graph` command line tool

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod simulated;

#[derive(Parser)]
#[command(name = "service-graph")]
#[command(about = "Start and stop services in dependency order")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a manifest for missing services and cycles
    Validate {
        /// Manifest file
        manifest: PathBuf,
    },

    /// Show the start levels and stop order of a manifest
    Plan {
        /// Manifest file
        manifest: PathBuf,
    },

    /// Simulate starting and stopping every service of a manifest
    Run {
        /// Manifest file
        manifest: PathBuf,

        /// How long to keep the graph running once healthy, in milliseconds
        #[arg(long, default_value_t = 0)]
        hold: u64,

        /// Give up waiting for shutdown after this many seconds
        #[arg(long, default_value_t = 30)]
        shutdown_timeout: u64,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    smol::block_on(async {
        match cli.command {
            Commands::Validate { manifest } => commands::validate::run(&manifest).await,
            Commands::Plan { manifest } => commands::plan::run(&manifest).await,
            Commands::Run {
                manifest,
                hold,
                shutdown_timeout,
            } => commands::run::run(&manifest, hold, shutdown_timeout).await,
        }
    })
}
