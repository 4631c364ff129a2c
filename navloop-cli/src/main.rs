//! navloop CLI - replay and maintenance tool
//!
//! Runs recorded traces through the navigation tick loop and manages the
//! on-disk voice response cache.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::simulate::SimulateArgs;

#[derive(Parser)]
#[command(name = "navloop")]
#[command(version = navloop::VERSION)]
#[command(about = "Route progress tick loop simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded trace against a route
    Simulate {
        /// Route JSON file
        #[arg(long)]
        route: PathBuf,

        /// Replay trace JSON file: an array of { location, status } frames
        #[arg(long)]
        trace: PathBuf,

        /// Configuration file (defaults to the user config)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the tick interval in milliseconds
        #[arg(long)]
        tick_ms: Option<u64>,
    },

    /// Manage the voice response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        /// Configuration file (defaults to the user config)
        #[arg(long, global = true)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate {
            route,
            trace,
            config,
            tick_ms,
        } => commands::simulate::run(SimulateArgs {
            route,
            trace,
            config,
            tick_ms,
        }),
        Commands::Cache { action, config } => commands::cache::run(action, config.as_deref()),
    };

    if let Err(e) = result {
        e.exit();
    }
}
