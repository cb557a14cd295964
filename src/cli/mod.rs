//! Command-line interface.

pub mod commands;
pub mod output;
pub mod table;

use clap::{Parser, Subcommand};

use commands::config::ConfigArgs;
use commands::simulate::SimulateArgs;

#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(about = "Conductor - adaptive task orchestration core", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Log to stdout
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and validate configuration
    Config(ConfigArgs),

    /// Run a synthetic workload through the orchestrator
    Simulate(SimulateArgs),
}

/// Print an error and exit with a failure status.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let payload = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        eprintln!("{payload}");
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1)
}
