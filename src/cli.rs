use std::{path::PathBuf, sync::OnceLock};

use clap::{Parser, Subcommand};

/// Audit log collection and service lifecycle control for the person-records fleet.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the config file.
    #[arg(short, long, default_value = "fleetkeeper.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the log ingestion and query service.
    Logs,
    /// Run the service lifecycle controller.
    Orchestrator,
    /// Send a single audit event to a running log service.
    Emit(EmitArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct EmitArgs {
    /// Base URL of the log service.
    #[arg(long, default_value = "http://localhost:3005")]
    pub url: String,
    #[arg(long)]
    pub action: String,
    /// Name of the producing service.
    #[arg(long)]
    pub service: String,
    #[arg(long)]
    pub document_number: Option<String>,
    /// Arbitrary JSON attached to the event.
    #[arg(long)]
    pub details: Option<String>,
    /// Log delivery failures instead of exiting with an error.
    #[arg(long)]
    pub best_effort: bool,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
