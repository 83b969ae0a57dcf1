//! picsync: single-file TCP transfer daemon, client and sync poller.
//!
//! # Usage
//!
//! ```text
//! picsync serve [--host 0.0.0.0] [--port 5000] [--respawn]
//! picsync fetch <path>... [--server host:port] [--dest dir]
//! picsync sync [--items items.json] [--local-root dir] [--once]
//! picsync status [--json]
//! ```
//!
//! Every command reads `~/.picsync/config.yaml` (or `--config <file>`);
//! flags override the file.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{fetch::FetchArgs, serve::ServeArgs, status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "picsync",
    version,
    about = "Serve, fetch and mirror files over a minimal TCP protocol",
    long_about = None,
)]
struct Cli {
    /// Settings file (default: ~/.picsync/config.yaml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the transfer daemon under supervision.
    Serve(ServeArgs),

    /// Request one or more files from a transfer daemon.
    Fetch(FetchArgs),

    /// Run the sync poller under supervision.
    Sync(SyncArgs),

    /// Show both checkpoints and whether their watchdogs would trip.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let settings = commands::load_settings(cli.config.as_deref())?;
    match cli.command {
        Commands::Serve(args) => args.run(settings),
        Commands::Fetch(args) => args.run(settings),
        Commands::Sync(args) => args.run(settings),
        Commands::Status(args) => args.run(settings),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
