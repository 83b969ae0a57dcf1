//! `picsync serve`: the transfer daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use picsync_core::{paths, DaemonSettings, JsonFileStore, ServerCheckpoint, Settings};

use super::{block_on, checkpoint_path, interrupted, report_exit};

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to bind [default: 0.0.0.0].
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on [default: 5000].
    #[arg(long)]
    pub port: Option<u16>,

    /// Checkpoint file [default: ~/.picsync/server_progress.json].
    #[arg(long, value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,

    /// Restart when nothing has been sent for this many hours [default: 24].
    #[arg(long)]
    pub stale_after_hours: Option<u64>,

    /// Pause before each restart [default: 10].
    #[arg(long)]
    pub restart_delay_secs: Option<u64>,

    /// Per-read/write deadline on client sockets; 0 disables [default: 300].
    #[arg(long)]
    pub io_timeout_secs: Option<u64>,

    /// Restart by launching a fresh process instead of in place.
    #[arg(long)]
    pub respawn: bool,
}

impl ServeArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let daemon = self.apply(settings.daemon);
        let checkpoint = checkpoint_path(daemon.checkpoint.clone(), paths::server_checkpoint_path)?;
        tracing::info!(checkpoint = %checkpoint.display(), "using daemon checkpoint");

        let store = Arc::new(JsonFileStore::<ServerCheckpoint>::new(checkpoint));
        let exit = block_on(picsync_daemon::serve(&daemon, store, interrupted()))?
            .with_context(|| format!("transfer daemon failed on {}", daemon.bind_addr()))?;
        report_exit("daemon", exit);
        Ok(())
    }

    fn apply(self, mut daemon: DaemonSettings) -> DaemonSettings {
        if let Some(host) = self.host {
            daemon.host = host;
        }
        if let Some(port) = self.port {
            daemon.port = port;
        }
        if self.checkpoint.is_some() {
            daemon.checkpoint = self.checkpoint;
        }
        if let Some(hours) = self.stale_after_hours {
            daemon.stale_after_hours = hours;
        }
        if let Some(secs) = self.restart_delay_secs {
            daemon.restart_delay_secs = secs;
        }
        if let Some(secs) = self.io_timeout_secs {
            daemon.io_timeout_secs = secs;
        }
        daemon.respawn |= self.respawn;
        daemon
    }
}
