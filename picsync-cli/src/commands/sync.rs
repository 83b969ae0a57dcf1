//! `picsync sync`: the poller that mirrors work-item files locally.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;

use picsync_core::{paths, JsonFileStore, Settings, SyncCheckpoint, SyncSettings};
use picsync_daemon::ClientOptions;
use picsync_sync::{supervise, JsonFileSource, Poller, PollerOptions, TcpFetcher};

use super::{block_on, checkpoint_path, interrupted, report_exit};

#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Transfer daemon address [default: 127.0.0.1:5000].
    #[arg(long)]
    pub server: Option<String>,

    /// JSON file listing work items.
    #[arg(long, value_name = "FILE")]
    pub items: Option<PathBuf>,

    /// Directory the remote tree is mirrored under [default: .].
    #[arg(long, value_name = "DIR")]
    pub local_root: Option<PathBuf>,

    /// Checkpoint file [default: ~/.picsync/sync_progress.json].
    #[arg(long, value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,

    /// Seconds between polls [default: 300].
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Restart when nothing has been downloaded for this many hours [default: 2].
    #[arg(long)]
    pub stale_after_hours: Option<u64>,

    /// Pause before each restart [default: 10].
    #[arg(long)]
    pub restart_delay_secs: Option<u64>,

    /// Per-read/write deadline on transfers; 0 disables [default: 300].
    #[arg(long)]
    pub io_timeout_secs: Option<u64>,

    /// Restart by launching a fresh process instead of in place.
    #[arg(long)]
    pub respawn: bool,

    /// Poll a single time, print the summary and exit.
    #[arg(long)]
    pub once: bool,
}

impl SyncArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let once = self.once;
        let sync = self.apply(settings.sync);

        let Some(items) = sync.items.clone() else {
            bail!("no work-item source configured; pass --items or set sync.items");
        };
        let checkpoint = checkpoint_path(sync.checkpoint.clone(), paths::sync_checkpoint_path)?;
        tracing::info!(checkpoint = %checkpoint.display(), "using sync checkpoint");

        let source = Arc::new(JsonFileSource::new(items));
        let fetcher = Arc::new(TcpFetcher::new(
            sync.server.clone(),
            ClientOptions::with_io_timeout(sync.io_timeout()),
        ));
        let store = Arc::new(JsonFileStore::<SyncCheckpoint>::new(checkpoint));

        if once {
            let poller = Poller::new(source, fetcher, store, PollerOptions::from_settings(&sync));
            let summary = block_on(poller.poll_once())?.context("poll failed")?;
            println!("{summary}");
            return Ok(());
        }

        let exit = block_on(supervise(&sync, source, fetcher, store, interrupted()))?
            .context("sync poller failed")?;
        report_exit("poller", exit);
        Ok(())
    }

    fn apply(self, mut sync: SyncSettings) -> SyncSettings {
        if let Some(server) = self.server {
            sync.server = server;
        }
        if self.items.is_some() {
            sync.items = self.items;
        }
        if let Some(root) = self.local_root {
            sync.local_root = root;
        }
        if self.checkpoint.is_some() {
            sync.checkpoint = self.checkpoint;
        }
        if let Some(secs) = self.poll_interval_secs {
            sync.poll_interval_secs = secs;
        }
        if let Some(hours) = self.stale_after_hours {
            sync.stale_after_hours = hours;
        }
        if let Some(secs) = self.restart_delay_secs {
            sync.restart_delay_secs = secs;
        }
        if let Some(secs) = self.io_timeout_secs {
            sync.io_timeout_secs = secs;
        }
        sync.respawn |= self.respawn;
        sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_keep_file_values() {
        let file = SyncSettings {
            server: "10.0.0.5:6000".into(),
            items: Some(PathBuf::from("/etc/picsync/items.json")),
            ..SyncSettings::default()
        };
        let args = SyncArgs {
            local_root: Some(PathBuf::from("/mirror")),
            ..SyncArgs::default()
        };

        let merged = args.apply(file);
        assert_eq!(merged.server, "10.0.0.5:6000");
        assert_eq!(merged.items, Some(PathBuf::from("/etc/picsync/items.json")));
        assert_eq!(merged.local_root, PathBuf::from("/mirror"));
    }
}
