//! Sync poller: mirrors files named by new work items onto local disk.
//!
//! Each tick:
//!
//! 1. consult the watchdog (no download for too long ends this instance),
//! 2. fetch items strictly after the persisted cursor,
//! 3. download every path of each item, skipping files already present,
//! 4. persist the cursor after each item, whatever its downloads did.
//!
//! The cursor moves per item, so a crash mid-item re-attempts that item's
//! paths on restart; the skip check makes that harmless.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use picsync_core::{
    load_lenient, timefmt, CheckpointStore, Supervisor, SupervisorExit, SyncCheckpoint,
    SyncSettings, Watchdog, WatchdogTripped, WorkItem,
};

use crate::error::SyncError;
use crate::fetcher::Fetcher;
use crate::local_path::{is_present, local_path_for};
use crate::source::{select_after, WorkSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerOptions {
    pub local_root: PathBuf,
    pub poll_interval: Duration,
    pub stale_after: Duration,
}

impl PollerOptions {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            local_root: settings.local_root.clone(),
            poll_interval: settings.poll_interval(),
            stale_after: settings.stale_after(),
        }
    }
}

/// Counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub items: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PollSummary {
    fn absorb(&mut self, other: PollSummary) {
        self.items += other.items;
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl fmt::Display for PollSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} items: {} downloaded, {} skipped, {} failed",
            self.items, self.downloaded, self.skipped, self.failed
        )
    }
}

pub struct Poller {
    source: Arc<dyn WorkSource>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn CheckpointStore<SyncCheckpoint>>,
    options: PollerOptions,
    watchdog: Watchdog,
}

impl Poller {
    pub fn new(
        source: Arc<dyn WorkSource>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn CheckpointStore<SyncCheckpoint>>,
        options: PollerOptions,
    ) -> Self {
        let watchdog = Watchdog::new("poller", options.stale_after);
        Self {
            source,
            fetcher,
            store,
            options,
            watchdog,
        }
    }

    /// Poll until the watchdog trips. Only checkpoint failures escape as errors.
    pub async fn run(self) -> Result<WatchdogTripped, SyncError> {
        tracing::info!(
            source = %self.source.describe(),
            local_root = %self.options.local_root.display(),
            interval = %timefmt::format_seconds(self.options.poll_interval.as_secs()),
            "sync poller started",
        );

        loop {
            if let Some(tripped) = self.watchdog.check(&*self.store) {
                return Ok(tripped);
            }

            let summary = self.poll_once().await?;
            if summary.items > 0 {
                tracing::info!(%summary, "poll complete");
            }

            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    /// One pass over the items after the persisted cursor.
    pub async fn poll_once(&self) -> Result<PollSummary, SyncError> {
        let mut checkpoint: SyncCheckpoint = load_lenient(&*self.store).unwrap_or_default();
        let cursor = checkpoint.cursor();

        let items = match self.source.fetch_after(cursor.as_ref()).await {
            Ok(items) => select_after(items, cursor.as_ref()),
            Err(err) => {
                tracing::warn!(
                    source = %self.source.describe(),
                    error = %err,
                    "could not fetch work items",
                );
                return Ok(PollSummary::default());
            }
        };

        if items.is_empty() {
            tracing::debug!("no new work items");
            return Ok(PollSummary::default());
        }
        tracing::info!(count = items.len(), "found new work items");

        let mut summary = PollSummary::default();
        for item in &items {
            let outcome = self.process_item(item).await;
            summary.absorb(outcome);

            checkpoint.advance_to(&item.cursor());
            if outcome.downloaded > 0 {
                checkpoint.last_download_time = Some(timefmt::now());
            }
            self.store.save(&checkpoint)?;
            tracing::debug!(cursor = %item.cursor(), "cursor saved");
        }

        Ok(summary)
    }

    async fn process_item(&self, item: &WorkItem) -> PollSummary {
        let mut summary = PollSummary {
            items: 1,
            ..PollSummary::default()
        };

        for remote in item.remote_paths() {
            let Some(local) = local_path_for(&self.options.local_root, remote) else {
                tracing::warn!(item = %item.id, path = %remote, "cannot map remote path");
                summary.failed += 1;
                continue;
            };

            if is_present(&local).await {
                tracing::debug!(path = %local.display(), "already present, skipping");
                summary.skipped += 1;
                continue;
            }

            let Some(dest_dir) = local.parent() else {
                summary.failed += 1;
                continue;
            };
            if let Err(err) = tokio::fs::create_dir_all(dest_dir).await {
                tracing::warn!(path = %dest_dir.display(), error = %err, "cannot create directory");
                summary.failed += 1;
                continue;
            }

            match self.fetcher.fetch(remote, dest_dir).await {
                Ok(saved) => {
                    tracing::info!(item = %item.id, path = %saved.display(), "downloaded");
                    if saved != local {
                        tracing::warn!(
                            item = %item.id,
                            expected = %local.display(),
                            saved = %saved.display(),
                            "server file name differs from remote path; it will be fetched again",
                        );
                    }
                    summary.downloaded += 1;
                }
                Err(err) if err.is_not_found() => {
                    tracing::info!(item = %item.id, path = %remote, "not on server");
                    summary.failed += 1;
                }
                Err(err) => {
                    tracing::warn!(item = %item.id, path = %remote, error = %err, "download failed");
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}

/// Keep a poller running under supervision until `shutdown` resolves.
pub async fn supervise<F>(
    settings: &SyncSettings,
    source: Arc<dyn WorkSource>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn CheckpointStore<SyncCheckpoint>>,
    shutdown: F,
) -> Result<SupervisorExit, SyncError>
where
    F: Future<Output = ()>,
{
    let options = PollerOptions::from_settings(settings);
    let supervisor = Supervisor::new("poller", settings.restart_policy());
    let exit = supervisor
        .run(
            || {
                let poller = Poller::new(
                    source.clone(),
                    fetcher.clone(),
                    store.clone(),
                    options.clone(),
                );
                poller.run()
            },
            shutdown,
        )
        .await?;
    Ok(exit)
}
