//! `picsync status`: checkpoint and watchdog visibility.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDateTime;
use clap::Args;
use serde::Serialize;

use picsync_core::{
    paths, should_restart, timefmt, ActivityRecord, CheckpointStore, JsonFileStore,
    ServerCheckpoint, Settings, SyncCheckpoint,
};

use super::checkpoint_path;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    daemon: ComponentStatus,
    sync: ComponentStatus,
}

#[derive(Debug, Serialize)]
struct ComponentStatus {
    checkpoint: String,
    /// `ok`, `missing` or `unreadable`.
    state: &'static str,
    last_activity: Option<String>,
    age: Option<String>,
    threshold: String,
    would_restart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl StatusArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let now = timefmt::now();

        let daemon_path =
            checkpoint_path(settings.daemon.checkpoint.clone(), paths::server_checkpoint_path)?;
        let sync_path =
            checkpoint_path(settings.sync.checkpoint.clone(), paths::sync_checkpoint_path)?;

        let report = StatusReport {
            daemon: inspect::<ServerCheckpoint, _>(
                &daemon_path,
                settings.daemon.stale_after(),
                now,
                |_| None,
            ),
            sync: inspect::<SyncCheckpoint, _>(&sync_path, settings.sync.stale_after(), now, |c| {
                c.cursor().map(|cursor| cursor.to_string())
            }),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_component("daemon", "last send", &report.daemon);
            print_component("sync", "last download", &report.sync);
        }
        Ok(())
    }
}

fn inspect<T, F>(path: &Path, threshold: Duration, now: NaiveDateTime, cursor: F) -> ComponentStatus
where
    T: ActivityRecord + serde::Serialize + serde::de::DeserializeOwned,
    F: Fn(&T) -> Option<String>,
{
    let mut status = ComponentStatus {
        checkpoint: path.display().to_string(),
        state: "missing",
        last_activity: None,
        age: None,
        threshold: timefmt::format_seconds(threshold.as_secs()),
        would_restart: false,
        cursor: None,
        error: None,
    };

    match JsonFileStore::<T>::new(PathBuf::from(path)).load() {
        Ok(None) => {}
        Ok(Some(record)) => {
            let last = record.last_activity();
            status.state = "ok";
            status.last_activity = last.as_ref().map(timefmt::format);
            status.age = last.map(|at| timefmt::format_age(at, now));
            status.would_restart = should_restart(last, threshold, now);
            status.cursor = cursor(&record);
        }
        Err(err) => {
            status.state = "unreadable";
            status.error = Some(err.to_string());
        }
    }
    status
}

fn print_component(name: &str, activity_label: &str, status: &ComponentStatus) {
    println!("{name}");
    println!("  checkpoint:  {} ({})", status.checkpoint, status.state);
    match (&status.last_activity, &status.age) {
        (Some(at), Some(age)) => println!("  {activity_label:<12} {at} ({age} ago)"),
        _ => println!("  {activity_label:<12} no record"),
    }
    if let Some(cursor) = &status.cursor {
        println!("  cursor:      {cursor}");
    }
    let verdict = if status.would_restart { "STALE" } else { "ok" };
    println!("  watchdog:    {verdict} (threshold {})", status.threshold);
    if let Some(err) = &status.error {
        println!("  error:       {err}");
    }
}
