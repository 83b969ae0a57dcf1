pub mod fetch;
pub mod serve;
pub mod status;
pub mod sync;

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use picsync_core::{paths, Settings, SupervisorExit};

/// Load the settings file: the explicit `--config` path, which must exist,
/// or `~/.picsync/config.yaml`, which may not.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let path = match explicit {
        Some(path) => {
            if !path.is_file() {
                bail!("settings file not found: {}", path.display());
            }
            path.to_path_buf()
        }
        None => match paths::home() {
            Ok(home) => paths::settings_path(&home),
            Err(_) => return Ok(Settings::default()),
        },
    };
    Settings::load_at(&path).with_context(|| format!("failed to load {}", path.display()))
}

/// `configured` if set, else `default_for(home)`.
pub fn checkpoint_path(
    configured: Option<PathBuf>,
    default_for: fn(&Path) -> PathBuf,
) -> Result<PathBuf> {
    match configured {
        Some(path) => Ok(path),
        None => {
            let home = paths::home().context("could not determine home directory")?;
            Ok(default_for(&home))
        }
    }
}

/// Run `fut` to completion on a single-threaded runtime.
pub fn block_on<F: Future>(fut: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(fut))
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
pub async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("interrupt received, shutting down"),
        Err(err) => {
            tracing::warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

pub fn report_exit(component: &str, exit: SupervisorExit) {
    match exit {
        SupervisorExit::Stopped => tracing::info!("{component} stopped"),
        SupervisorExit::Respawned { pid } => {
            tracing::info!(pid, "{component} handed over to a fresh process")
        }
    }
}
