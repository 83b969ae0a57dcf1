//! Default on-disk locations, all rooted at `<home>/.picsync/`.

use std::path::{Path, PathBuf};

use crate::error::CoreError;

pub const SETTINGS_FILE: &str = "config.yaml";
pub const SERVER_CHECKPOINT_FILE: &str = "server_progress.json";
pub const SYNC_CHECKPOINT_FILE: &str = "sync_progress.json";

pub fn picsync_root(home: &Path) -> PathBuf {
    home.join(".picsync")
}

pub fn settings_path(home: &Path) -> PathBuf {
    picsync_root(home).join(SETTINGS_FILE)
}

pub fn server_checkpoint_path(home: &Path) -> PathBuf {
    picsync_root(home).join(SERVER_CHECKPOINT_FILE)
}

pub fn sync_checkpoint_path(home: &Path) -> PathBuf {
    picsync_root(home).join(SYNC_CHECKPOINT_FILE)
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}
