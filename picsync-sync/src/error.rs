//! Error types for picsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use picsync_core::CoreError;

/// Failure to obtain work items. Ends the current tick, never the poller.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The work-item file is not a JSON array of items.
    #[error("invalid work items in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("work source unavailable: {0}")]
    Unavailable(String),
}

/// Errors that escape the poll loop and hand control to the supervisor.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CoreError),
}
