//! Error types for picsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from checkpoint, settings and restart handling.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint file exists but is not valid JSON of the expected shape.
    #[error("failed to parse checkpoint at {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Checkpoint serialisation failed on save.
    #[error("checkpoint JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings file parse error, with the line context from serde_yaml.
    #[error("failed to parse settings at {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so `~/.picsync/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// Spawning the replacement process failed.
    #[error("failed to respawn {program}: {source}")]
    Respawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
