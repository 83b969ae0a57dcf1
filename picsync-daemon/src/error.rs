use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

/// Framing-level failures. Always fatal to the one connection, never to
/// the process.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed before a complete field arrived.
    #[error("connection closed while reading {field}")]
    Truncated { field: &'static str },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("timed out during {phase}")]
    TimedOut { phase: &'static str },
}

/// Outcome of a failed single-file request, as seen by the client.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The daemon answered with the not-found sentinel.
    #[error("server has no readable file at {path}")]
    NotFound { path: String },

    /// The peer went away before the full payload arrived.
    #[error("connection lost after {received} of {expected} bytes")]
    ConnectionLost { received: u64, expected: u64 },

    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] WireError),

    /// Local write failure while persisting the download.
    #[error("I/O error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransferError::NotFound { .. })
    }
}

/// Error surface for the transfer daemon runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] picsync_core::CoreError),

    #[error(transparent)]
    Wire(#[from] WireError),

    /// The file changed size while it was being streamed.
    #[error("{path} changed during send: sent {sent} of {expected} bytes")]
    ShortSend {
        path: PathBuf,
        sent: u64,
        expected: u64,
    },
}

pub(crate) fn io_err(context: impl Into<String>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        context: context.into(),
        source,
    }
}

/// Errors that mean the peer is gone rather than that something is broken.
pub(crate) fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
