//! How the poller downloads one remote path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use picsync_daemon::{request_file, ClientOptions, TransferError};

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `remote_path` into `dest_dir`; returns the saved file.
    async fn fetch(&self, remote_path: &str, dest_dir: &Path) -> Result<PathBuf, TransferError>;
}

/// Fetches over TCP from a transfer daemon, one connection per file.
#[derive(Debug, Clone)]
pub struct TcpFetcher {
    addr: String,
    options: ClientOptions,
}

impl TcpFetcher {
    pub fn new(addr: impl Into<String>, options: ClientOptions) -> Self {
        Self {
            addr: addr.into(),
            options,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Fetcher for TcpFetcher {
    async fn fetch(&self, remote_path: &str, dest_dir: &Path) -> Result<PathBuf, TransferError> {
        request_file(&self.addr, remote_path, dest_dir, &self.options).await
    }
}
