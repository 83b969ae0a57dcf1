//! `picsync fetch`: one-shot client requests.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use picsync_core::Settings;
use picsync_daemon::{request_file, ClientOptions, TransferError};

use super::block_on;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Server-local paths to request, each over its own connection.
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<String>,

    /// Daemon address [default: sync.server from settings, 127.0.0.1:5000].
    #[arg(long)]
    pub server: Option<String>,

    /// Directory to save into.
    #[arg(long, default_value = ".")]
    pub dest: PathBuf,

    /// Per-read/write deadline; 0 disables.
    #[arg(long)]
    pub io_timeout_secs: Option<u64>,
}

impl FetchArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let server = self.server.unwrap_or(settings.sync.server.clone());
        let io_timeout = match self.io_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => settings.sync.io_timeout(),
        };
        let options = ClientOptions::with_io_timeout(io_timeout);

        std::fs::create_dir_all(&self.dest)
            .with_context(|| format!("cannot create {}", self.dest.display()))?;

        let total = self.paths.len();
        let failed = block_on(async {
            let mut failed = 0usize;
            for path in &self.paths {
                match request_file(&server, path, &self.dest, &options).await {
                    Ok(saved) => println!("saved {}", saved.display()),
                    Err(TransferError::NotFound { path }) => {
                        eprintln!("not found: {path}");
                        failed += 1;
                    }
                    Err(err) => {
                        eprintln!("failed: {path}: {err}");
                        failed += 1;
                    }
                }
            }
            failed
        })?;

        if failed > 0 {
            bail!("{failed} of {total} transfers failed");
        }
        Ok(())
    }
}
