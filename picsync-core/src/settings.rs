//! Runtime settings for the daemon and the poller.
//!
//! Settings come from an optional YAML file with a `daemon:` and a `sync:`
//! section. Every field has a default matching the long-standing
//! deployment values, so an empty or missing file is valid. Command-line
//! flags are applied on top by the binary.
//!
//! ```yaml
//! daemon:
//!   host: 0.0.0.0
//!   port: 5000
//!   stale_after_hours: 24
//! sync:
//!   server: 10.0.0.5:5000
//!   local_root: /srv/mirror
//!   items: /srv/mirror/items.json
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::supervisor::{RestartMode, RestartPolicy};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

/// Settings for `picsync serve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub host: String,
    pub port: u16,
    /// Overrides `~/.picsync/server_progress.json`.
    pub checkpoint: Option<PathBuf>,
    /// Restart when no file has been sent for this long.
    pub stale_after_hours: u64,
    pub restart_delay_secs: u64,
    /// Deadline for each socket read or write; `0` waits forever.
    pub io_timeout_secs: u64,
    /// Replace a stale daemon with a new process instead of in-process.
    pub respawn: bool,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            checkpoint: None,
            stale_after_hours: 24,
            restart_delay_secs: 10,
            io_timeout_secs: 300,
            respawn: false,
        }
    }
}

impl DaemonSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stale_after(&self) -> Duration {
        hours(self.stale_after_hours)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        optional_secs(self.io_timeout_secs)
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        restart_policy(self.restart_delay_secs, self.respawn)
    }
}

/// Settings for `picsync sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Transfer daemon address, `host:port`.
    pub server: String,
    /// Downloaded files are mirrored under this directory.
    pub local_root: PathBuf,
    /// JSON work-item file consumed by the poller.
    pub items: Option<PathBuf>,
    /// Overrides `~/.picsync/sync_progress.json`.
    pub checkpoint: Option<PathBuf>,
    pub poll_interval_secs: u64,
    /// Restart when nothing has been downloaded for this long.
    pub stale_after_hours: u64,
    pub restart_delay_secs: u64,
    pub io_timeout_secs: u64,
    pub respawn: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{DEFAULT_PORT}"),
            local_root: PathBuf::from("."),
            items: None,
            checkpoint: None,
            poll_interval_secs: 300,
            stale_after_hours: 2,
            restart_delay_secs: 10,
            io_timeout_secs: 300,
            respawn: false,
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        hours(self.stale_after_hours)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        optional_secs(self.io_timeout_secs)
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        restart_policy(self.restart_delay_secs, self.respawn)
    }
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub daemon: DaemonSettings,
    pub sync: SyncSettings,
}

impl Settings {
    /// Load settings from `path`; a missing file yields defaults.
    pub fn load_at(path: &Path) -> Result<Self, CoreError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(io_err(path, err)),
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| CoreError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn hours(h: u64) -> Duration {
    Duration::from_secs(h.saturating_mul(3600))
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn restart_policy(delay_secs: u64, respawn: bool) -> RestartPolicy {
    RestartPolicy {
        delay: Duration::from_secs(delay_secs),
        mode: if respawn {
            RestartMode::Respawn
        } else {
            RestartMode::InProcess
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load_at(&tmp.path().join("config.yaml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.daemon.bind_addr(), "0.0.0.0:5000");
        assert_eq!(settings.daemon.stale_after(), Duration::from_secs(24 * 3600));
        assert_eq!(settings.sync.stale_after(), Duration::from_secs(2 * 3600));
        assert_eq!(settings.sync.poll_interval(), Duration::from_secs(300));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(
            &path,
            "daemon:\n  port: 6000\n  io_timeout_secs: 0\nsync:\n  server: 10.0.0.5:6000\n  respawn: true\n",
        )
        .unwrap();

        let settings = Settings::load_at(&path).unwrap();
        assert_eq!(settings.daemon.port, 6000);
        assert_eq!(settings.daemon.host, DEFAULT_HOST);
        assert_eq!(settings.daemon.io_timeout(), None);
        assert_eq!(settings.sync.server, "10.0.0.5:6000");
        assert_eq!(settings.sync.restart_policy().mode, RestartMode::Respawn);
        assert_eq!(settings.sync.stale_after_hours, 2);
    }

    #[test]
    fn invalid_yaml_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "daemon: [unterminated").unwrap();
        match Settings::load_at(&path) {
            Err(CoreError::Settings { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected settings error, got {other:?}"),
        }
    }
}
