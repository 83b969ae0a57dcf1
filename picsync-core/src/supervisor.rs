//! Restart supervision for the long-running loops.
//!
//! The daemon and the poller each run inside a [`Supervisor`]. Whenever the
//! inner loop ends, because its watchdog tripped or an error escaped it,
//! the supervisor waits a fixed delay and then either builds a fresh
//! component in-process or hands over to a freshly spawned copy of the
//! executable. Shutdown (Ctrl-C) ends supervision cleanly from either wait.

use std::ffi::OsString;
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{io_err, CoreError};
use crate::watchdog::WatchdogTripped;

/// Default wait between a component ending and its replacement starting.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(10);

/// How a stale or failed component is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartMode {
    /// Rebuild the component inside the current process.
    #[default]
    InProcess,
    /// Spawn a fresh copy of the current executable, then let this one exit.
    Respawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub delay: Duration,
    pub mode: RestartMode,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RESTART_DELAY,
            mode: RestartMode::InProcess,
        }
    }
}

/// Why supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Shutdown was requested.
    Stopped,
    /// A replacement process was started; the caller should exit 0.
    Respawned { pid: u32 },
}

pub struct Supervisor {
    label: &'static str,
    policy: RestartPolicy,
}

impl Supervisor {
    pub fn new(label: &'static str, policy: RestartPolicy) -> Self {
        Self { label, policy }
    }

    /// Run components produced by `factory` until `shutdown` resolves.
    ///
    /// Each component future runs until its watchdog trips (`Ok`) or it
    /// fails (`Err`); either way it is replaced after the restart delay.
    pub async fn run<F, Fut, E, S>(
        &self,
        mut factory: F,
        shutdown: S,
    ) -> Result<SupervisorExit, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<WatchdogTripped, E>>,
        E: Display,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut generation: u64 = 0;

        loop {
            generation += 1;
            tracing::info!(component = self.label, generation, "starting component");

            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => return Ok(self.stopped()),
                outcome = factory() => outcome,
            };

            match outcome {
                Ok(tripped) => tracing::warn!(
                    component = self.label,
                    idle_secs = tripped.idle.as_secs(),
                    threshold_secs = tripped.threshold.as_secs(),
                    "component stale",
                ),
                Err(err) => tracing::error!(
                    component = self.label,
                    error = %err,
                    "component loop failed",
                ),
            }

            tracing::info!(
                component = self.label,
                delay_secs = self.policy.delay.as_secs(),
                "waiting before restart",
            );
            tokio::select! {
                biased;
                _ = &mut shutdown => return Ok(self.stopped()),
                _ = tokio::time::sleep(self.policy.delay) => {}
            }

            if self.policy.mode == RestartMode::Respawn {
                match respawn_current_process() {
                    Ok(pid) => {
                        tracing::info!(component = self.label, pid, "replacement process started");
                        return Ok(SupervisorExit::Respawned { pid });
                    }
                    Err(err) => tracing::error!(
                        component = self.label,
                        error = %err,
                        "respawn failed, restarting in-process",
                    ),
                }
            }
        }
    }

    fn stopped(&self) -> SupervisorExit {
        tracing::info!(component = self.label, "shutdown requested");
        SupervisorExit::Stopped
    }
}

// ---------------------------------------------------------------------------
// Respawn
// ---------------------------------------------------------------------------

#[cfg(windows)]
const ESSENTIAL_PATHS: &[&str] = &[
    r"C:\Windows\system32",
    r"C:\Windows",
    r"C:\Windows\System32\Wbem",
];

#[cfg(not(windows))]
const ESSENTIAL_PATHS: &[&str] = &[
    "/usr/local/sbin",
    "/usr/local/bin",
    "/usr/sbin",
    "/usr/bin",
    "/sbin",
    "/bin",
];

/// Start a fresh copy of the current executable with the same arguments.
///
/// The child inherits the environment except `PATH`, which is rebuilt from
/// scratch so repeated restarts cannot accumulate entries.
pub fn respawn_current_process() -> Result<u32, CoreError> {
    let program = std::env::current_exe().map_err(|e| io_err("current_exe", e))?;
    let essentials: Vec<PathBuf> = ESSENTIAL_PATHS.iter().map(PathBuf::from).collect();
    let env = sanitized_env(std::env::vars_os(), program.parent(), &essentials);

    let child = std::process::Command::new(&program)
        .args(std::env::args_os().skip(1))
        .env_clear()
        .envs(env)
        .spawn()
        .map_err(|source| CoreError::Respawn {
            program: program.clone(),
            source,
        })?;
    Ok(child.id())
}

/// Copy `vars`, replacing `PATH` with the executable's directory followed by
/// the existing essential directories, deduplicated.
pub fn sanitized_env(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
    exe_dir: Option<&Path>,
    essentials: &[PathBuf],
) -> Vec<(OsString, OsString)> {
    let mut env: Vec<(OsString, OsString)> = vars
        .into_iter()
        .filter(|(key, _)| !key.eq_ignore_ascii_case("PATH"))
        .collect();

    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in exe_dir.into_iter().map(Path::to_path_buf).chain(essentials.iter().cloned()) {
        if dir.is_dir() && !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    if let Ok(path) = std::env::join_paths(&dirs) {
        env.push(("PATH".into(), path));
    }
    env
}
