//! Transfer daemon: serves exactly one file per accepted connection.
//!
//! Per connection:
//!
//! ```text
//! AwaitPathLength -> AwaitPath -> CheckFile -> SendNotFound | SendHeaderAndStream -> Close
//! ```
//!
//! The accept loop is strictly sequential. A connection is handled to
//! completion before the next `accept`, so at most one transfer is in
//! flight and the checkpoint has a single writer. The watchdog is consulted
//! before every accept and on a periodic tick while idle.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use picsync_core::{
    timefmt, CheckpointStore, DaemonSettings, ServerCheckpoint, Supervisor, SupervisorExit,
    Watchdog, WatchdogTripped,
};

use crate::error::{io_err, DaemonError, WireError};
use crate::wire::{self, TransferHeader};

/// Payload is streamed from disk to socket in chunks of this size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// How often an idle daemon re-checks its watchdog while waiting in accept.
pub const WATCHDOG_TICK: Duration = Duration::from_secs(60);

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub stale_after: Duration,
    pub io_timeout: Option<Duration>,
    pub chunk_size: usize,
    pub watchdog_tick: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from_settings(&DaemonSettings::default())
    }
}

impl ServerOptions {
    pub fn from_settings(settings: &DaemonSettings) -> Self {
        Self {
            stale_after: settings.stale_after(),
            io_timeout: settings.io_timeout(),
            chunk_size: CHUNK_SIZE,
            watchdog_tick: WATCHDOG_TICK,
        }
    }
}

/// What happened on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Peer closed without sending a request.
    Abandoned,
    /// Path missing, not a regular file, or unreadable; sentinel sent.
    NotFound { path: String },
    /// Header and full payload sent.
    Sent { path: String, name: String, bytes: u64 },
}

/// A bound transfer daemon.
pub struct TransferServer<S> {
    listener: TcpListener,
    store: Arc<S>,
    options: ServerOptions,
    watchdog: Watchdog,
}

impl<S> TransferServer<S>
where
    S: CheckpointStore<ServerCheckpoint>,
{
    pub async fn bind(addr: &str, store: Arc<S>, options: ServerOptions) -> Result<Self, DaemonError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| io_err(format!("bind {addr}"), e))?;
        Ok(Self::from_listener(listener, store, options))
    }

    pub fn from_listener(listener: TcpListener, store: Arc<S>, options: ServerOptions) -> Self {
        let watchdog = Watchdog::new("daemon", options.stale_after);
        Self {
            listener,
            store,
            options,
            watchdog,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DaemonError> {
        self.listener
            .local_addr()
            .map_err(|e| io_err("listener address", e))
    }

    /// Serve connections until the watchdog trips.
    ///
    /// Errors returned here are not connection-level: they come from the
    /// checkpoint store and end this server instance.
    pub async fn run(self) -> Result<WatchdogTripped, DaemonError> {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "transfer daemon listening");
        }

        loop {
            if let Some(tripped) = self.watchdog.check(&*self.store) {
                return Ok(tripped);
            }

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.serve_connection(stream, peer).await?,
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
                _ = tokio::time::sleep(self.options.watchdog_tick) => {}
            }
        }
    }

    async fn serve_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), DaemonError> {
        tracing::info!(%peer, "client connected");

        match handle_connection(stream, &self.options).await {
            Ok(ConnectionOutcome::Abandoned) => {
                tracing::info!(%peer, "client closed without sending a path");
            }
            Ok(ConnectionOutcome::NotFound { path }) => {
                tracing::info!(%peer, path = %path, "sent not-found response");
            }
            Ok(ConnectionOutcome::Sent { path, name, bytes }) => {
                tracing::info!(%peer, path = %path, name = %name, bytes, "file sent");
                self.store.save(&ServerCheckpoint {
                    last_send_time: timefmt::now(),
                })?;
            }
            Err(err) => {
                tracing::warn!(%peer, error = %err, "transfer failed");
            }
        }

        tracing::info!(%peer, "client disconnected");
        Ok(())
    }
}

/// Run the per-connection state machine on any byte stream.
pub async fn handle_connection<T>(
    mut stream: T,
    options: &ServerOptions,
) -> Result<ConnectionOutcome, DaemonError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = options.io_timeout;
    let Some(path) = wire::with_deadline(deadline, "request", wire::read_request(&mut stream)).await?
    else {
        return Ok(ConnectionOutcome::Abandoned);
    };
    tracing::info!(path = %path, "client requested file");

    let Some(source) = open_readable(&path).await else {
        wire::with_deadline(deadline, "header", wire::write_header(&mut stream, None)).await?;
        let _ = stream.shutdown().await;
        return Ok(ConnectionOutcome::NotFound { path });
    };

    let header = TransferHeader {
        name: source.name.clone(),
        size: source.size,
    };
    wire::with_deadline(deadline, "header", wire::write_header(&mut stream, Some(&header))).await?;
    tracing::info!(path = %path, bytes = source.size, "sending file");

    let sent = stream_file(source.file, source.size, &mut stream, options).await?;
    if sent != source.size {
        return Err(DaemonError::ShortSend {
            path: PathBuf::from(&path),
            sent,
            expected: source.size,
        });
    }
    let _ = stream.shutdown().await;

    Ok(ConnectionOutcome::Sent {
        path,
        name: source.name,
        bytes: sent,
    })
}

struct ReadableFile {
    file: File,
    name: String,
    size: u64,
}

/// Open `path` exactly as given if it is a regular, readable file.
///
/// Missing, non-regular and unreadable paths all return `None`; the client
/// sees the same sentinel for each.
async fn open_readable(path: &str) -> Option<ReadableFile> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(err) => {
            tracing::info!(path = %path, error = %err, "file does not exist");
            return None;
        }
    };
    if !meta.is_file() {
        tracing::info!(path = %path, "not a regular file");
        return None;
    }

    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            tracing::info!(path = %path, error = %err, "no read permission");
            return None;
        }
    };

    let name = Path::new(path).file_name()?.to_str()?.to_string();
    Some(ReadableFile {
        file,
        name,
        size: meta.len(),
    })
}

/// Copy at most `size` bytes of `file` to `stream`; returns bytes sent.
async fn stream_file<W>(
    file: File,
    size: u64,
    stream: &mut W,
    options: &ServerOptions,
) -> Result<u64, DaemonError>
where
    W: AsyncWrite + Unpin,
{
    let mut reader = file.take(size);
    let mut buf = vec![0u8; options.chunk_size.max(1)];
    let mut sent = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| io_err("read source file", e))?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        wire::with_deadline(options.io_timeout, "payload", async {
            stream.write_all(chunk).await.map_err(WireError::from)
        })
        .await?;
        sent += n as u64;
    }

    wire::with_deadline(options.io_timeout, "payload", async {
        stream.flush().await.map_err(WireError::from)
    })
    .await?;
    Ok(sent)
}

/// Bind the daemon and keep it running under supervision.
///
/// The first bind happens before supervision starts, so a startup failure
/// (address in use, bad host) is returned to the caller. Later instances
/// are rebuilt from scratch after each watchdog trip or failure.
pub async fn serve<S, F>(
    settings: &DaemonSettings,
    store: Arc<S>,
    shutdown: F,
) -> Result<SupervisorExit, DaemonError>
where
    S: CheckpointStore<ServerCheckpoint>,
    F: Future<Output = ()>,
{
    let addr = settings.bind_addr();
    let options = ServerOptions::from_settings(settings);
    let mut ready = Some(TransferServer::bind(&addr, store.clone(), options.clone()).await?);

    let supervisor = Supervisor::new("daemon", settings.restart_policy());
    let exit = supervisor
        .run(
            move || {
                let ready = ready.take();
                let addr = addr.clone();
                let store = store.clone();
                let options = options.clone();
                async move {
                    let server = match ready {
                        Some(server) => server,
                        None => TransferServer::bind(&addr, store, options).await?,
                    };
                    server.run().await
                }
            },
            shutdown,
        )
        .await?;
    Ok(exit)
}
