//! Single-file transfer client.
//!
//! One connection per file: send the path, read the header, then stream
//! exactly `size` bytes into the destination directory. The payload lands
//! in a hidden `.<name>.part` file first and is renamed into place only
//! after the last byte arrives, so an interrupted transfer never leaves a
//! file under the final name.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{is_disconnect, TransferError, WireError};
use crate::server::CHUNK_SIZE;
use crate::wire::{self, Response};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Option<Duration>,
    /// Applied to each individual read or write, not the whole transfer.
    pub io_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            io_timeout: Some(DEFAULT_IO_TIMEOUT),
        }
    }
}

impl ClientOptions {
    pub fn with_io_timeout(io_timeout: Option<Duration>) -> Self {
        Self {
            io_timeout,
            ..Self::default()
        }
    }
}

/// Request `remote_path` from the daemon at `addr` and save it under
/// `dest_dir` using the server-supplied name.
///
/// Returns the final local path on success. `TransferError::NotFound`
/// means the daemon had nothing readable at that path; no local file is
/// created in that case.
pub async fn request_file(
    addr: &str,
    remote_path: &str,
    dest_dir: &Path,
    options: &ClientOptions,
) -> Result<PathBuf, TransferError> {
    tracing::debug!(addr = %addr, "connecting to transfer daemon");
    let connect = TcpStream::connect(addr);
    let connected = match options.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| WireError::TimedOut { phase: "connect" })?,
        None => connect.await,
    };
    let stream = connected.map_err(|source| TransferError::Connect {
        addr: addr.to_string(),
        source,
    })?;

    receive_file(stream, remote_path, dest_dir, options).await
}

/// Run the client side of one transfer over an established stream.
pub async fn receive_file<T>(
    mut stream: T,
    remote_path: &str,
    dest_dir: &Path,
    options: &ClientOptions,
) -> Result<PathBuf, TransferError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = options.io_timeout;
    wire::with_deadline(deadline, "request", wire::write_request(&mut stream, remote_path))
        .await?;

    let header = match wire::with_deadline(deadline, "header", wire::read_header(&mut stream)).await
    {
        Ok(Response::Found(header)) => header,
        Ok(Response::NotFound) => {
            tracing::info!(path = %remote_path, "server reported file not found");
            return Err(TransferError::NotFound {
                path: remote_path.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    let name = safe_file_name(&header.name)?;
    let final_path = dest_dir.join(name);
    let part_path = dest_dir.join(format!(".{name}.part"));
    tracing::info!(name = %name, bytes = header.size, "receiving file");

    if let Err(err) = download_payload(&mut stream, header.size, &part_path, deadline).await {
        let _ = tokio::fs::remove_file(&part_path).await;
        return Err(err);
    }

    tokio::fs::rename(&part_path, &final_path)
        .await
        .map_err(|source| TransferError::Filesystem {
            path: final_path.clone(),
            source,
        })?;
    tracing::info!(path = %final_path.display(), bytes = header.size, "file received");
    Ok(final_path)
}

/// Accept only a bare file name from the server; anything that could
/// escape `dest_dir` is a protocol error.
fn safe_file_name(name: &str) -> Result<&str, TransferError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(WireError::Protocol(format!("unsafe file name from server: {name:?}")).into());
    }
    Ok(name)
}

async fn download_payload<R>(
    stream: &mut R,
    size: u64,
    part_path: &Path,
    deadline: Option<Duration>,
) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin,
{
    let fs_err = |source| TransferError::Filesystem {
        path: part_path.to_path_buf(),
        source,
    };

    let mut out = File::create(part_path).await.map_err(fs_err)?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received = 0u64;

    while received < size {
        let want = (size - received).min(buf.len() as u64) as usize;
        let chunk = &mut buf[..want];
        let read = wire::with_deadline(deadline, "payload", async {
            stream.read(chunk).await.map_err(WireError::from)
        })
        .await;
        let n = match read {
            Ok(0) => {
                return Err(TransferError::ConnectionLost {
                    received,
                    expected: size,
                })
            }
            Ok(n) => n,
            Err(WireError::Io(err)) if is_disconnect(&err) => {
                return Err(TransferError::ConnectionLost {
                    received,
                    expected: size,
                })
            }
            Err(err) => return Err(err.into()),
        };
        out.write_all(&buf[..n]).await.map_err(fs_err)?;
        received += n as u64;
    }

    out.flush().await.map_err(fs_err)?;
    out.sync_all().await.map_err(fs_err)?;
    Ok(())
}
