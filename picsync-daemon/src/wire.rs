//! TCP wire format for single-file requests.
//!
//! # Wire format
//!
//! ```text
//! REQUEST (Client -> Daemon):
//!   [4 bytes BE: path_len]
//!   [path_len bytes: server-local path UTF-8]
//!
//! RESPONSE (Daemon -> Client):
//!   [4 bytes BE: name_len]
//!   [name_len bytes: file name UTF-8]      (absent when name_len == 0)
//!   [8 bytes BE: size]
//!   [size bytes: raw file data]            (absent when size == 0)
//!
//! NOT FOUND: name_len = 0, size = 0, nothing else.
//! ```
//!
//! Paths and names longer than [`MAX_FIELD_LEN`] are rejected on both
//! sides as protocol errors.
//!
//! No padding, checksum or version tag. One request per connection; the
//! connection is closed after the response.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WireError;

/// Width of the path / name length prefix.
pub const LEN_PREFIX_BYTES: usize = 4;

/// Width of the size field.
pub const SIZE_BYTES: usize = 8;

/// Longest path or file name either side will accept. Checked before the
/// field buffer is allocated.
pub const MAX_FIELD_LEN: usize = 64 * 1024;

/// Header of a found file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    /// Base name of the served file.
    pub name: String,
    /// Exact payload length in bytes.
    pub size: u64,
}

/// Decoded daemon response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Found(TransferHeader),
    NotFound,
}

fn encode_len(field: &'static str, len: usize) -> Result<[u8; LEN_PREFIX_BYTES], WireError> {
    check_len(field, len)?;
    Ok((len as u32).to_be_bytes())
}

fn check_len(field: &'static str, len: usize) -> Result<(), WireError> {
    if len > MAX_FIELD_LEN {
        return Err(WireError::Protocol(format!(
            "{field} too long: {len} bytes (max {MAX_FIELD_LEN})"
        )));
    }
    Ok(())
}

/// Encode a request: length prefix then path bytes.
pub fn encode_request(path: &str) -> Result<Vec<u8>, WireError> {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(LEN_PREFIX_BYTES + bytes.len());
    out.extend_from_slice(&encode_len("path", bytes.len())?);
    out.extend_from_slice(bytes);
    Ok(out)
}

/// Encode a found-file header.
///
/// An empty name would be read back as the not-found sentinel, so it is
/// rejected here.
pub fn encode_header(name: &str, size: u64) -> Result<Vec<u8>, WireError> {
    if name.is_empty() {
        return Err(WireError::Protocol(
            "file name must not be empty".to_string(),
        ));
    }
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(LEN_PREFIX_BYTES + bytes.len() + SIZE_BYTES);
    out.extend_from_slice(&encode_len("name", bytes.len())?);
    out.extend_from_slice(bytes);
    out.extend_from_slice(&size.to_be_bytes());
    Ok(out)
}

/// The not-found sentinel: zero name length followed by a zero size.
pub fn encode_not_found() -> [u8; LEN_PREFIX_BYTES + SIZE_BYTES] {
    [0u8; LEN_PREFIX_BYTES + SIZE_BYTES]
}

pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    path: &str,
) -> Result<(), WireError> {
    writer.write_all(&encode_request(path)?).await?;
    writer.flush().await?;
    Ok(())
}

/// Write the response header, or the sentinel when `header` is `None`.
pub async fn write_header<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: Option<&TransferHeader>,
) -> Result<(), WireError> {
    match header {
        Some(header) => {
            writer
                .write_all(&encode_header(&header.name, header.size)?)
                .await?
        }
        None => writer.write_all(&encode_not_found()).await?,
    }
    writer.flush().await?;
    Ok(())
}

/// Read a request.
///
/// Returns `Ok(None)` when the peer closes before sending a single byte:
/// a client that connected and left without asking for anything.
pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<String>, WireError> {
    let mut len_buf = [0u8; LEN_PREFIX_BYTES];
    let got = read_up_to(reader, &mut len_buf).await?;
    if got == 0 {
        return Ok(None);
    }
    if got < LEN_PREFIX_BYTES {
        return Err(WireError::Truncated {
            field: "path length",
        });
    }

    let path_len = u32::from_be_bytes(len_buf) as usize;
    check_len("path", path_len)?;
    let mut path_buf = vec![0u8; path_len];
    read_field(reader, &mut path_buf, "path").await?;
    String::from_utf8(path_buf)
        .map(Some)
        .map_err(|e| WireError::Protocol(format!("invalid UTF-8 path: {e}")))
}

/// Read a response header.
///
/// The size field is always consumed, including after the sentinel, so the
/// stream stays aligned with what the daemon wrote.
pub async fn read_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Response, WireError> {
    let mut len_buf = [0u8; LEN_PREFIX_BYTES];
    read_field(reader, &mut len_buf, "name length").await?;
    let name_len = u32::from_be_bytes(len_buf) as usize;
    check_len("name", name_len)?;

    let name = if name_len == 0 {
        None
    } else {
        let mut name_buf = vec![0u8; name_len];
        read_field(reader, &mut name_buf, "name").await?;
        Some(
            String::from_utf8(name_buf)
                .map_err(|e| WireError::Protocol(format!("invalid UTF-8 file name: {e}")))?,
        )
    };

    let mut size_buf = [0u8; SIZE_BYTES];
    read_field(reader, &mut size_buf, "size").await?;
    let size = u64::from_be_bytes(size_buf);

    Ok(match name {
        Some(name) => Response::Found(TransferHeader { name, size }),
        None => Response::NotFound,
    })
}

/// `read_exact` that reports a short read as a truncated field.
async fn read_field<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    field: &'static str,
) -> Result<(), WireError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(WireError::Truncated { field }),
        Err(err) => Err(err.into()),
    }
}

/// Fill `buf` until it is full or the peer closes; returns bytes read.
async fn read_up_to<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<usize, WireError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Run `fut` under an optional deadline.
pub async fn with_deadline<T, F>(
    limit: Option<Duration>,
    phase: &'static str,
    fut: F,
) -> Result<T, WireError>
where
    F: std::future::Future<Output = Result<T, WireError>>,
{
    match limit {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| WireError::TimedOut { phase })?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_big_endian_without_padding() {
        let bytes = encode_header("a.png", 258).unwrap();
        assert_eq!(
            bytes,
            vec![0, 0, 0, 5, b'a', b'.', b'p', b'n', b'g', 0, 0, 0, 0, 0, 0, 1, 2]
        );
    }

    #[test]
    fn not_found_is_twelve_zero_bytes() {
        assert_eq!(encode_not_found(), [0u8; 12]);
    }

    #[test]
    fn empty_name_cannot_be_encoded() {
        assert!(matches!(encode_header("", 1), Err(WireError::Protocol(_))));
    }

    #[tokio::test]
    async fn header_roundtrip() {
        let header = TransferHeader {
            name: "capture_01.jpg".into(),
            size: 1_048_576,
        };
        let mut buf = Vec::new();
        write_header(&mut buf, Some(&header)).await.unwrap();

        let mut cursor = &buf[..];
        assert_eq!(read_header(&mut cursor).await.unwrap(), Response::Found(header));
        assert!(cursor.is_empty());
    }

    #[tokio::test]
    async fn sentinel_consumes_size_field() {
        let mut buf = Vec::new();
        write_header(&mut buf, None).await.unwrap();
        buf.extend_from_slice(b"next");

        let mut cursor = &buf[..];
        assert_eq!(read_header(&mut cursor).await.unwrap(), Response::NotFound);
        assert_eq!(cursor, b"next");
    }

    #[tokio::test]
    async fn truncated_header_fields_are_protocol_errors() {
        let full = encode_header("report.pdf", 99).unwrap();
        for (cut, field) in [(2, "name length"), (7, "name"), (16, "size")] {
            let mut cursor = &full[..cut];
            match read_header(&mut cursor).await {
                Err(WireError::Truncated { field: got }) => assert_eq!(got, field),
                other => panic!("cut at {cut}: expected truncation, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn sentinel_without_size_is_truncated() {
        let mut cursor: &[u8] = &[0, 0, 0, 0, 0, 0];
        assert!(matches!(
            read_header(&mut cursor).await,
            Err(WireError::Truncated { field: "size" })
        ));
    }

    #[tokio::test]
    async fn request_roundtrip() {
        let mut buf = Vec::new();
        write_request(&mut buf, "D:/AlarmCaptures/17/1.png").await.unwrap();
        let mut cursor = &buf[..];
        assert_eq!(
            read_request(&mut cursor).await.unwrap().as_deref(),
            Some("D:/AlarmCaptures/17/1.png")
        );
    }

    #[tokio::test]
    async fn immediate_close_is_not_a_request() {
        let mut cursor: &[u8] = &[];
        assert_eq!(read_request(&mut cursor).await.unwrap(), None);
    }

    #[tokio::test]
    async fn partial_length_prefix_is_truncated() {
        let mut cursor: &[u8] = &[0, 0];
        assert!(matches!(
            read_request(&mut cursor).await,
            Err(WireError::Truncated {
                field: "path length"
            })
        ));
    }

    #[tokio::test]
    async fn short_path_is_truncated() {
        let mut cursor: &[u8] = &[0, 0, 0, 9, b'/', b't'];
        assert!(matches!(
            read_request(&mut cursor).await,
            Err(WireError::Truncated { field: "path" })
        ));
    }

    #[tokio::test]
    async fn oversize_length_prefixes_are_rejected_before_reading() {
        let mut cursor: &[u8] = &[0xff, 0xff, 0xff, 0xff, b'/'];
        assert!(matches!(
            read_request(&mut cursor).await,
            Err(WireError::Protocol(_))
        ));
        assert_eq!(cursor, b"/");

        let mut cursor: &[u8] = &[0xff, 0xff, 0xff, 0xff, b'a'];
        assert!(matches!(
            read_header(&mut cursor).await,
            Err(WireError::Protocol(_))
        ));
    }

    #[test]
    fn oversize_fields_cannot_be_encoded() {
        let long = "a".repeat(MAX_FIELD_LEN + 1);
        assert!(matches!(encode_request(&long), Err(WireError::Protocol(_))));
        assert!(matches!(encode_header(&long, 1), Err(WireError::Protocol(_))));
        assert!(encode_request(&"a".repeat(MAX_FIELD_LEN)).is_ok());
    }

    #[tokio::test]
    async fn invalid_utf8_path_is_rejected() {
        let mut cursor: &[u8] = &[0, 0, 0, 2, 0xff, 0xfe];
        assert!(matches!(
            read_request(&mut cursor).await,
            Err(WireError::Protocol(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_reports_phase() {
        let result: Result<(), WireError> = with_deadline(
            Some(Duration::from_secs(1)),
            "request",
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(WireError::TimedOut { phase: "request" })));
    }
}
