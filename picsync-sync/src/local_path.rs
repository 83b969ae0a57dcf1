//! Mapping of server-side paths onto the local mirror.

use std::path::{Path, PathBuf};

/// Local destination for `remote` under `local_root`.
///
/// The drive prefix (`D:`) and leading separators are dropped and the rest
/// of the remote directory structure is recreated under the root. Both `/`
/// and `\` separate components; empty, `.` and `..` components are
/// discarded so the result never leaves `local_root`. Returns `None` when
/// nothing remains.
pub fn local_path_for(local_root: &Path, remote: &str) -> Option<PathBuf> {
    let trimmed = strip_drive(remote.trim());
    let mut components = trimmed
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != "." && *c != "..")
        .peekable();
    components.peek()?;

    let mut local = local_root.to_path_buf();
    local.extend(components);
    Some(local)
}

fn strip_drive(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        &path[2..]
    } else {
        path
    }
}

/// True when `path` exists and has content; such paths are not re-fetched.
pub async fn is_present(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}
