//! Checkpoint stores: durable "last successful activity" records.
//!
//! Two record shapes are persisted as small JSON documents:
//!
//! ```text
//! server_progress.json  { "last_send_time": "YYYY-MM-DD HH:MM:SS" }
//! sync_progress.json    { "last_created_time": "…"|null, "last_task_id": "…"|null,
//!                         "last_download_time": "…" (optional) }
//! ```
//!
//! Writes use the atomic `.tmp` + rename pattern: a concurrent reader sees
//! either the old or the new document, never a torn one. Each store has a
//! single writer (the owning control loop), so no locking is needed.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::timefmt;
use crate::types::{Cursor, ItemId};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A checkpoint that carries a last-activity time for the watchdog.
pub trait ActivityRecord {
    fn last_activity(&self) -> Option<NaiveDateTime>;
}

/// Daemon-side record: time of the last fully sent file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCheckpoint {
    #[serde(with = "timefmt::required")]
    pub last_send_time: NaiveDateTime,
}

impl ActivityRecord for ServerCheckpoint {
    fn last_activity(&self) -> Option<NaiveDateTime> {
        Some(self.last_send_time)
    }
}

/// Poller-side record: resume cursor plus time of the last successful download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    #[serde(with = "timefmt::optional", default)]
    pub last_created_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_task_id: Option<String>,
    #[serde(
        with = "timefmt::optional",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_download_time: Option<NaiveDateTime>,
}

impl SyncCheckpoint {
    /// Resume position, if any item has been processed yet.
    ///
    /// A record with a time but no task id resumes from id `"0"`.
    pub fn cursor(&self) -> Option<Cursor> {
        let order_time = self.last_created_time?;
        let id = self.last_task_id.clone().unwrap_or_else(|| "0".to_string());
        Some(Cursor::new(order_time, ItemId(id)))
    }

    /// Move the cursor, keeping the recorded download time.
    pub fn advance_to(&mut self, cursor: &Cursor) {
        self.last_created_time = Some(cursor.order_time);
        self.last_task_id = Some(cursor.id.0.clone());
    }
}

impl ActivityRecord for SyncCheckpoint {
    fn last_activity(&self) -> Option<NaiveDateTime> {
        self.last_download_time
    }
}

// ---------------------------------------------------------------------------
// Store interface
// ---------------------------------------------------------------------------

/// Load/save access to one checkpoint record.
pub trait CheckpointStore<T>: Send + Sync {
    /// Returns `Ok(None)` when nothing has been recorded yet.
    fn load(&self) -> Result<Option<T>, CoreError>;

    /// Replace the stored record.
    fn save(&self, value: &T) -> Result<(), CoreError>;

    /// Where the record lives, for log messages.
    fn describe(&self) -> String;
}

/// Load a checkpoint, treating an unreadable or corrupt record as absent.
///
/// The failure is logged; the caller proceeds as if starting fresh.
pub fn load_lenient<T, S>(store: &S) -> Option<T>
where
    S: CheckpointStore<T> + ?Sized,
{
    match store.load() {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(
                store = %store.describe(),
                error = %err,
                "ignoring unreadable checkpoint",
            );
            None
        }
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// Checkpoint persisted as a pretty-printed JSON file.
#[derive(Debug)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl<T> Clone for JsonFileStore<T> {
    fn clone(&self) -> Self {
        Self::new(self.path.clone())
    }
}

impl<T> CheckpointStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<T>, CoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&self.path, err)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| CoreError::Checkpoint {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, value: &T) -> Result<(), CoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let json = serde_json::to_string_pretty(value)?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store; nothing survives a restart of the process.
#[derive(Debug)]
pub struct MemoryStore<T> {
    value: Mutex<Option<T>>,
}

impl<T> MemoryStore<T> {
    pub fn new(initial: Option<T>) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T> CheckpointStore<T> for MemoryStore<T>
where
    T: Clone + Send,
{
    fn load(&self) -> Result<Option<T>, CoreError> {
        let guard = self.value.lock().unwrap_or_else(|p| p.into_inner());
        Ok(guard.clone())
    }

    fn save(&self, value: &T) -> Result<(), CoreError> {
        let mut guard = self.value.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(value.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 1)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
    }

    #[test]
    fn missing_file_loads_as_none() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::<ServerCheckpoint>::new(tmp.path().join("server_progress.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn server_checkpoint_file_shape() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("server_progress.json");
        let store = JsonFileStore::<ServerCheckpoint>::new(&path);
        store
            .save(&ServerCheckpoint {
                last_send_time: ts(9),
            })
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({ "last_send_time": "2025-11-01 09:30:00" })
        );
    }

    #[test]
    fn sync_checkpoint_omits_download_time_until_recorded() {
        let checkpoint = SyncCheckpoint {
            last_created_time: Some(ts(8)),
            last_task_id: Some("17".into()),
            last_download_time: None,
        };
        let raw = serde_json::to_value(&checkpoint).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({
                "last_created_time": "2025-11-01 08:30:00",
                "last_task_id": "17",
            })
        );
    }

    #[test]
    fn sync_checkpoint_accepts_nulls() {
        let json = r#"{"last_created_time": null, "last_task_id": null}"#;
        let checkpoint: SyncCheckpoint = serde_json::from_str(json).unwrap();
        assert_eq!(checkpoint, SyncCheckpoint::default());
        assert_eq!(checkpoint.cursor(), None);
        assert_eq!(checkpoint.last_activity(), None);
    }

    #[test]
    fn cursor_defaults_missing_task_id_to_zero() {
        let checkpoint = SyncCheckpoint {
            last_created_time: Some(ts(8)),
            ..SyncCheckpoint::default()
        };
        assert_eq!(checkpoint.cursor(), Some(Cursor::new(ts(8), "0")));
    }

    #[test]
    fn advance_keeps_download_time() {
        let mut checkpoint = SyncCheckpoint {
            last_download_time: Some(ts(7)),
            ..SyncCheckpoint::default()
        };
        checkpoint.advance_to(&Cursor::new(ts(8), "3"));
        assert_eq!(checkpoint.last_download_time, Some(ts(7)));
        assert_eq!(checkpoint.last_task_id.as_deref(), Some("3"));
    }

    #[test]
    fn save_overwrites_and_cleans_tmp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("sync_progress.json");
        let store = JsonFileStore::<SyncCheckpoint>::new(&path);

        let mut checkpoint = SyncCheckpoint::default();
        checkpoint.advance_to(&Cursor::new(ts(1), "1"));
        store.save(&checkpoint).unwrap();
        checkpoint.advance_to(&Cursor::new(ts(2), "2"));
        store.save(&checkpoint).unwrap();

        assert_eq!(store.load().unwrap(), Some(checkpoint));
        assert!(
            !tmp.path().join("nested").join("sync_progress.json.tmp").exists(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn corrupt_file_is_an_error_but_lenient_load_ignores_it() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("server_progress.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::<ServerCheckpoint>::new(&path);

        assert!(matches!(store.load(), Err(CoreError::Checkpoint { .. })));
        assert_eq!(load_lenient(&store), None);
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::default();
        assert_eq!(store.load().unwrap(), None);
        let checkpoint = ServerCheckpoint {
            last_send_time: ts(3),
        };
        store.save(&checkpoint).unwrap();
        assert_eq!(store.load().unwrap(), Some(checkpoint));
    }
}
