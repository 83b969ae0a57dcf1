//! Work-item sources: the query capability the poller consumes.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use picsync_core::types::sort_items;
use picsync_core::{Cursor, WorkItem};

use crate::error::SourceError;

/// Yields work items strictly after a cursor, in `(order_time, id)` order.
#[async_trait]
pub trait WorkSource: Send + Sync {
    async fn fetch_after(&self, cursor: Option<&Cursor>) -> Result<Vec<WorkItem>, SourceError>;

    /// Human-readable origin, for log messages.
    fn describe(&self) -> String;
}

/// Keep the items strictly after `cursor`, sorted into fetch order.
pub fn select_after(
    items: impl IntoIterator<Item = WorkItem>,
    cursor: Option<&Cursor>,
) -> Vec<WorkItem> {
    let mut selected: Vec<WorkItem> = items
        .into_iter()
        .filter(|item| item.is_after(cursor))
        .collect();
    sort_items(&mut selected);
    selected
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

/// A JSON array of work items, re-read on every poll.
///
/// ```json
/// [{"id": "17", "order_time": "2025-11-02 08:15:00",
///   "paths": ["D:\\images\\tare\\17_1.jpg", null]}]
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl WorkSource for JsonFileSource {
    async fn fetch_after(&self, cursor: Option<&Cursor>) -> Result<Vec<WorkItem>, SourceError> {
        let contents =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| SourceError::Io {
                    path: self.path.clone(),
                    source,
                })?;
        let items: Vec<WorkItem> =
            serde_json::from_str(&contents).map_err(|source| SourceError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(select_after(items, cursor))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemorySource {
    items: Mutex<Vec<WorkItem>>,
}

impl MemorySource {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }

    pub fn push(&self, item: WorkItem) {
        self.items
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(item);
    }
}

#[async_trait]
impl WorkSource for MemorySource {
    async fn fetch_after(&self, cursor: Option<&Cursor>) -> Result<Vec<WorkItem>, SourceError> {
        let items = self
            .items
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        Ok(select_after(items, cursor))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
