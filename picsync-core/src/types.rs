//! Domain types shared by the transfer daemon and the sync poller.
//!
//! Remote paths stay `String`: they are server-local paths passed through
//! verbatim and may use another platform's separators. Local paths are
//! always `PathBuf`.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::timefmt;

/// Maximum number of candidate paths a work item carries.
pub const MAX_ITEM_PATHS: usize = 8;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a work item, as produced by the upstream query layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Integer-looking ids compare numerically (`"9" < "10"`) and sort before
/// every other id; the rest compare in byte order.
impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        let numeric = |id: &ItemId| id.0.parse::<u128>().ok();
        match (numeric(self), numeric(other)) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Position of the last fully processed work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cursor {
    pub order_time: NaiveDateTime,
    pub id: ItemId,
}

impl Cursor {
    pub fn new(order_time: NaiveDateTime, id: impl Into<ItemId>) -> Self {
        Self {
            order_time,
            id: id.into(),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", timefmt::format(&self.order_time), self.id)
    }
}

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// A record naming up to [`MAX_ITEM_PATHS`] server-side files to download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    #[serde(with = "timefmt::required")]
    pub order_time: NaiveDateTime,
    #[serde(default)]
    pub paths: Vec<Option<String>>,
}

impl WorkItem {
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.order_time, self.id.clone())
    }

    /// True when this item sorts strictly after `cursor`.
    pub fn is_after(&self, cursor: Option<&Cursor>) -> bool {
        match cursor {
            None => true,
            Some(cursor) => self.cursor() > *cursor,
        }
    }

    /// Non-blank candidate paths, trimmed, in column order.
    ///
    /// Only the first [`MAX_ITEM_PATHS`] slots are considered.
    pub fn remote_paths(&self) -> impl Iterator<Item = &str> {
        self.paths
            .iter()
            .take(MAX_ITEM_PATHS)
            .filter_map(|p| p.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Sort items into fetch order: `(order_time, id)` ascending.
pub fn sort_items(items: &mut [WorkItem]) {
    items.sort_by(|a, b| a.cursor().cmp(&b.cursor()));
}
