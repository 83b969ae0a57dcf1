//! # picsync-sync
//!
//! Polls a work-item source and mirrors the files each item names from a
//! transfer daemon onto local disk, resuming from a persisted cursor.

pub mod error;
pub mod fetcher;
pub mod local_path;
pub mod poller;
pub mod source;

pub use error::{SourceError, SyncError};
pub use fetcher::{Fetcher, TcpFetcher};
pub use local_path::local_path_for;
pub use poller::{supervise, PollSummary, Poller, PollerOptions};
pub use source::{JsonFileSource, MemorySource, WorkSource};
