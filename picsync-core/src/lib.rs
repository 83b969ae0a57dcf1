//! Shared building blocks for the picsync daemon and poller.
//!
//! - [`types`]: work items, item ids and the resume cursor
//! - [`checkpoint`]: durable last-activity records and their stores
//! - [`watchdog`]: staleness detection
//! - [`supervisor`]: restart loop around the daemon and the poller
//! - [`settings`] / [`paths`]: configuration and default locations

pub mod checkpoint;
pub mod error;
pub mod paths;
pub mod settings;
pub mod supervisor;
pub mod timefmt;
pub mod types;
pub mod watchdog;

pub use checkpoint::{
    load_lenient, ActivityRecord, CheckpointStore, JsonFileStore, MemoryStore, ServerCheckpoint,
    SyncCheckpoint,
};
pub use error::CoreError;
pub use settings::{DaemonSettings, Settings, SyncSettings};
pub use supervisor::{RestartMode, RestartPolicy, Supervisor, SupervisorExit};
pub use types::{Cursor, ItemId, WorkItem};
pub use watchdog::{should_restart, Watchdog, WatchdogTripped};
