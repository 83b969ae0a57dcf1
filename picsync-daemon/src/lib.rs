//! Single-file TCP transfer: wire codec, sequential daemon and client.

pub mod client;
mod error;
pub mod server;
pub mod wire;

pub use client::{request_file, ClientOptions};
pub use error::{DaemonError, TransferError, WireError};
pub use server::{serve, ConnectionOutcome, ServerOptions, TransferServer, CHUNK_SIZE};
pub use wire::{Response, TransferHeader};
