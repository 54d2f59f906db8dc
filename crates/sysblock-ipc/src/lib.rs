//! IPC layer for sysblockd
//!
//! Provides:
//! - Unix domain socket server
//! - NDJSON (newline-delimited JSON) protocol
//! - Client connection management
//! - Peer UID authentication (same user or root is the platform host)

mod client;
mod server;

pub use client::*;
pub use server::*;

use thiserror::Error;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Server error: {0}")]
    ServerError(String),

    /// The service answered with an error response
    #[error("Rejected ({:?}): {}", .0.code, .0.message)]
    Rejected(sysblock_api::ErrorInfo),
}

impl From<IpcError> for sysblock_util::SysblockError {
    fn from(e: IpcError) -> Self {
        sysblock_util::SysblockError::ipc(e.to_string())
    }
}

pub type IpcResult<T> = Result<T, IpcError>;
