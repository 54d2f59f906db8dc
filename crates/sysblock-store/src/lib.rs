//! Persistence layer for sysblockd
//!
//! Provides:
//! - Namespaced key-value storage (rule text, penalty records, session
//!   tickets, freeze rules)
//! - Atomic read-modify-write transactions
//! - Change notifications so caches can refresh reactively
//! - Audit log (append-only)

mod audit;
mod sqlite;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for sysblock_util::SysblockError {
    fn from(e: StoreError) -> Self {
        sysblock_util::SysblockError::store(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
