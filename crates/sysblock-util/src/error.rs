//! Error types for sysblockd

use thiserror::Error;

use crate::PackageId;

/// Core error type for sysblockd operations
#[derive(Debug, Error)]
pub enum SysblockError {
    #[error("No rule for package: {0}")]
    NoRule(PackageId),

    #[error("Invalid session duration: {0}s")]
    InvalidDuration(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error on line {line}: {message}")]
    ValidationError { line: usize, message: String },

    #[error("Line {line} is frozen and cannot be edited right now")]
    FrozenLine { line: usize },

    #[error("Freeze rule error: {0}")]
    FreezeError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Host error: {0}")]
    HostError(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SysblockError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn validation(line: usize, msg: impl Into<String>) -> Self {
        Self::ValidationError {
            line,
            message: msg.into(),
        }
    }

    pub fn freeze(msg: impl Into<String>) -> Self {
        Self::FreezeError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn host(msg: impl Into<String>) -> Self {
        Self::HostError(msg.into())
    }

    pub fn ipc(msg: impl Into<String>) -> Self {
        Self::IpcError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SysblockError>;
