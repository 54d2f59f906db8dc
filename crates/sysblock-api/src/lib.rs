//! Data contracts for sysblockd
//!
//! This crate defines what crosses the boundary between the enforcement
//! service and the platform shim that feeds it:
//! - Foreground-change events and the other collaborator payloads
//! - Freeze rules in their persisted shape
//! - Commands and responses
//! - Events (host directives pushed to subscribers)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
