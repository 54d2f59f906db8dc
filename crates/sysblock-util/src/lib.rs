//! Shared utilities for sysblockd
//!
//! This crate provides:
//! - ID types (PackageId, ClientId)
//! - Clock utilities (mock time, minute-of-day, daily windows)
//! - Error types
//! - Rate limiting helpers
//! - Default paths for socket, data, and settings files

mod error;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
