//! Configuration for sysblockd
//!
//! Two layers live here:
//! - The rule language: a line-oriented, pipe-delimited text the user
//!   edits. [`parse_rules`] is permissive and always yields a snapshot;
//!   [`validate_rules`] is the strict gate applied before a save.
//! - Daemon settings: an optional TOML file with paths and timings.

mod defaults;
mod duration;
mod parser;
mod policy;
mod schema;
mod settings;
mod validation;

pub use defaults::*;
pub use duration::*;
pub use parser::*;
pub use policy::*;
pub use schema::*;
pub use settings::*;
pub use validation::*;

use thiserror::Error;

/// Errors loading daemon settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
