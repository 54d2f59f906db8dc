//! Daemon settings file (TOML)
//!
//! Separate from the rule text: these describe where the service lives and
//! how fast it polls, not what it enforces.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{ConfigError, ConfigResult};

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 200;
pub const DEFAULT_WARNING_THRESHOLD_SECS: u64 = 15;
pub const DEFAULT_SELF_PACKAGE: &str = "com.self.sysblock";
pub const DEFAULT_SELF_NAME: &str = "sysblock";

/// Settings as written in the file; everything optional
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawDaemonSettings {
    pub socket_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub tick_interval_ms: Option<u64>,
    pub warning_threshold_secs: Option<u64>,
    /// Package id of the enforcement app itself
    pub self_package: Option<String>,
    /// Display name of the enforcement app, matched in on-screen text
    pub self_name: Option<String>,
}

/// Resolved settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
    pub warning_threshold: Duration,
    pub self_package: String,
    pub self_name: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self::from_raw(RawDaemonSettings::default())
    }
}

impl DaemonSettings {
    pub fn from_raw(raw: RawDaemonSettings) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(sysblock_util::default_socket_path),
            data_dir: raw
                .data_dir
                .unwrap_or_else(sysblock_util::default_data_dir),
            tick_interval: Duration::from_millis(
                raw.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            ),
            warning_threshold: Duration::from_secs(
                raw.warning_threshold_secs
                    .unwrap_or(DEFAULT_WARNING_THRESHOLD_SECS),
            ),
            self_package: raw
                .self_package
                .unwrap_or_else(|| DEFAULT_SELF_PACKAGE.to_string()),
            self_name: raw
                .self_name
                .unwrap_or_else(|| DEFAULT_SELF_NAME.to_string()),
        }
    }
}

/// Parse settings from TOML text
pub fn parse_settings(content: &str) -> ConfigResult<DaemonSettings> {
    let raw: RawDaemonSettings = toml::from_str(content)?;

    if raw.tick_interval_ms == Some(0) {
        return Err(ConfigError::Invalid("tick_interval_ms must be positive".into()));
    }
    if matches!(raw.self_package.as_deref(), Some("")) {
        return Err(ConfigError::Invalid("self_package cannot be empty".into()));
    }
    if matches!(raw.self_name.as_deref(), Some("")) {
        return Err(ConfigError::Invalid("self_name cannot be empty".into()));
    }

    Ok(DaemonSettings::from_raw(raw))
}

/// Load settings from a file. A missing file yields defaults.
pub fn load_settings(path: impl AsRef<Path>) -> ConfigResult<DaemonSettings> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(content) => parse_settings(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No settings file, using defaults");
            Ok(DaemonSettings::default())
        }
        Err(e) => Err(e.into()),
    }
}
