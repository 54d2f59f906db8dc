//! Event types for sysblockd -> client streaming
//!
//! Most events are directives: the service decides, the subscribed platform
//! shim carries out the UI side effect.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sysblock_util::PackageId;

use crate::API_VERSION;

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: sysblock_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Put the blocking screen in front of this package
    LaunchBlockScreen { package_id: PackageId },

    /// Show or update the countdown overlay
    ShowWarning { remaining_ms: u64, threshold_ms: u64 },

    /// Remove the countdown overlay
    HideOverlay,

    /// Send the user to the home screen
    NavigateHome,

    /// Transient user-visible message
    ShowNotice { message: String },

    /// Rule text was re-parsed
    ConfigReloaded {
        rule_count: usize,
        master_switch: bool,
    },

    /// Service is shutting down
    Shutdown,
}
