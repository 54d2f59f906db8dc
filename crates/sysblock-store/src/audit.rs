//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sysblock_util::PackageId;

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    /// Edited rule text passed the gate and was persisted
    ConfigSaved { rule_count: usize },

    /// Rule text was re-parsed into the live snapshot
    ConfigReloaded {
        rule_count: usize,
        master_switch: bool,
    },

    SessionStarted {
        package_id: PackageId,
        duration_secs: u64,
        strike_count: u32,
        /// Epoch millis, 0 when the start did not lock out
        lockout_end_time: i64,
    },

    /// Blocking screen launched for a package
    BlockIssued { package_id: PackageId, cause: String },

    /// Tamper attempt sent home
    TamperBlocked { package_id: PackageId, reason: String },

    FreezeRuleAdded {
        rule_id: i64,
        start_line: usize,
        end_line: usize,
    },

    FreezeRuleToggled { rule_id: i64, enabled: bool },

    FreezeRuleDeleted { rule_id: i64 },

    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Assigned by the store
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self::at(event, sysblock_util::now())
    }

    pub fn at(event: AuditEventType, timestamp: DateTime<Local>) -> Self {
        Self {
            id: 0,
            timestamp,
            event,
        }
    }
}
