//! Shared types for the sysblockd API

use serde::{Deserialize, Serialize};
use sysblock_util::{DailyWindow, PackageId, WallClock};

/// Kind of accessibility notification that produced a foreground event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new window came to the front
    WindowStateChanged,
    /// The frontmost window redrew its content
    WindowContentChanged,
}

/// A foreground-change notification as delivered by the platform shim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundEvent {
    pub package_id: PackageId,
    pub kind: EventKind,
    /// Concatenated on-screen text, may be empty
    #[serde(default)]
    pub visible_text: String,
    /// Window or view class name reported by the OS, may be empty
    #[serde(default)]
    pub class_hint: String,
}

impl ForegroundEvent {
    pub fn window_changed(package_id: impl Into<PackageId>) -> Self {
        Self {
            package_id: package_id.into(),
            kind: EventKind::WindowStateChanged,
            visible_text: String::new(),
            class_hint: String::new(),
        }
    }

    pub fn content_changed(package_id: impl Into<PackageId>) -> Self {
        Self {
            kind: EventKind::WindowContentChanged,
            ..Self::window_changed(package_id)
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.visible_text = text.into();
        self
    }

    pub fn with_class(mut self, class_hint: impl Into<String>) -> Self {
        self.class_hint = class_hint.into();
        self
    }
}

/// A daily window during which a block of configuration lines may be edited.
///
/// Serialized with camelCase keys; this is the persisted shape of the rule
/// list and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeRule {
    pub id: i64,
    pub start_hour: u8,
    pub start_minute: u8,
    pub end_hour: u8,
    pub end_minute: u8,
    /// First managed line, 1-based inclusive
    pub start_line: usize,
    /// Last managed line, 1-based inclusive
    pub end_line: usize,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl FreezeRule {
    pub fn window(&self) -> DailyWindow {
        DailyWindow::new(
            WallClock {
                hour: self.start_hour,
                minute: self.start_minute,
            },
            WallClock {
                hour: self.end_hour,
                minute: self.end_minute,
            },
        )
    }

    pub fn lines(&self) -> LineRange {
        LineRange::new(self.start_line, self.end_line)
    }
}

/// Request body for creating a freeze rule; the service assigns the id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFreezeRule {
    pub start_hour: u8,
    pub start_minute: u8,
    pub end_hour: u8,
    pub end_minute: u8,
    pub start_line: usize,
    pub end_line: usize,
}

impl NewFreezeRule {
    pub fn into_rule(self, id: i64) -> FreezeRule {
        FreezeRule {
            id,
            start_hour: self.start_hour,
            start_minute: self.start_minute,
            end_hour: self.end_hour,
            end_minute: self.end_minute,
            start_line: self.start_line,
            end_line: self.end_line,
            is_enabled: true,
        }
    }
}

/// Inclusive range of 1-based line numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, line: usize) -> bool {
        line >= self.start && line <= self.end
    }

    pub fn overlaps(&self, other: &LineRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Penalty view for the blocking screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyStatus {
    pub strike_count: u32,
    /// The next session start will trigger a lockout
    pub is_penalty_imminent: bool,
    /// Epoch millis, 0 when no lockout is recorded
    pub lockout_end_time: i64,
    /// Multiplier applied to the session length if a lockout triggers
    pub next_multiplier: u32,
}

/// Daily usage against the configured limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInfo {
    pub package_id: PackageId,
    pub used_minutes: u32,
    /// 0 means no usage allowance
    pub limit_minutes: u32,
}

/// Successful validation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub rule_count: usize,
    pub has_uninstall_protection: bool,
}

/// Result of a session start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub package_id: PackageId,
    /// Epoch millis at which the ticket expires
    pub expires_at: i64,
    pub strike_count: u32,
    /// Epoch millis, 0 unless this start triggered or kept a lockout
    pub lockout_end_time: i64,
}

/// What the service did with a foreground event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForegroundOutcome {
    /// The tamper check fired and the user was sent home
    TamperBlocked,
    /// Package is on the ignore list or a transient overlay
    Ignored,
    /// No strict rule applies
    Unrestricted,
    /// Blocking screen launched (lockout or no session)
    BlockScreen,
    /// A valid session exists; the watchdog is running
    Monitoring,
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Platform shim: reports events, starts sessions, edits configuration
    Host,
    /// Read-only observer
    Observer,
}

impl ClientRole {
    pub fn can_report(&self) -> bool {
        matches!(self, ClientRole::Host)
    }

    pub fn can_modify(&self) -> bool {
        matches!(self, ClientRole::Host)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub config_loaded: bool,
    pub store_ok: bool,
    pub monitoring: Option<PackageId>,
}
