//! Command types for the sysblockd protocol

use serde::{Deserialize, Serialize};
use sysblock_util::{ClientId, PackageId};

use crate::{
    ClientRole, ForegroundEvent, ForegroundOutcome, FreezeRule, HealthStatus, LineRange,
    NewFreezeRule, PenaltyStatus, SessionGrant, UsageInfo, ValidationSummary, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    /// 1-based line the error refers to, for configuration failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    PermissionDenied,
    RateLimited,
    NoRule,
    InvalidDuration,
    ValidationFailed,
    FrozenLine,
    FreezeRejected,
    StoreError,
    HostError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// The OS reported a foreground change
    ForegroundChanged { event: ForegroundEvent },

    /// Push today's foreground minutes for a package
    ReportUsage { package_id: PackageId, minutes: u32 },

    /// User picked a session length on the blocking screen
    StartSession {
        package_id: PackageId,
        duration_secs: u64,
    },

    GetPenaltyStatus { package_id: PackageId },

    GetUsageInfo { package_id: PackageId },

    /// Configured session lengths, in seconds
    GetSessionOptions,

    /// Raw rule-language text as persisted
    GetConfig,

    /// Dry-run validation of edited text
    ValidateConfig { text: String },

    /// Gate, validate and persist edited text
    SaveConfig { text: String },

    ListFreezeRules,

    AddFreezeRule { rule: NewFreezeRule },

    ToggleFreezeRule { id: i64 },

    DeleteFreezeRule { id: i64 },

    /// Line ranges that cannot be edited right now
    GetFrozenRanges,

    /// Subscribe to host directives (returns immediately, events stream separately)
    SubscribeEvents,

    UnsubscribeEvents,

    GetHealth,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// Whether the command changes enforcement state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::ForegroundChanged { .. }
                | Command::ReportUsage { .. }
                | Command::StartSession { .. }
                | Command::SaveConfig { .. }
                | Command::AddFreezeRule { .. }
                | Command::ToggleFreezeRule { .. }
                | Command::DeleteFreezeRule { .. }
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Foreground { outcome: ForegroundOutcome },
    UsageRecorded,
    SessionStarted(SessionGrant),
    PenaltyStatus(PenaltyStatus),
    UsageInfo(UsageInfo),
    SessionOptions { seconds: Vec<u64> },
    Config { text: String },
    Validated(ValidationSummary),
    Saved(ValidationSummary),
    FreezeRules { rules: Vec<FreezeRule> },
    FreezeRuleAdded(FreezeRule),
    FrozenRanges { ranges: Vec<LineRange> },
    Subscribed { client_id: ClientId },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventKind;

    #[test]
    fn request_wire_shape() {
        let req = Request::new(
            7,
            Command::StartSession {
                package_id: "com.example.app".into(),
                duration_secs: 300,
            },
        );
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["request_id"], 7);
        assert_eq!(json["command"]["type"], "start_session");
        assert_eq!(json["command"]["package_id"], "com.example.app");
    }

    #[test]
    fn foreground_command_parses_from_shim_json() {
        let line = r#"{"request_id":1,"api_version":1,"command":{"type":"foreground_changed","event":{"package_id":"com.android.settings","kind":"window_content_changed","visible_text":"Usage access"}}}"#;
        let req: Request = serde_json::from_str(line).unwrap();

        match req.command {
            Command::ForegroundChanged { event } => {
                assert_eq!(event.kind, EventKind::WindowContentChanged);
                assert_eq!(event.visible_text, "Usage access");
                assert!(event.class_hint.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn validation_error_carries_line() {
        let resp = Response::error(
            3,
            ErrorInfo::new(ErrorCode::ValidationFailed, "Safety: Time must be at least 5m.")
                .at_line(4),
        );
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();

        match parsed.result {
            ResponseResult::Err(err) => {
                assert_eq!(err.code, ErrorCode::ValidationFailed);
                assert_eq!(err.line, Some(4));
            }
            ResponseResult::Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn queries_are_not_mutating() {
        assert!(!Command::GetFrozenRanges.is_mutating());
        assert!(Command::DeleteFreezeRule { id: 1 }.is_mutating());
    }
}
