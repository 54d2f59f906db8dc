//! Line grammar of the rule language
//!
//! Lines are pipe-delimited with trimmed tokens. Two rule formats coexist
//! and stay distinct here even though both become an [`AppRule`]:
//!
//! ```text
//! SET | APPLOCK | com.example.app | 1h30m     # strict, duration grammar
//! com.example.app | 90 | true                  # legacy: minutes | strict
//! ```
//!
//! [`AppRule`]: crate::AppRule

use sysblock_util::PackageId;
use thiserror::Error;

use crate::duration::parse_duration_minutes;

pub const PREVENT_UNINSTALL: &str = "PREVENT_UNINSTALL";
pub const SET: &str = "SET";
pub const KEY_MASTER_SWITCH: &str = "MASTER_SWITCH";
pub const KEY_SESSION_TIME: &str = "SESSION_TIME";
pub const KEY_APPLOCK: &str = "APPLOCK";

/// One recognised configuration line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleLine {
    PreventUninstall,
    MasterSwitch(bool),
    /// Session lengths in minutes, as written
    SessionTime(Vec<u32>),
    AppLock {
        package_id: PackageId,
        limit_minutes: u32,
    },
    Legacy {
        package_id: PackageId,
        limit_minutes: u32,
        strict: bool,
    },
}

/// Why the permissive parser dropped a line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("unknown SET key '{0}'")]
    UnknownKey(String),

    #[error("{command} needs at least {needed} fields, found {found}")]
    TooFewFields {
        command: &'static str,
        needed: usize,
        found: usize,
    },

    #[error("no session time parsed as a number")]
    NoSessionTimes,
}

/// Split a trimmed line into trimmed pipe-delimited tokens
pub fn tokens(line: &str) -> Vec<&str> {
    line.split('|').map(str::trim).collect()
}

/// Whether a line carries no directive at all
pub fn is_inert(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Loose boolean: case-insensitive `true`, anything else is false
pub fn loose_bool(token: &str) -> bool {
    token.eq_ignore_ascii_case("true")
}

/// Strict boolean used by the validator
pub fn strict_bool(token: &str) -> Option<bool> {
    if token.eq_ignore_ascii_case("true") {
        Some(true)
    } else if token.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl RuleLine {
    /// Parse one line the way the runtime does: lenient about values,
    /// returns `Ok(None)` for blank and comment lines.
    pub fn parse(line: &str) -> Result<Option<RuleLine>, SkipReason> {
        let trimmed = line.trim();
        if is_inert(trimmed) {
            return Ok(None);
        }
        if trimmed == PREVENT_UNINSTALL {
            return Ok(Some(RuleLine::PreventUninstall));
        }

        let parts = tokens(trimmed);
        if parts[0] == SET {
            let key = parts.get(1).copied().unwrap_or("");
            return match key {
                KEY_MASTER_SWITCH => {
                    require(KEY_MASTER_SWITCH, &parts, 3)?;
                    Ok(Some(RuleLine::MasterSwitch(loose_bool(parts[2]))))
                }
                KEY_SESSION_TIME => {
                    let minutes: Vec<u32> =
                        parts[2..].iter().filter_map(|p| p.parse().ok()).collect();
                    if minutes.is_empty() {
                        Err(SkipReason::NoSessionTimes)
                    } else {
                        Ok(Some(RuleLine::SessionTime(minutes)))
                    }
                }
                KEY_APPLOCK => {
                    require(KEY_APPLOCK, &parts, 4)?;
                    Ok(Some(RuleLine::AppLock {
                        package_id: PackageId::new(parts[2]),
                        limit_minutes: parse_duration_minutes(parts[3]),
                    }))
                }
                other => Err(SkipReason::UnknownKey(other.to_string())),
            };
        }

        require("legacy rule", &parts, 3)?;
        Ok(Some(RuleLine::Legacy {
            package_id: PackageId::new(parts[0]),
            limit_minutes: parts[1].parse().unwrap_or(0),
            strict: loose_bool(parts[2]),
        }))
    }

    pub fn package_id(&self) -> Option<&PackageId> {
        match self {
            RuleLine::AppLock { package_id, .. } | RuleLine::Legacy { package_id, .. } => {
                Some(package_id)
            }
            _ => None,
        }
    }
}

fn require(command: &'static str, parts: &[&str], needed: usize) -> Result<(), SkipReason> {
    if parts.len() < needed {
        Err(SkipReason::TooFewFields {
            command,
            needed,
            found: parts.len(),
        })
    } else {
        Ok(())
    }
}
