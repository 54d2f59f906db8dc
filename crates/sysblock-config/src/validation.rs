//! Strict validation gate for saving rule text
//!
//! Stricter than [`parse_rules`](crate::parse_rules): the first offending
//! line aborts with its line number and a user-facing message.

use std::collections::HashSet;

use sysblock_api::ValidationSummary;
use thiserror::Error;

use crate::duration::parse_duration_minutes;
use crate::schema::{
    is_inert, strict_bool, tokens, KEY_APPLOCK, KEY_MASTER_SWITCH, KEY_SESSION_TIME,
    PREVENT_UNINSTALL, SET,
};

/// Smallest daily limit accepted in a strict rule, in minutes
pub const MIN_APPLOCK_MINUTES: u32 = 5;

/// First validation failure, 1-based line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ValidationError {
    pub line: usize,
    pub message: String,
}

impl ValidationError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Validate rule text
pub fn validate_rules(text: &str) -> Result<ValidationSummary, ValidationError> {
    let mut rule_count = 0;
    let mut has_uninstall_protection = false;
    let mut seen = HashSet::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if is_inert(trimmed) {
            continue;
        }
        if trimmed == PREVENT_UNINSTALL {
            has_uninstall_protection = true;
            continue;
        }

        let parts = tokens(trimmed);
        if parts.len() < 2 {
            return Err(ValidationError::at(line, "Invalid Format."));
        }

        if parts[0] == SET {
            match parts[1] {
                KEY_MASTER_SWITCH => {
                    if parts.get(2).and_then(|v| strict_bool(v)).is_none() {
                        return Err(ValidationError::at(
                            line,
                            "Master switch must be true or false.",
                        ));
                    }
                }
                KEY_SESSION_TIME => {
                    if parts.len() < 3 {
                        return Err(ValidationError::at(line, "Session times missing."));
                    }
                    if parts[2..]
                        .iter()
                        .any(|p| p.parse::<u32>().map_or(true, |m| m == 0))
                    {
                        return Err(ValidationError::at(
                            line,
                            "Session times must be whole minutes above zero.",
                        ));
                    }
                }
                KEY_APPLOCK => {
                    if parts.len() < 4 {
                        return Err(ValidationError::at(line, "AppLock needs: Package | Time"));
                    }
                    let package = parts[2];
                    if !seen.insert(package.to_string()) {
                        return Err(duplicate(line, package));
                    }
                    let time = parts[3];
                    if time.is_empty() {
                        return Err(ValidationError::at(line, "Time cannot be empty."));
                    }
                    if parse_duration_minutes(time) < MIN_APPLOCK_MINUTES {
                        return Err(ValidationError::at(
                            line,
                            "Safety: Time must be at least 5m.",
                        ));
                    }
                    rule_count += 1;
                }
                other => {
                    return Err(ValidationError::at(
                        line,
                        format!("Unknown Command: '{}'", other),
                    ));
                }
            }
        } else {
            if parts.len() < 3 {
                return Err(ValidationError::at(
                    line,
                    "Legacy rule needs: Package | Minutes | Strict",
                ));
            }
            let package = parts[0];
            if !seen.insert(package.to_string()) {
                return Err(duplicate(line, package));
            }
            if parts[1].parse::<u32>().is_err() {
                return Err(ValidationError::at(
                    line,
                    "Minutes must be a whole number.",
                ));
            }
            if strict_bool(parts[2]).is_none() {
                return Err(ValidationError::at(line, "Strict must be true or false."));
            }
            rule_count += 1;
        }
    }

    Ok(ValidationSummary {
        rule_count,
        has_uninstall_protection,
    })
}

fn duplicate(line: usize, package: &str) -> ValidationError {
    ValidationError::at(line, format!("Duplicate rule for '{}'.", package))
}
