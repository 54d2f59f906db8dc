//! Permissive rule-language parser
//!
//! Never fails: unrecognised lines are logged and skipped so the service
//! always has a usable snapshot while the user is mid-edit.

use tracing::{debug, warn};

use crate::policy::SystemConfig;
use crate::schema::RuleLine;

/// Parse raw rule text into a snapshot
pub fn parse_rules(text: &str) -> SystemConfig {
    let config = SystemConfig::from_lines(parse_lines(text).into_iter().map(|(_, line)| line));
    debug!(
        rules = config.rules.len(),
        master_switch = config.master_switch,
        prevent_uninstall = config.prevent_uninstall,
        "Parsed rule text"
    );
    config
}

/// Recognised lines with their 1-based line numbers
pub fn parse_lines(text: &str) -> Vec<(usize, RuleLine)> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, raw)| match RuleLine::parse(raw) {
            Ok(line) => line.map(|l| (idx + 1, l)),
            Err(reason) => {
                warn!(line = idx + 1, text = raw.trim(), %reason, "Skipping config line");
                None
            }
        })
        .collect()
}
