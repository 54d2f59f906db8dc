//! Parsed configuration snapshot

use std::collections::BTreeMap;
use sysblock_util::PackageId;

use crate::schema::RuleLine;

/// Session lengths offered when the text does not set any, in seconds
pub const DEFAULT_SESSION_OPTIONS: [u64; 4] = [300, 600, 1200, 1800];

/// Per-package restriction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRule {
    pub package_id: PackageId,
    /// 0 blocks immediately with no daily allowance
    pub daily_limit_minutes: u32,
    /// Non-strict rules are advisory and never enforced
    pub strict_mode: bool,
}

/// Immutable snapshot of the rule text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    pub master_switch: bool,
    pub prevent_uninstall: bool,
    /// Offered session lengths in seconds
    pub session_options: Vec<u64>,
    pub rules: BTreeMap<PackageId, AppRule>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            master_switch: true,
            prevent_uninstall: false,
            session_options: DEFAULT_SESSION_OPTIONS.to_vec(),
            rules: BTreeMap::new(),
        }
    }
}

impl SystemConfig {
    /// Fold recognised lines into a snapshot; later lines win.
    pub fn from_lines<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = RuleLine>,
    {
        let mut config = Self::default();
        for line in lines {
            config.apply(line);
        }
        config
    }

    fn apply(&mut self, line: RuleLine) {
        match line {
            RuleLine::PreventUninstall => self.prevent_uninstall = true,
            RuleLine::MasterSwitch(on) => self.master_switch = on,
            RuleLine::SessionTime(minutes) => {
                self.session_options = minutes.into_iter().map(|m| m as u64 * 60).collect();
            }
            RuleLine::AppLock {
                package_id,
                limit_minutes,
            } => self.insert_rule(package_id, limit_minutes, true),
            RuleLine::Legacy {
                package_id,
                limit_minutes,
                strict,
            } => self.insert_rule(package_id, limit_minutes, strict),
        }
    }

    fn insert_rule(&mut self, package_id: PackageId, daily_limit_minutes: u32, strict_mode: bool) {
        self.rules.insert(
            package_id.clone(),
            AppRule {
                package_id,
                daily_limit_minutes,
                strict_mode,
            },
        );
    }

    pub fn rule_for(&self, package_id: &PackageId) -> Option<&AppRule> {
        self.rules.get(package_id)
    }

    /// Rule that the service actively enforces, if any
    pub fn enforced_rule(&self, package_id: &PackageId) -> Option<&AppRule> {
        if !self.master_switch {
            return None;
        }
        self.rule_for(package_id).filter(|r| r.strict_mode)
    }

    /// Tamper protection is live only with both switches on
    pub fn tamper_protection_active(&self) -> bool {
        self.master_switch && self.prevent_uninstall
    }
}
