//! Freeze windows over the rule text
//!
//! Each rule manages a block of lines and names the daily window in which
//! those lines may be edited. Outside that window they are frozen. Lines no
//! rule manages are always editable.

use chrono::{DateTime, Local};
use std::collections::BTreeSet;
use std::sync::Arc;
use sysblock_api::{FreezeRule, LineRange, NewFreezeRule};
use sysblock_store::{Namespace, Store, StoreError, StoreExt, FREEZE_RULES_KEY};
use sysblock_util::{to_millis, WallClock};
use thiserror::Error;
use tracing::{info, warn};

/// Why a freeze rule change was refused
#[derive(Debug, Error)]
pub enum FreezeError {
    #[error("Invalid time {hour:02}:{minute:02}")]
    InvalidTime { hour: u8, minute: u8 },

    #[error("Window must end after it starts")]
    EmptyWindow,

    #[error("Invalid lines {start}-{end} (max: {line_count})")]
    InvalidLines {
        start: usize,
        end: usize,
        line_count: usize,
    },

    #[error("Lines already managed by rule {0}")]
    Conflict(i64),

    #[error("No freeze rule with id {0}")]
    NotFound(i64),

    #[error("Rule {0} can only be changed inside its edit window")]
    WindowClosed(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<FreezeError> for sysblock_util::SysblockError {
    fn from(e: FreezeError) -> Self {
        match e {
            FreezeError::Store(inner) => inner.into(),
            other => sysblock_util::SysblockError::freeze(other.to_string()),
        }
    }
}

/// Whether `minute_of_day` lies in the rule's edit window
pub fn is_rule_active_at(rule: &FreezeRule, minute_of_day: u16) -> bool {
    rule.window().contains_minute(minute_of_day)
}

/// Lines frozen at `minute_of_day`: managed by an enabled rule and not
/// inside any of those rules' open windows. Coalesced and sorted.
pub fn frozen_ranges(rules: &[FreezeRule], minute_of_day: u16) -> Vec<LineRange> {
    let mut managed = BTreeSet::new();
    let mut allowed = BTreeSet::new();

    for rule in rules.iter().filter(|r| r.is_enabled) {
        let start = rule.start_line.max(1);
        let end = rule.end_line.max(1);
        if end < start {
            continue;
        }
        managed.extend(start..=end);
        if is_rule_active_at(rule, minute_of_day) {
            allowed.extend(start..=end);
        }
    }

    coalesce(managed.difference(&allowed).copied())
}

fn coalesce(sorted: impl Iterator<Item = usize>) -> Vec<LineRange> {
    let mut ranges: Vec<LineRange> = Vec::new();
    for line in sorted {
        match ranges.last_mut() {
            Some(last) if last.end + 1 == line => last.end = line,
            _ => ranges.push(LineRange::new(line, line)),
        }
    }
    ranges
}

/// Check a requested rule against time, bounds and existing enabled rules
pub fn validate_new_rule(
    request: &NewFreezeRule,
    existing: &[FreezeRule],
    line_count: usize,
) -> Result<(), FreezeError> {
    let start = WallClock::new(request.start_hour, request.start_minute).ok_or(
        FreezeError::InvalidTime {
            hour: request.start_hour,
            minute: request.start_minute,
        },
    )?;
    let end = WallClock::new(request.end_hour, request.end_minute).ok_or(
        FreezeError::InvalidTime {
            hour: request.end_hour,
            minute: request.end_minute,
        },
    )?;
    if end <= start {
        return Err(FreezeError::EmptyWindow);
    }

    let lines = LineRange::new(request.start_line, request.end_line);
    if lines.start == 0 || lines.end < lines.start || lines.end > line_count {
        return Err(FreezeError::InvalidLines {
            start: lines.start,
            end: lines.end,
            line_count,
        });
    }

    check_conflicts(lines, None, existing)
}

fn check_conflicts(
    lines: LineRange,
    skip_id: Option<i64>,
    existing: &[FreezeRule],
) -> Result<(), FreezeError> {
    match existing
        .iter()
        .filter(|r| r.is_enabled && Some(r.id) != skip_id)
        .find(|r| r.lines().overlaps(&lines))
    {
        Some(clash) => Err(FreezeError::Conflict(clash.id)),
        None => Ok(()),
    }
}

/// First 1-based frozen line whose text differs between `old` and `new`.
/// Lines past the end of a text compare as empty.
pub fn first_frozen_edit(old: &str, new: &str, frozen: &[LineRange]) -> Option<usize> {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    fn line_at<'a>(lines: &[&'a str], n: usize) -> &'a str {
        lines.get(n - 1).copied().unwrap_or("")
    }

    frozen
        .iter()
        .flat_map(|range| range.start.max(1)..=range.end)
        .find(|&n| line_at(&old_lines, n) != line_at(&new_lines, n))
}

/// Store-backed freeze rule list
pub struct FreezeManager {
    store: Arc<dyn Store>,
}

impl FreezeManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Persisted rules. Unreadable JSON loads as an empty list.
    pub fn rules(&self) -> Result<Vec<FreezeRule>, StoreError> {
        match self
            .store
            .get_json::<Vec<FreezeRule>>(Namespace::Freeze, FREEZE_RULES_KEY)
        {
            Ok(rules) => Ok(rules.unwrap_or_default()),
            Err(StoreError::Serialization(e)) => {
                warn!(error = %e, "Unreadable freeze rules, treating as none");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn save(&self, rules: &[FreezeRule]) -> Result<(), StoreError> {
        self.store
            .set_json(Namespace::Freeze, FREEZE_RULES_KEY, &rules)
    }

    pub fn frozen_ranges(&self, now: &DateTime<Local>) -> Result<Vec<LineRange>, StoreError> {
        Ok(frozen_ranges(&self.rules()?, minute_of(now)))
    }

    pub fn is_rule_active(rule: &FreezeRule, now: &DateTime<Local>) -> bool {
        rule.window().contains(now)
    }

    /// Add a rule. `line_count` is the current rule text's line count.
    pub fn add_rule(
        &self,
        request: NewFreezeRule,
        line_count: usize,
        now: &DateTime<Local>,
    ) -> Result<FreezeRule, FreezeError> {
        let mut rules = self.rules()?;
        validate_new_rule(&request, &rules, line_count)?;

        let newest = rules.iter().map(|r| r.id).max().unwrap_or(i64::MIN);
        let id = to_millis(now).max(newest.saturating_add(1));
        let rule = request.into_rule(id);
        rules.push(rule.clone());
        self.save(&rules)?;

        info!(
            rule_id = id,
            lines = %format!("{}-{}", rule.start_line, rule.end_line),
            window = %format!("{}-{}", rule.window().start, rule.window().end),
            "Freeze rule added"
        );
        Ok(rule)
    }

    /// Flip a rule's enabled flag. Only allowed inside its window.
    pub fn toggle_rule(&self, id: i64, now: &DateTime<Local>) -> Result<FreezeRule, FreezeError> {
        let mut rules = self.rules()?;
        let idx = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or(FreezeError::NotFound(id))?;
        if !Self::is_rule_active(&rules[idx], now) {
            return Err(FreezeError::WindowClosed(id));
        }

        let enabling = !rules[idx].is_enabled;
        if enabling {
            check_conflicts(rules[idx].lines(), Some(id), &rules)?;
        }
        rules[idx].is_enabled = enabling;
        let updated = rules[idx].clone();
        self.save(&rules)?;

        info!(rule_id = id, enabled = enabling, "Freeze rule toggled");
        Ok(updated)
    }

    /// Remove a rule. Only allowed inside its window.
    pub fn delete_rule(&self, id: i64, now: &DateTime<Local>) -> Result<(), FreezeError> {
        let mut rules = self.rules()?;
        let rule = rules
            .iter()
            .find(|r| r.id == id)
            .ok_or(FreezeError::NotFound(id))?;
        if !Self::is_rule_active(rule, now) {
            return Err(FreezeError::WindowClosed(id));
        }

        rules.retain(|r| r.id != id);
        self.save(&rules)?;

        info!(rule_id = id, "Freeze rule deleted");
        Ok(())
    }
}

fn minute_of(now: &DateTime<Local>) -> u16 {
    WallClock::of(now).minute_of_day()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sysblock_store::SqliteStore;

    fn rule(id: i64, start: (u8, u8), end: (u8, u8), lines: (usize, usize)) -> FreezeRule {
        FreezeRule {
            id,
            start_hour: start.0,
            start_minute: start.1,
            end_hour: end.0,
            end_minute: end.1,
            start_line: lines.0,
            end_line: lines.1,
            is_enabled: true,
        }
    }

    fn request(start: (u8, u8), end: (u8, u8), lines: (usize, usize)) -> NewFreezeRule {
        NewFreezeRule {
            start_hour: start.0,
            start_minute: start.1,
            end_hour: end.0,
            end_minute: end.1,
            start_line: lines.0,
            end_line: lines.1,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 10, h, m, 0).unwrap()
    }

    #[test]
    fn overnight_window_wraps() {
        let rules = vec![rule(1, (22, 0), (6, 0), (2, 4))];

        assert!(is_rule_active_at(&rules[0], 23 * 60));
        assert!(is_rule_active_at(&rules[0], 2 * 60));
        assert!(!is_rule_active_at(&rules[0], 12 * 60));

        // inside the window the lines are open, outside they are frozen
        assert!(frozen_ranges(&rules, 23 * 60).is_empty());
        assert!(frozen_ranges(&rules, 2 * 60).is_empty());
        assert_eq!(frozen_ranges(&rules, 12 * 60), vec![LineRange::new(2, 4)]);
    }

    #[test]
    fn frozen_ranges_coalesce_and_skip_disabled() {
        let mut disabled = rule(3, (0, 0), (0, 1), (10, 12));
        disabled.is_enabled = false;
        let rules = vec![
            rule(1, (8, 0), (9, 0), (1, 3)),
            rule(2, (8, 0), (9, 0), (4, 5)),
            rule(4, (12, 0), (13, 0), (7, 7)),
            disabled,
        ];

        assert_eq!(
            frozen_ranges(&rules, 10 * 60),
            vec![LineRange::new(1, 5), LineRange::new(7, 7)]
        );
        assert_eq!(frozen_ranges(&rules, 12 * 60 + 30), vec![LineRange::new(1, 5)]);
        assert!(frozen_ranges(&[], 0).is_empty());
    }

    #[test]
    fn new_rule_validation() {
        let existing = vec![rule(1, (8, 0), (9, 0), (3, 6))];

        assert!(validate_new_rule(&request((10, 0), (11, 0), (7, 9)), &existing, 10).is_ok());
        assert!(matches!(
            validate_new_rule(&request((10, 0), (11, 0), (5, 8)), &existing, 10),
            Err(FreezeError::Conflict(1))
        ));
        assert!(matches!(
            validate_new_rule(&request((11, 0), (11, 0), (7, 9)), &existing, 10),
            Err(FreezeError::EmptyWindow)
        ));
        assert!(matches!(
            validate_new_rule(&request((22, 0), (6, 0), (7, 9)), &existing, 10),
            Err(FreezeError::EmptyWindow)
        ));
        assert!(matches!(
            validate_new_rule(&request((24, 0), (6, 0), (7, 9)), &existing, 10),
            Err(FreezeError::InvalidTime { hour: 24, .. })
        ));
        assert!(matches!(
            validate_new_rule(&request((10, 0), (11, 0), (9, 11)), &existing, 10),
            Err(FreezeError::InvalidLines { line_count: 10, .. })
        ));
        assert!(matches!(
            validate_new_rule(&request((10, 0), (11, 0), (0, 2)), &existing, 10),
            Err(FreezeError::InvalidLines { .. })
        ));
    }

    #[test]
    fn disabled_rules_do_not_conflict() {
        let mut off = rule(1, (8, 0), (9, 0), (3, 6));
        off.is_enabled = false;
        assert!(validate_new_rule(&request((10, 0), (11, 0), (4, 5)), &[off], 10).is_ok());
    }

    #[test]
    fn frozen_edit_detection() {
        let old = "a\nb\nc\nd";
        let frozen = vec![LineRange::new(2, 3)];

        assert_eq!(first_frozen_edit(old, "a!\nb\nc\nd\ne", &frozen), None);
        assert_eq!(first_frozen_edit(old, "a\nb\nC\nd", &frozen), Some(3));
        // deleting a line shifts the frozen block
        assert_eq!(first_frozen_edit(old, "b\nc\nd", &frozen), Some(2));
        // a frozen range past the end compares against empty lines
        assert_eq!(
            first_frozen_edit("a", "a\n\nx", &[LineRange::new(2, 3)]),
            Some(3)
        );
    }

    #[test]
    fn manager_lifecycle() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let manager = FreezeManager::new(store);
        let morning = at(8, 30);

        let first = manager
            .add_rule(request((8, 0), (9, 0), (1, 2)), 5, &morning)
            .unwrap();
        let second = manager
            .add_rule(request((8, 0), (9, 0), (3, 4)), 5, &morning)
            .unwrap();
        assert!(second.id > first.id, "ids stay unique within one millisecond");
        assert!(matches!(
            manager.add_rule(request((8, 0), (9, 0), (2, 3)), 5, &morning),
            Err(FreezeError::Conflict(_))
        ));

        assert!(manager.frozen_ranges(&morning).unwrap().is_empty());
        assert_eq!(
            manager.frozen_ranges(&at(10, 0)).unwrap(),
            vec![LineRange::new(1, 4)]
        );

        // outside the window nothing can be loosened
        assert!(matches!(
            manager.toggle_rule(first.id, &at(10, 0)),
            Err(FreezeError::WindowClosed(_))
        ));
        assert!(matches!(
            manager.delete_rule(first.id, &at(10, 0)),
            Err(FreezeError::WindowClosed(_))
        ));

        let toggled = manager.toggle_rule(first.id, &morning).unwrap();
        assert!(!toggled.is_enabled);
        assert_eq!(
            manager.frozen_ranges(&at(10, 0)).unwrap(),
            vec![LineRange::new(3, 4)]
        );

        manager.delete_rule(second.id, &morning).unwrap();
        assert_eq!(manager.rules().unwrap().len(), 1);
        assert!(matches!(
            manager.delete_rule(999, &morning),
            Err(FreezeError::NotFound(999))
        ));
    }

    #[test]
    fn reenabling_checks_conflicts() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let manager = FreezeManager::new(store);
        let now = at(8, 30);

        let a = manager.add_rule(request((8, 0), (9, 0), (1, 3)), 9, &now).unwrap();
        manager.toggle_rule(a.id, &now).unwrap();
        manager.add_rule(request((8, 0), (9, 0), (2, 4)), 9, &now).unwrap();

        assert!(matches!(
            manager.toggle_rule(a.id, &now),
            Err(FreezeError::Conflict(_))
        ));
    }

    #[test]
    fn corrupt_rules_load_empty() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        store.set(Namespace::Freeze, FREEZE_RULES_KEY, "{not json").unwrap();
        let manager = FreezeManager::new(store);
        assert!(manager.rules().unwrap().is_empty());
    }
}
