//! Per-package penalty state machine
//!
//! Opening a strict app three times within [`GAP_TOLERANCE_MS`] of the
//! previous session's end locks it out for a multiple of the chosen
//! session length. The multiplier grows with every escalation on the same
//! calendar day and drops back to 2 after midnight.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sysblock_api::{PenaltyStatus, SessionGrant};
use sysblock_store::{txn_get_json, txn_set_json, Namespace, Store, StoreError, StoreExt};
use sysblock_util::{day_of_year, to_millis, PackageId, SysblockError};
use tracing::{debug, info, warn};

/// Quiet period after a session ends that forgives all strikes
pub const GAP_TOLERANCE_MS: i64 = 2 * 60 * 1000;

/// Strike count at which a session start triggers a lockout
pub const LOCKOUT_STRIKES: u32 = 3;

/// Persisted per-package penalty state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PenaltyRecord {
    pub strike_count: u32,
    /// Never below 1; only grows within a day
    pub daily_penalty_level: u32,
    /// Epoch millis, 0 when none
    pub lockout_end_time: i64,
    /// Epoch millis of the latest granted session's end
    pub last_session_end_time: i64,
    /// Day of year (1..=366) of the last reset; 0 before first use
    pub last_reset_day_of_year: u32,
}

impl Default for PenaltyRecord {
    fn default() -> Self {
        Self {
            strike_count: 0,
            daily_penalty_level: 1,
            lockout_end_time: 0,
            last_session_end_time: 0,
            last_reset_day_of_year: 0,
        }
    }
}

impl PenaltyRecord {
    /// Apply the day-boundary reset if `day` differs from the stored day
    pub fn rolled_over(self, day: u32) -> Self {
        if self.last_reset_day_of_year == day {
            return self;
        }
        Self {
            strike_count: 0,
            daily_penalty_level: 1,
            lockout_end_time: 0,
            last_reset_day_of_year: day,
            ..self
        }
    }

    /// A served lockout or a long enough gap wipes the strike slate
    pub fn is_cooled_down(&self, now_ms: i64) -> bool {
        (self.lockout_end_time > 0 && now_ms > self.lockout_end_time)
            || now_ms.saturating_sub(self.last_session_end_time) > GAP_TOLERANCE_MS
    }

    pub fn next_multiplier(&self) -> u32 {
        self.daily_penalty_level.max(1).saturating_add(1)
    }

    /// Status as shown on the blocking screen. Expects a rolled-over record.
    pub fn status(&self, now_ms: i64) -> PenaltyStatus {
        if self.is_cooled_down(now_ms) {
            PenaltyStatus {
                strike_count: 0,
                is_penalty_imminent: false,
                lockout_end_time: self.lockout_end_time,
                next_multiplier: self.next_multiplier(),
            }
        } else {
            PenaltyStatus {
                strike_count: self.strike_count,
                is_penalty_imminent: self.strike_count >= LOCKOUT_STRIKES - 1,
                lockout_end_time: self.lockout_end_time,
                next_multiplier: self.next_multiplier(),
            }
        }
    }

    /// A lockout only bites once the session that earned it has ended
    pub fn is_locked_out(&self, now_ms: i64) -> bool {
        now_ms > self.last_session_end_time && now_ms < self.lockout_end_time
    }

    /// Record a session start. Returns the updated record and the ticket
    /// expiry. Expects a rolled-over record.
    pub fn start_session(self, duration_secs: u64, now_ms: i64) -> (Self, i64) {
        let duration_ms = i64::try_from(duration_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        let reset = self.is_cooled_down(now_ms);
        let strike_count = if reset {
            1
        } else {
            self.strike_count.saturating_add(1)
        };
        let session_end = now_ms.saturating_add(duration_ms);

        let mut next = Self {
            strike_count,
            last_session_end_time: session_end,
            ..self
        };

        if strike_count >= LOCKOUT_STRIKES {
            let multiplier = self.next_multiplier();
            next.lockout_end_time =
                session_end.saturating_add(duration_ms.saturating_mul(multiplier as i64));
            next.daily_penalty_level = self.daily_penalty_level.max(1).saturating_add(1);
        } else if reset {
            next.lockout_end_time = 0;
        }

        (next, session_end)
    }
}

/// Store-backed access to penalty records and session tickets
pub struct PenaltyTracker {
    store: Arc<dyn Store>,
}

impl PenaltyTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn load(&self, package_id: &PackageId) -> Result<PenaltyRecord, StoreError> {
        match self
            .store
            .get_json::<PenaltyRecord>(Namespace::Penalty, package_id.as_str())
        {
            Ok(record) => Ok(record.unwrap_or_default()),
            Err(StoreError::Serialization(e)) => {
                warn!(
                    package = %package_id,
                    error = %e,
                    "Unreadable penalty record, starting fresh"
                );
                Ok(PenaltyRecord::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Stored record with the day rollover applied (not persisted)
    pub fn record(
        &self,
        package_id: &PackageId,
        now: &DateTime<Local>,
    ) -> Result<PenaltyRecord, StoreError> {
        Ok(self.load(package_id)?.rolled_over(day_of_year(now)))
    }

    /// Penalty status; persists a day rollover if one was due
    pub fn get_status(
        &self,
        package_id: &PackageId,
        now: &DateTime<Local>,
    ) -> Result<PenaltyStatus, StoreError> {
        let stored = self.load(package_id)?;
        let current = stored.rolled_over(day_of_year(now));
        if current != stored && stored != PenaltyRecord::default() {
            debug!(package = %package_id, "Day rollover reset penalty record");
            self.store
                .set_json(Namespace::Penalty, package_id.as_str(), &current)?;
        }
        Ok(current.status(to_millis(now)))
    }

    pub fn is_locked_out(
        &self,
        package_id: &PackageId,
        now: &DateTime<Local>,
    ) -> Result<bool, StoreError> {
        Ok(self.record(package_id, now)?.is_locked_out(to_millis(now)))
    }

    /// Ticket expiry in epoch millis, if a ticket was ever issued
    pub fn session_expiry(&self, package_id: &PackageId) -> Result<Option<i64>, StoreError> {
        self.store
            .get_json::<i64>(Namespace::Sessions, package_id.as_str())
    }

    /// Whether a ticket is currently valid
    pub fn has_active_session(
        &self,
        package_id: &PackageId,
        now: &DateTime<Local>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .session_expiry(package_id)?
            .is_some_and(|expiry| to_millis(now) < expiry))
    }

    /// Grant a session: update strikes, maybe lock out, issue the ticket.
    /// The record and ticket are written in one transaction.
    pub fn start_session(
        &self,
        package_id: &PackageId,
        duration_secs: u64,
        now: &DateTime<Local>,
    ) -> Result<SessionGrant, SysblockError> {
        if duration_secs == 0 {
            return Err(SysblockError::InvalidDuration(duration_secs));
        }

        let key = package_id.as_str();
        let now_ms = to_millis(now);
        let day = day_of_year(now);
        let mut outcome: Option<(PenaltyRecord, i64)> = None;

        self.store.transaction(&mut |txn| {
            let stored = match txn_get_json::<PenaltyRecord>(txn, Namespace::Penalty, key) {
                Ok(record) => record.unwrap_or_default(),
                Err(StoreError::Serialization(_)) => PenaltyRecord::default(),
                Err(e) => return Err(e),
            };
            let (next, expiry) = stored.rolled_over(day).start_session(duration_secs, now_ms);
            txn_set_json(txn, Namespace::Penalty, key, &next)?;
            txn_set_json(txn, Namespace::Sessions, key, &expiry)?;
            outcome = Some((next, expiry));
            Ok(())
        })?;

        let (record, expires_at) = outcome
            .ok_or_else(|| SysblockError::internal("session transaction produced no record"))?;

        if record.strike_count >= LOCKOUT_STRIKES {
            info!(
                package = %package_id,
                strikes = record.strike_count,
                lockout_end = record.lockout_end_time,
                level = record.daily_penalty_level,
                "Rapid re-entry, lockout scheduled"
            );
        } else {
            debug!(package = %package_id, strikes = record.strike_count, "Session granted");
        }

        Ok(SessionGrant {
            package_id: package_id.clone(),
            expires_at,
            strike_count: record.strike_count,
            lockout_end_time: record.lockout_end_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use sysblock_store::SqliteStore;

    fn tracker() -> PenaltyTracker {
        PenaltyTracker::new(Arc::new(SqliteStore::in_memory().unwrap()))
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 10, h, m, s).unwrap()
    }

    #[test]
    fn first_start_is_one_strike() {
        let t = tracker();
        let pkg = PackageId::new("com.example.app");
        let now = at(10, 0, 0);

        let grant = t.start_session(&pkg, 300, &now).unwrap();
        assert_eq!(grant.strike_count, 1);
        assert_eq!(grant.lockout_end_time, 0);
        assert_eq!(grant.expires_at, to_millis(&(now + Duration::seconds(300))));
        assert!(t.has_active_session(&pkg, &(now + Duration::seconds(299))).unwrap());
        assert!(!t.has_active_session(&pkg, &(now + Duration::seconds(300))).unwrap());
    }

    #[test]
    fn three_rapid_starts_lock_out_then_reset_after_expiry() {
        let t = tracker();
        let pkg = PackageId::new("com.example.app");
        let t0 = at(10, 0, 0);

        t.start_session(&pkg, 60, &t0).unwrap();
        t.start_session(&pkg, 60, &(t0 + Duration::seconds(90))).unwrap();

        let status = t.get_status(&pkg, &(t0 + Duration::seconds(170))).unwrap();
        assert_eq!(status.strike_count, 2);
        assert!(status.is_penalty_imminent);
        assert_eq!(status.next_multiplier, 2);

        let third_at = t0 + Duration::seconds(180);
        let third = t.start_session(&pkg, 60, &third_at).unwrap();
        let third_end = third_at + Duration::seconds(60);
        assert_eq!(third.strike_count, 3);
        assert_eq!(third.lockout_end_time, to_millis(&(third_end + Duration::seconds(120))));

        // not locked during the granted session, locked right after it
        assert!(!t.is_locked_out(&pkg, &(third_at + Duration::seconds(30))).unwrap());
        assert!(t.is_locked_out(&pkg, &(third_end + Duration::seconds(1))).unwrap());

        let after = third_end + Duration::seconds(121);
        assert!(!t.is_locked_out(&pkg, &after).unwrap());
        let status = t.get_status(&pkg, &after).unwrap();
        assert_eq!(status.strike_count, 0);
        assert_eq!(status.next_multiplier, 3);

        let fourth = t.start_session(&pkg, 60, &after).unwrap();
        assert_eq!(fourth.strike_count, 1);
        assert_eq!(fourth.lockout_end_time, 0);
        let record = t.record(&pkg, &after).unwrap();
        assert_eq!(record.daily_penalty_level, 2);
    }

    #[test]
    fn escalation_grows_within_a_day() {
        let mut record = PenaltyRecord::default().rolled_over(100);
        let mut now = 1_000_000_000i64;
        let mut lockouts = Vec::new();

        for _ in 0..2 {
            for _ in 0..3 {
                let (next, _) = record.start_session(60, now);
                record = next;
                now += 1_000;
            }
            lockouts.push(record.lockout_end_time - record.last_session_end_time);
            now = record.lockout_end_time + 1;
        }

        assert_eq!(lockouts, vec![120_000, 180_000]);
        assert_eq!(record.daily_penalty_level, 3);
    }

    #[test]
    fn slow_restarts_never_strike_out() {
        let t = tracker();
        let pkg = PackageId::new("com.example.app");
        let mut now = at(9, 0, 0);

        for _ in 0..5 {
            let grant = t.start_session(&pkg, 60, &now).unwrap();
            assert_eq!(grant.strike_count, 1);
            now = now + Duration::seconds(60 + 121);
        }
    }

    #[test]
    fn day_rollover_resets_everything() {
        let t = tracker();
        let pkg = PackageId::new("com.example.app");
        let yesterday = Local.with_ymd_and_hms(2025, 6, 9, 23, 58, 0).unwrap();

        let stale = PenaltyRecord {
            strike_count: 2,
            daily_penalty_level: 4,
            lockout_end_time: to_millis(&(yesterday + Duration::hours(3))),
            last_session_end_time: to_millis(&(yesterday + Duration::minutes(3))),
            last_reset_day_of_year: day_of_year(&yesterday),
        };
        t.store
            .set_json(Namespace::Penalty, pkg.as_str(), &stale)
            .unwrap();

        let today = Local.with_ymd_and_hms(2025, 6, 10, 0, 0, 30).unwrap();
        let status = t.get_status(&pkg, &today).unwrap();
        assert_eq!(status.lockout_end_time, 0);
        assert_eq!(status.next_multiplier, 2);
        assert!(!t.is_locked_out(&pkg, &today).unwrap());

        let persisted: PenaltyRecord = t
            .store
            .get_json(Namespace::Penalty, pkg.as_str())
            .unwrap()
            .unwrap();
        assert_eq!(persisted.strike_count, 0);
        assert_eq!(persisted.daily_penalty_level, 1);
        assert_eq!(persisted.last_reset_day_of_year, day_of_year(&today));
    }

    #[test]
    fn rollover_before_start_session() {
        let record = PenaltyRecord {
            strike_count: 2,
            daily_penalty_level: 5,
            lockout_end_time: 0,
            last_session_end_time: 1_000,
            last_reset_day_of_year: 10,
        };
        // the gap is tiny, but the day changed: strikes restart from zero
        let (next, _) = record.rolled_over(11).start_session(60, 1_500);
        assert_eq!(next.strike_count, 1);
        assert_eq!(next.daily_penalty_level, 1);
        assert_eq!(next.lockout_end_time, 0);

        // same day keeps counting
        let (same_day, _) = record.rolled_over(10).start_session(60, 1_500);
        assert_eq!(same_day.strike_count, 3);
        assert_eq!(same_day.daily_penalty_level, 6);
        assert_eq!(same_day.lockout_end_time, 61_500 + 60_000 * 6);
    }

    #[test]
    fn zero_duration_rejected() {
        let t = tracker();
        let err = t
            .start_session(&PackageId::new("com.a"), 0, &at(8, 0, 0))
            .unwrap_err();
        assert!(matches!(err, SysblockError::InvalidDuration(0)));
    }

    #[test]
    fn record_uses_camel_case_on_disk() {
        let json = serde_json::to_value(PenaltyRecord::default()).unwrap();
        assert_eq!(json["dailyPenaltyLevel"], 1);
        assert_eq!(json["lastResetDayOfYear"], 0);
        assert!(json.get("strikeCount").is_some());
    }
}
