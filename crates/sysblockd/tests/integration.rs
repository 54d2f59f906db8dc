//! Integration tests for sysblockd
//!
//! These drive the enforcer the way the service loop does: foreground
//! events, session starts, timer ticks and rule edits against a real
//! SQLite store and a recording host.

use chrono::{DateTime, Local, TimeZone};
use std::sync::Arc;
use sysblock_api::{ForegroundEvent, ForegroundOutcome, LineRange, NewFreezeRule};
use sysblock_core::{
    BlockCause, Enforcer, EnforcerSettings, FreezeError, ManualTicks, SaveError, TickOutcome,
};
use sysblock_host_api::{HostCall, MockHost};
use sysblock_store::{Namespace, SqliteStore, Store, RAW_CONFIG_KEY};
use sysblock_util::{to_millis, PackageId};

const PKG: &str = "com.example.app";

struct Daemon {
    enforcer: Enforcer,
    store: Arc<dyn Store>,
    host: MockHost,
    ticks: ManualTicks,
}

impl Daemon {
    fn with_store(store: Arc<dyn Store>) -> Self {
        let host = MockHost::new();
        let ticks = ManualTicks::new();
        let enforcer = Enforcer::new(
            store.clone(),
            Arc::new(host.clone()),
            Box::new(ticks.clone()),
            EnforcerSettings::default(),
        );
        Self {
            enforcer,
            store,
            host,
            ticks,
        }
    }

    /// Rule text goes straight into the store, bypassing the editor's validator
    fn seeded(rule_text: &str) -> Self {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        store.set(Namespace::Prefs, RAW_CONFIG_KEY, rule_text).unwrap();
        Self::with_store(store)
    }

    fn open(&mut self, pkg: &str, now: &DateTime<Local>) -> ForegroundOutcome {
        self.enforcer
            .handle_foreground(&ForegroundEvent::window_changed(pkg), now)
    }

    fn tick(&mut self, now: &DateTime<Local>) -> TickOutcome {
        let tick = self.ticks.pending().expect("timer should be running");
        self.enforcer.on_tick(tick, now)
    }
}

fn day(d: u32, h: u32, m: u32, s: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 5, d, h, m, s).unwrap()
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
    day(20, h, m, s)
}

#[test]
fn test_rapid_restarts_lock_out() {
    let mut d = Daemon::seeded("SET | APPLOCK | com.example.app | 1m");
    let pkg = PackageId::new(PKG);

    let first = d.enforcer.start_session(&pkg, 60, &at(9, 0, 0)).unwrap();
    assert_eq!(first.strike_count, 1);
    assert_eq!(first.lockout_end_time, 0);

    let second = d.enforcer.start_session(&pkg, 60, &at(9, 0, 30)).unwrap();
    assert_eq!(second.strike_count, 2);
    let status = d.enforcer.penalty_status(&pkg, &at(9, 0, 45)).unwrap();
    assert!(status.is_penalty_imminent);
    assert_eq!(status.next_multiplier, 2);

    let third = d.enforcer.start_session(&pkg, 60, &at(9, 1, 0)).unwrap();
    assert_eq!(third.strike_count, 3);
    assert_eq!(third.expires_at, to_millis(&at(9, 2, 0)));
    assert_eq!(third.lockout_end_time, third.expires_at + 60_000 * 2);

    // ticket still valid
    assert_eq!(d.open(PKG, &at(9, 1, 30)), ForegroundOutcome::Monitoring);
    d.open("com.android.launcher", &at(9, 1, 40));

    // ticket spent, lockout running
    d.host.take_calls();
    assert_eq!(d.open(PKG, &at(9, 3, 0)), ForegroundOutcome::BlockScreen);
    assert_eq!(d.host.block_screens(), vec![pkg.clone()]);

    // lockout served: the next escalation uses a bigger multiplier
    let status = d.enforcer.penalty_status(&pkg, &at(9, 5, 0)).unwrap();
    assert_eq!(status.strike_count, 0);
    assert_eq!(status.next_multiplier, 3);

    d.enforcer.start_session(&pkg, 60, &at(9, 5, 0)).unwrap();
    d.enforcer.start_session(&pkg, 60, &at(9, 5, 10)).unwrap();
    let again = d.enforcer.start_session(&pkg, 60, &at(9, 5, 20)).unwrap();
    assert_eq!(again.lockout_end_time, again.expires_at + 60_000 * 3);
}

#[test]
fn test_day_rollover_forgives_penalties() {
    let mut d = Daemon::seeded("SET | APPLOCK | com.example.app | 1m");
    let pkg = PackageId::new(PKG);

    for s in [0, 20, 40] {
        d.enforcer.start_session(&pkg, 60, &day(20, 23, 50, s)).unwrap();
    }
    assert_eq!(d.open(PKG, &day(20, 23, 53, 0)), ForegroundOutcome::BlockScreen);

    let next_morning = day(21, 0, 0, 30);
    let status = d.enforcer.penalty_status(&pkg, &next_morning).unwrap();
    assert_eq!(status.strike_count, 0);
    assert_eq!(status.lockout_end_time, 0);
    assert_eq!(status.next_multiplier, 2);

    let grant = d.enforcer.start_session(&pkg, 60, &next_morning).unwrap();
    assert_eq!(grant.lockout_end_time, 0);
    assert_eq!(d.open(PKG, &day(21, 0, 0, 31)), ForegroundOutcome::Monitoring);
}

#[test]
fn test_watchdog_warns_then_blocks() {
    let mut d = Daemon::seeded("SET | APPLOCK | com.example.app | 1m");
    let pkg = PackageId::new(PKG);

    assert_eq!(d.open(PKG, &at(9, 0, 0)), ForegroundOutcome::BlockScreen);
    d.enforcer.start_session(&pkg, 60, &at(9, 0, 5)).unwrap();
    assert_eq!(d.open(PKG, &at(9, 0, 6)), ForegroundOutcome::Monitoring);
    d.host.take_calls();

    assert_eq!(d.tick(&at(9, 0, 30)), TickOutcome::Continue);
    assert_eq!(
        d.tick(&at(9, 0, 55)),
        TickOutcome::Warned {
            remaining_ms: 10_000
        }
    );
    assert_eq!(
        d.tick(&at(9, 1, 5)),
        TickOutcome::Blocked {
            package_id: pkg.clone(),
            cause: BlockCause::SessionExpired
        }
    );

    assert_eq!(
        d.host.calls(),
        vec![
            HostCall::ShowWarning {
                remaining_ms: 10_000,
                threshold_ms: 15_000
            },
            HostCall::HideOverlay,
            HostCall::LaunchBlockScreen(pkg),
        ]
    );
    assert!(d.ticks.pending().is_none());
    assert!(d.enforcer.monitored().is_none());
}

#[test]
fn test_daily_limit_overrides_ticket() {
    let mut d = Daemon::seeded("SET | APPLOCK | com.example.app | 1m");
    let pkg = PackageId::new(PKG);
    d.enforcer.start_session(&pkg, 600, &at(9, 0, 0)).unwrap();
    d.open(PKG, &at(9, 0, 1));

    d.host.set_usage(PKG, 1);
    assert_eq!(
        d.tick(&at(9, 0, 2)),
        TickOutcome::Blocked {
            package_id: pkg,
            cause: BlockCause::OverLimit
        }
    );
}

#[test]
fn test_tamper_guard_sends_home() {
    let mut d = Daemon::seeded("PREVENT_UNINSTALL\nSET | APPLOCK | com.example.app | 30m");

    let event = ForegroundEvent::content_changed("com.android.settings")
        .with_class("com.android.settings.DeviceAdminSettings");
    assert_eq!(
        d.enforcer.handle_foreground(&event, &at(9, 0, 0)),
        ForegroundOutcome::TamperBlocked
    );
    assert_eq!(d.host.calls()[0], HostCall::NavigateHome);
}

#[test]
fn test_freeze_window_gates_edits() {
    let original = "SET | MASTER_SWITCH | true\nSET | APPLOCK | com.example.app | 30m";
    let mut d = Daemon::seeded(original);

    let rule = d
        .enforcer
        .add_freeze_rule(
            NewFreezeRule {
                start_hour: 8,
                start_minute: 0,
                end_hour: 9,
                end_minute: 0,
                start_line: 2,
                end_line: 2,
            },
            &at(12, 0, 0),
        )
        .unwrap();

    assert_eq!(
        d.enforcer.frozen_ranges(&at(12, 0, 0)).unwrap(),
        vec![LineRange::new(2, 2)]
    );
    assert!(d.enforcer.frozen_ranges(&at(8, 30, 0)).unwrap().is_empty());

    let loosened = "SET | MASTER_SWITCH | true\nSET | APPLOCK | com.example.app | 90m";
    assert!(matches!(
        d.enforcer.save_config(loosened, &at(12, 0, 0)),
        Err(SaveError::FrozenLine { line: 2 })
    ));

    // appending below the frozen block is fine
    let appended = format!("{}\nSET | APPLOCK | com.other.app | 20m", original);
    let summary = d.enforcer.save_config(&appended, &at(12, 0, 0)).unwrap();
    assert_eq!(summary.rule_count, 2);

    // rules can only be changed inside their own window
    assert!(matches!(
        d.enforcer.toggle_freeze_rule(rule.id, &at(12, 0, 0)),
        Err(FreezeError::WindowClosed(_))
    ));
    let toggled = d.enforcer.toggle_freeze_rule(rule.id, &at(8, 15, 0)).unwrap();
    assert!(!toggled.is_enabled);
    assert!(d.enforcer.frozen_ranges(&at(12, 0, 0)).unwrap().is_empty());
}

#[test]
fn test_saved_rules_reach_enforcement() {
    let mut d = Daemon::seeded("SET | APPLOCK | com.example.app | 30m");
    let mut changes = d.store.subscribe();

    assert_eq!(d.open("com.game", &at(9, 0, 0)), ForegroundOutcome::Unrestricted);

    d.enforcer
        .save_config(
            "SET | APPLOCK | com.example.app | 30m\nSET | APPLOCK | com.game | 15m",
            &at(9, 0, 1),
        )
        .unwrap();
    while let Ok(change) = changes.try_recv() {
        d.enforcer.on_store_change(&change);
    }

    assert_eq!(d.open("com.game", &at(9, 0, 2)), ForegroundOutcome::BlockScreen);
}

#[test]
fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("sysblock.db");
    let pkg = PackageId::new(PKG);

    {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db).unwrap());
        store
            .set(Namespace::Prefs, RAW_CONFIG_KEY, "SET | APPLOCK | com.example.app | 1m")
            .unwrap();
        let mut d = Daemon::with_store(store);
        d.enforcer.start_session(&pkg, 60, &at(9, 0, 0)).unwrap();
        d.enforcer.start_session(&pkg, 60, &at(9, 0, 20)).unwrap();
        d.enforcer.shutdown();
    }

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db).unwrap());
    let mut d = Daemon::with_store(store);
    let status = d.enforcer.penalty_status(&pkg, &at(9, 0, 30)).unwrap();
    assert_eq!(status.strike_count, 2);
    assert!(status.is_penalty_imminent);

    // the ticket granted before the restart still admits the app
    assert_eq!(d.open(PKG, &at(9, 0, 40)), ForegroundOutcome::Monitoring);
}
