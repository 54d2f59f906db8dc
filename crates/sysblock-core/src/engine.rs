//! Enforcement engine
//!
//! Ties the configuration cache, penalty tracker, freeze manager, tamper
//! guard and session watchdog together behind one single-threaded entry
//! point. The service feeds it foreground events, timer ticks and store
//! changes; it talks back to the platform through [`HostAdapter`].

use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use sysblock_api::{
    EventKind, ForegroundEvent, ForegroundOutcome, FreezeRule, HealthStatus, LineRange,
    NewFreezeRule, PenaltyStatus, SessionGrant, UsageInfo, ValidationSummary,
};
use sysblock_config::{
    validate_rules, SystemConfig, ValidationError, DEFAULT_SELF_NAME, DEFAULT_SELF_PACKAGE,
    DEFAULT_WARNING_THRESHOLD_SECS,
};
use sysblock_host_api::HostAdapter;
use sysblock_store::{
    AuditEvent, AuditEventType, Namespace, Store, StoreChange, StoreError, RAW_CONFIG_KEY,
};
use sysblock_util::{PackageId, SysblockError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    first_frozen_edit, is_settings_package, read_rule_text, ConfigCache, CoreEvent, FreezeError,
    FreezeManager, PenaltyTracker, SecurityGuard, SelfIdentity, SessionWatchdog, Tick,
    TickOutcome, TickSource,
};

/// Launchers, the system shell and this app itself. Opening one of these
/// never triggers enforcement.
pub const IGNORED_PACKAGES: [&str; 8] = [
    "com.android.systemui",
    "android",
    "com.google.android.inputmethod.latin",
    "com.self.sysblock",
    "com.android.launcher",
    "com.google.android.apps.nexuslauncher",
    "com.miui.home",
    "com.sec.android.app.launcher",
];

/// Overlays that float above the foreground app without replacing it
pub fn is_transient_package(package_id: &PackageId) -> bool {
    package_id.as_str() == "com.android.systemui" || package_id.contains("inputmethod")
}

/// Why an edited rule text was not saved
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Line {line} is frozen and cannot be edited right now")]
    FrozenLine { line: usize },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SaveError> for SysblockError {
    fn from(e: SaveError) -> Self {
        match e {
            SaveError::FrozenLine { line } => SysblockError::FrozenLine { line },
            SaveError::Invalid(v) => SysblockError::validation(v.line, v.message),
            SaveError::Store(s) => s.into(),
        }
    }
}

/// Tunables for the enforcer
#[derive(Debug, Clone)]
pub struct EnforcerSettings {
    pub warning_threshold: Duration,
    pub identity: SelfIdentity,
}

impl Default for EnforcerSettings {
    fn default() -> Self {
        Self {
            warning_threshold: Duration::from_secs(DEFAULT_WARNING_THRESHOLD_SECS),
            identity: SelfIdentity::new(DEFAULT_SELF_PACKAGE, DEFAULT_SELF_NAME),
        }
    }
}

pub struct Enforcer {
    store: Arc<dyn Store>,
    host: Arc<dyn HostAdapter>,
    config: ConfigCache,
    penalties: PenaltyTracker,
    freeze: FreezeManager,
    guard: SecurityGuard,
    watchdog: SessionWatchdog,
    events: Vec<CoreEvent>,
}

impl Enforcer {
    pub fn new(
        store: Arc<dyn Store>,
        host: Arc<dyn HostAdapter>,
        ticks: Box<dyn TickSource>,
        settings: EnforcerSettings,
    ) -> Self {
        let config = ConfigCache::load(store.clone());
        let snapshot = config.current();
        info!(
            rules = snapshot.rules.len(),
            master_switch = snapshot.master_switch,
            prevent_uninstall = snapshot.prevent_uninstall,
            "Enforcer initialized"
        );

        Self {
            penalties: PenaltyTracker::new(store.clone()),
            freeze: FreezeManager::new(store.clone()),
            guard: SecurityGuard::new(settings.identity),
            watchdog: SessionWatchdog::new(ticks, settings.warning_threshold),
            config,
            store,
            host,
            events: Vec::new(),
        }
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<SystemConfig> {
        self.config.current()
    }

    /// Package currently under watch, if any
    pub fn monitored(&self) -> Option<&PackageId> {
        self.watchdog.monitored()
    }

    /// Take the events produced since the last call
    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.events)
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to write audit entry");
        }
    }

    fn is_ignored(&self, package_id: &PackageId) -> bool {
        IGNORED_PACKAGES.contains(&package_id.as_str())
            || package_id.as_str() == self.guard.identity().package
    }

    // Foreground dispatch

    /// React to a foreground change reported by the platform
    pub fn handle_foreground(
        &mut self,
        event: &ForegroundEvent,
        now: &DateTime<Local>,
    ) -> ForegroundOutcome {
        let config = self.config.current();
        let package_id = &event.package_id;

        let run_guard = match event.kind {
            EventKind::WindowStateChanged => true,
            EventKind::WindowContentChanged => is_settings_package(package_id),
        };
        if run_guard {
            if let Some(reason) = self.guard.check(event, &config, self.host.as_ref()) {
                self.audit(AuditEventType::TamperBlocked {
                    package_id: package_id.clone(),
                    reason: reason.as_str().to_string(),
                });
                self.events.push(CoreEvent::TamperBlocked {
                    package_id: package_id.clone(),
                    reason,
                });
                return ForegroundOutcome::TamperBlocked;
            }
        }

        if event.kind != EventKind::WindowStateChanged || is_transient_package(package_id) {
            return ForegroundOutcome::Ignored;
        }

        if self.watchdog.is_monitoring() && self.watchdog.monitored() != Some(package_id) {
            self.watchdog.stop_monitoring(self.host.as_ref());
        }

        if self.is_ignored(package_id) {
            return ForegroundOutcome::Ignored;
        }

        if config.enforced_rule(package_id).is_none() {
            return ForegroundOutcome::Unrestricted;
        }

        match self.penalties.is_locked_out(package_id, now) {
            Ok(true) => {
                self.launch_block_screen(package_id, "locked_out");
                return ForegroundOutcome::BlockScreen;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(package = %package_id, error = %e, "Lockout state unreadable, gating");
                self.launch_block_screen(package_id, "state_unreadable");
                return ForegroundOutcome::BlockScreen;
            }
        }

        match self.penalties.has_active_session(package_id, now) {
            Ok(true) => {
                self.watchdog.start_monitoring(package_id, self.host.as_ref());
                ForegroundOutcome::Monitoring
            }
            Ok(false) => {
                self.launch_block_screen(package_id, "no_session");
                ForegroundOutcome::BlockScreen
            }
            Err(e) => {
                warn!(package = %package_id, error = %e, "Session ticket unreadable, gating");
                self.launch_block_screen(package_id, "state_unreadable");
                ForegroundOutcome::BlockScreen
            }
        }
    }

    fn launch_block_screen(&self, package_id: &PackageId, cause: &str) {
        if let Err(e) = self.host.launch_block_screen(package_id) {
            warn!(package = %package_id, error = %e, "Failed to launch block screen");
            return;
        }
        debug!(package = %package_id, cause, "Block screen launched");
        self.audit(AuditEventType::BlockIssued {
            package_id: package_id.clone(),
            cause: cause.to_string(),
        });
    }

    /// Drive the watchdog for one timer period
    pub fn on_tick(&mut self, tick: Tick, now: &DateTime<Local>) -> TickOutcome {
        let config = self.config.current();
        let outcome = self
            .watchdog
            .tick(tick, now, &config, &self.penalties, self.host.as_ref());

        if let TickOutcome::Blocked { package_id, cause } = &outcome {
            self.audit(AuditEventType::BlockIssued {
                package_id: package_id.clone(),
                cause: cause.as_str().to_string(),
            });
            self.events.push(CoreEvent::SessionBlocked {
                package_id: package_id.clone(),
                cause: *cause,
            });
        }
        outcome
    }

    // Gatekeeper

    /// Grant a session for a strictly ruled package
    pub fn start_session(
        &mut self,
        package_id: &PackageId,
        duration_secs: u64,
        now: &DateTime<Local>,
    ) -> Result<SessionGrant, SysblockError> {
        if self.config.current().enforced_rule(package_id).is_none() {
            return Err(SysblockError::NoRule(package_id.clone()));
        }

        let grant = self.penalties.start_session(package_id, duration_secs, now)?;

        self.audit(AuditEventType::SessionStarted {
            package_id: package_id.clone(),
            duration_secs,
            strike_count: grant.strike_count,
            lockout_end_time: grant.lockout_end_time,
        });
        info!(
            package = %package_id,
            duration_secs,
            strikes = grant.strike_count,
            "Session started"
        );
        self.events.push(CoreEvent::SessionGranted(grant.clone()));
        Ok(grant)
    }

    pub fn penalty_status(
        &self,
        package_id: &PackageId,
        now: &DateTime<Local>,
    ) -> Result<PenaltyStatus, SysblockError> {
        Ok(self.penalties.get_status(package_id, now)?)
    }

    pub fn usage_info(&self, package_id: &PackageId) -> Result<UsageInfo, SysblockError> {
        let config = self.config.current();
        let limit_minutes = config
            .rule_for(package_id)
            .map(|r| r.daily_limit_minutes)
            .ok_or_else(|| SysblockError::NoRule(package_id.clone()))?;
        let used_minutes = self.host.daily_usage_minutes(package_id)?;

        Ok(UsageInfo {
            package_id: package_id.clone(),
            used_minutes,
            limit_minutes,
        })
    }

    /// Offered session lengths in seconds
    pub fn session_options(&self) -> Vec<u64> {
        self.config.current().session_options.clone()
    }

    // Rule text

    pub fn rule_text(&self) -> Result<String, SysblockError> {
        Ok(read_rule_text(self.store.as_ref())?)
    }

    pub fn validate_config(&self, text: &str) -> Result<ValidationSummary, ValidationError> {
        validate_rules(text)
    }

    /// Commit an edited rule text: frozen lines untouched, validator
    /// happy, then persisted. The live snapshot follows through the store
    /// change hook.
    pub fn save_config(
        &mut self,
        text: &str,
        now: &DateTime<Local>,
    ) -> Result<ValidationSummary, SaveError> {
        let old = read_rule_text(self.store.as_ref())?;
        let frozen = self.freeze.frozen_ranges(now)?;
        if let Some(line) = first_frozen_edit(&old, text, &frozen) {
            info!(line, "Save rejected, frozen line edited");
            return Err(SaveError::FrozenLine { line });
        }

        let summary = validate_rules(text)?;
        self.store.set(Namespace::Prefs, RAW_CONFIG_KEY, text)?;

        self.audit(AuditEventType::ConfigSaved {
            rule_count: summary.rule_count,
        });
        info!(
            rules = summary.rule_count,
            uninstall_protection = summary.has_uninstall_protection,
            "Configuration saved"
        );
        Ok(summary)
    }

    /// Re-parse the stored rule text into the live snapshot
    pub fn reload_config(&mut self) -> Result<(), StoreError> {
        let config = self.config.reload()?;

        self.audit(AuditEventType::ConfigReloaded {
            rule_count: config.rules.len(),
            master_switch: config.master_switch,
        });
        self.events.push(CoreEvent::ConfigReloaded {
            rule_count: config.rules.len(),
            master_switch: config.master_switch,
        });
        Ok(())
    }

    /// Store change hook. Reloads when the rule text changed.
    pub fn on_store_change(&mut self, change: &StoreChange) {
        if change.namespace != Namespace::Prefs || change.key != RAW_CONFIG_KEY {
            return;
        }
        if let Err(e) = self.reload_config() {
            warn!(error = %e, "Reload failed, keeping last good configuration");
        }
    }

    // Freeze rules

    pub fn freeze_rules(&self) -> Result<Vec<FreezeRule>, SysblockError> {
        Ok(self.freeze.rules()?)
    }

    pub fn frozen_ranges(&self, now: &DateTime<Local>) -> Result<Vec<LineRange>, SysblockError> {
        Ok(self.freeze.frozen_ranges(now)?)
    }

    pub fn add_freeze_rule(
        &mut self,
        request: NewFreezeRule,
        now: &DateTime<Local>,
    ) -> Result<FreezeRule, FreezeError> {
        let line_count = read_rule_text(self.store.as_ref())?.lines().count();
        let rule = self.freeze.add_rule(request, line_count, now)?;

        self.audit(AuditEventType::FreezeRuleAdded {
            rule_id: rule.id,
            start_line: rule.start_line,
            end_line: rule.end_line,
        });
        Ok(rule)
    }

    pub fn toggle_freeze_rule(
        &mut self,
        id: i64,
        now: &DateTime<Local>,
    ) -> Result<FreezeRule, FreezeError> {
        let rule = self.freeze.toggle_rule(id, now)?;
        self.audit(AuditEventType::FreezeRuleToggled {
            rule_id: id,
            enabled: rule.is_enabled,
        });
        Ok(rule)
    }

    pub fn delete_freeze_rule(
        &mut self,
        id: i64,
        now: &DateTime<Local>,
    ) -> Result<(), FreezeError> {
        self.freeze.delete_rule(id, now)?;
        self.audit(AuditEventType::FreezeRuleDeleted { rule_id: id });
        Ok(())
    }

    // Service

    pub fn health(&self) -> HealthStatus {
        let store_ok = self.store.is_healthy();
        HealthStatus {
            live: true,
            ready: store_ok && self.host.is_healthy(),
            config_loaded: true,
            store_ok,
            monitoring: self.watchdog.monitored().cloned(),
        }
    }

    /// Stop monitoring and clear the overlay before the service exits
    pub fn shutdown(&mut self) {
        self.watchdog.stop_monitoring(self.host.as_ref());
        info!("Enforcer shut down");
    }
}
