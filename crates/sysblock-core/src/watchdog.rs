//! Session watchdog state machine
//!
//! `Idle -> Monitoring -> {Blocked | Idle}`. While monitoring, each tick
//! re-reads the session ticket, lockout and daily usage for the package and
//! either blocks, warns or keeps quiet.
//!
//! Inside a run the overlay is hidden only when a shown warning clears, not
//! on every quiet tick. Stopping a run always hides it.

use chrono::{DateTime, Local};
use std::time::Duration;
use sysblock_config::SystemConfig;
use sysblock_host_api::{HostAdapter, OverlayRenderer};
use sysblock_util::{to_millis, PackageId};
use tracing::{debug, info, warn};

use crate::{MonitorToken, PenaltyTracker, Tick, TickSource, TokenSource};

/// Why a monitored package was blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCause {
    SessionExpired,
    LockedOut,
    OverLimit,
}

impl BlockCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockCause::SessionExpired => "session_expired",
            BlockCause::LockedOut => "locked_out",
            BlockCause::OverLimit => "over_limit",
        }
    }
}

/// Result of one watchdog tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick belongs to a finished run
    Stale,
    /// Session healthy, overlay hidden
    Continue,
    /// Countdown overlay shown
    Warned { remaining_ms: u64 },
    /// Block screen launched, monitoring ended
    Blocked {
        package_id: PackageId,
        cause: BlockCause,
    },
    /// Some input was unavailable; nothing changed, retry next period
    Skipped,
    /// The package no longer has an enforced rule
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchState {
    Idle,
    Monitoring {
        package_id: PackageId,
        token: MonitorToken,
        overlay_shown: bool,
    },
}

pub struct SessionWatchdog {
    state: WatchState,
    tokens: TokenSource,
    ticks: Box<dyn TickSource>,
    warning_threshold: Duration,
}

impl SessionWatchdog {
    pub fn new(ticks: Box<dyn TickSource>, warning_threshold: Duration) -> Self {
        Self {
            state: WatchState::Idle,
            tokens: TokenSource::new(),
            ticks,
            warning_threshold,
        }
    }

    pub fn monitored(&self) -> Option<&PackageId> {
        match &self.state {
            WatchState::Monitoring { package_id, .. } => Some(package_id),
            WatchState::Idle => None,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitored().is_some()
    }

    /// Begin monitoring `package_id`. Repeating the call for the package
    /// already monitored changes nothing and returns None.
    pub fn start_monitoring<O: OverlayRenderer + ?Sized>(
        &mut self,
        package_id: &PackageId,
        overlay: &O,
    ) -> Option<MonitorToken> {
        if self.monitored() == Some(package_id) {
            return None;
        }
        if self.is_monitoring() {
            self.stop_monitoring(overlay);
        }

        let token = self.tokens.issue();
        self.state = WatchState::Monitoring {
            package_id: package_id.clone(),
            token,
            overlay_shown: false,
        };
        self.ticks.start(token);

        debug!(package = %package_id, token = token.value(), "Monitoring started");
        Some(token)
    }

    /// Cancel the run and hide the overlay, monitoring or not
    pub fn stop_monitoring<O: OverlayRenderer + ?Sized>(&mut self, overlay: &O) {
        self.ticks.stop();
        if let WatchState::Monitoring { package_id, .. } =
            std::mem::replace(&mut self.state, WatchState::Idle)
        {
            debug!(package = %package_id, "Monitoring stopped");
        }
        if let Err(e) = overlay.hide() {
            warn!(error = %e, "Failed to hide overlay");
        }
    }

    /// Run one period for `tick`
    pub fn tick(
        &mut self,
        tick: Tick,
        now: &DateTime<Local>,
        config: &SystemConfig,
        penalties: &PenaltyTracker,
        host: &dyn HostAdapter,
    ) -> TickOutcome {
        let (package_id, overlay_shown) = match &self.state {
            WatchState::Monitoring {
                package_id,
                token,
                overlay_shown,
            } if *token == tick.token => (package_id.clone(), *overlay_shown),
            _ => return TickOutcome::Stale,
        };

        let Some(rule) = config.enforced_rule(&package_id) else {
            self.stop_monitoring(host);
            return TickOutcome::Stopped;
        };

        let now_ms = to_millis(now);
        let (expiry, locked_out) = match (
            penalties.session_expiry(&package_id),
            penalties.is_locked_out(&package_id, now),
        ) {
            (Ok(expiry), Ok(locked)) => (expiry.unwrap_or(0), locked),
            (Err(e), _) | (_, Err(e)) => {
                warn!(package = %package_id, error = %e, "Watchdog could not read penalty state");
                return TickOutcome::Skipped;
            }
        };
        let remaining_ms = expiry - now_ms;

        let usage = host.daily_usage_minutes(&package_id);
        let over_limit = match &usage {
            Ok(used) => rule.daily_limit_minutes > 0 && *used >= rule.daily_limit_minutes,
            Err(_) => false,
        };

        let cause = if remaining_ms <= 0 {
            Some(BlockCause::SessionExpired)
        } else if locked_out {
            Some(BlockCause::LockedOut)
        } else if over_limit {
            Some(BlockCause::OverLimit)
        } else {
            None
        };

        if let Some(cause) = cause {
            self.block(&package_id, cause, host);
            return TickOutcome::Blocked { package_id, cause };
        }

        if let Err(e) = usage {
            debug!(package = %package_id, error = %e, "Usage unavailable, skipping tick");
            return TickOutcome::Skipped;
        }

        let remaining = remaining_ms as u64;
        let threshold = self.warning_threshold.as_millis() as u64;
        if remaining <= threshold {
            if let Err(e) = host.show_warning(remaining, threshold) {
                warn!(error = %e, "Failed to show warning overlay");
            }
            self.set_overlay_shown(true);
            TickOutcome::Warned {
                remaining_ms: remaining,
            }
        } else {
            if overlay_shown {
                if let Err(e) = host.hide() {
                    warn!(error = %e, "Failed to hide overlay");
                }
                self.set_overlay_shown(false);
            }
            TickOutcome::Continue
        }
    }

    fn set_overlay_shown(&mut self, shown: bool) {
        if let WatchState::Monitoring { overlay_shown, .. } = &mut self.state {
            *overlay_shown = shown;
        }
    }

    fn block(&mut self, package_id: &PackageId, cause: BlockCause, host: &dyn HostAdapter) {
        self.stop_monitoring(host);
        if let Err(e) = host.launch_block_screen(package_id) {
            warn!(package = %package_id, error = %e, "Failed to launch block screen");
        }
        info!(package = %package_id, cause = cause.as_str(), "Session blocked");
    }
}
