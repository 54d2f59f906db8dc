//! Host adapter backed by the IPC event stream
//!
//! Directives become [`EventPayload`]s broadcast to subscribed clients; the
//! platform shim carries them out. With no subscriber the host counts as
//! disconnected. Usage minutes flow the other way, pushed
//! by the shim with `ReportUsage` and cached per calendar day.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use sysblock_api::{Event, EventPayload};
use sysblock_host_api::{
    BlockScreenLauncher, HostAdapter, HostError, HostResult, OverlayRenderer, SystemNavigator,
    UsageProvider,
};
use sysblock_util::{day_of_year, PackageId};
use tokio::sync::broadcast;
use tracing::trace;

/// Usage minutes reported today. A report on a new day drops the old figures.
#[derive(Debug, Default)]
pub struct UsageCache {
    day: u32,
    minutes: HashMap<PackageId, u32>,
}

impl UsageCache {
    pub fn record(&mut self, package_id: PackageId, minutes: u32, now: &DateTime<Local>) {
        self.roll(now);
        self.minutes.insert(package_id, minutes);
    }

    /// Minutes reported today; a package with no report today has used none
    pub fn minutes(&mut self, package_id: &PackageId, now: &DateTime<Local>) -> u32 {
        self.roll(now);
        self.minutes.get(package_id).copied().unwrap_or(0)
    }

    fn roll(&mut self, now: &DateTime<Local>) {
        let today = day_of_year(now);
        if self.day != today {
            self.day = today;
            self.minutes.clear();
        }
    }
}

pub struct IpcHost {
    events: broadcast::Sender<Event>,
    subscribers: Arc<AtomicUsize>,
    usage: Mutex<UsageCache>,
}

impl IpcHost {
    pub fn new(events: broadcast::Sender<Event>, subscribers: Arc<AtomicUsize>) -> Self {
        Self {
            events,
            subscribers,
            usage: Mutex::new(UsageCache::default()),
        }
    }

    fn usage(&self) -> MutexGuard<'_, UsageCache> {
        self.usage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn report_usage(&self, package_id: PackageId, minutes: u32) {
        trace!(package = %package_id, minutes, "Usage reported");
        self.usage().record(package_id, minutes, &sysblock_util::now());
    }

    fn listening(&self) -> bool {
        self.subscribers.load(Ordering::SeqCst) > 0
    }

    fn send(&self, payload: EventPayload) -> HostResult<()> {
        if !self.listening() {
            return Err(HostError::NotConnected);
        }
        self.events
            .send(Event::new(payload))
            .map(|_| ())
            .map_err(|_| HostError::NotConnected)
    }
}

impl UsageProvider for IpcHost {
    fn daily_usage_minutes(&self, package_id: &PackageId) -> HostResult<u32> {
        if !self.listening() {
            return Err(HostError::UsageUnavailable(package_id.clone()));
        }
        Ok(self.usage().minutes(package_id, &sysblock_util::now()))
    }
}

impl BlockScreenLauncher for IpcHost {
    fn launch_block_screen(&self, package_id: &PackageId) -> HostResult<()> {
        self.send(EventPayload::LaunchBlockScreen {
            package_id: package_id.clone(),
        })
    }
}

impl OverlayRenderer for IpcHost {
    fn show_warning(&self, remaining_ms: u64, threshold_ms: u64) -> HostResult<()> {
        self.send(EventPayload::ShowWarning {
            remaining_ms,
            threshold_ms,
        })
    }

    fn hide(&self) -> HostResult<()> {
        self.send(EventPayload::HideOverlay)
    }
}

impl SystemNavigator for IpcHost {
    fn navigate_home(&self) -> HostResult<()> {
        self.send(EventPayload::NavigateHome)
    }

    fn show_notice(&self, message: &str) -> HostResult<()> {
        self.send(EventPayload::ShowNotice {
            message: message.to_string(),
        })
    }
}

impl HostAdapter for IpcHost {
    fn is_healthy(&self) -> bool {
        self.listening()
    }
}
