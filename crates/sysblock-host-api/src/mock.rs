//! Recording host for tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use sysblock_util::PackageId;

use crate::{
    BlockScreenLauncher, HostAdapter, HostError, HostResult, OverlayRenderer, SystemNavigator,
    UsageProvider,
};

/// A call made against [`MockHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    LaunchBlockScreen(PackageId),
    ShowWarning { remaining_ms: u64, threshold_ms: u64 },
    HideOverlay,
    NavigateHome,
    ShowNotice(String),
}

/// Host double that records every directive and serves canned usage.
///
/// Clones share state, so a test can keep one handle while the enforcer
/// owns another.
#[derive(Clone, Default)]
pub struct MockHost {
    calls: Arc<Mutex<Vec<HostCall>>>,
    usage: Arc<Mutex<HashMap<PackageId, u32>>>,

    /// Make every usage query fail
    pub fail_usage: Arc<Mutex<bool>>,

    /// Make navigate_home fail
    pub fail_navigation: Arc<Mutex<bool>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_usage(&self, package_id: impl Into<PackageId>, minutes: u32) {
        lock(&self.usage).insert(package_id.into(), minutes);
    }

    pub fn set_fail_usage(&self, fail: bool) {
        *lock(&self.fail_usage) = fail;
    }

    pub fn set_fail_navigation(&self, fail: bool) {
        *lock(&self.fail_navigation) = fail;
    }

    pub fn calls(&self) -> Vec<HostCall> {
        lock(&self.calls).clone()
    }

    /// Drain recorded calls
    pub fn take_calls(&self) -> Vec<HostCall> {
        std::mem::take(&mut *lock(&self.calls))
    }

    pub fn block_screens(&self) -> Vec<PackageId> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                HostCall::LaunchBlockScreen(pkg) => Some(pkg.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: HostCall) {
        lock(&self.calls).push(call);
    }
}

impl UsageProvider for MockHost {
    fn daily_usage_minutes(&self, package_id: &PackageId) -> HostResult<u32> {
        if *lock(&self.fail_usage) {
            return Err(HostError::Internal("mock usage failure".into()));
        }
        Ok(lock(&self.usage).get(package_id).copied().unwrap_or(0))
    }
}

impl BlockScreenLauncher for MockHost {
    fn launch_block_screen(&self, package_id: &PackageId) -> HostResult<()> {
        self.record(HostCall::LaunchBlockScreen(package_id.clone()));
        Ok(())
    }
}

impl OverlayRenderer for MockHost {
    fn show_warning(&self, remaining_ms: u64, threshold_ms: u64) -> HostResult<()> {
        self.record(HostCall::ShowWarning {
            remaining_ms,
            threshold_ms,
        });
        Ok(())
    }

    fn hide(&self) -> HostResult<()> {
        self.record(HostCall::HideOverlay);
        Ok(())
    }
}

impl SystemNavigator for MockHost {
    fn navigate_home(&self) -> HostResult<()> {
        if *lock(&self.fail_navigation) {
            return Err(HostError::NotConnected);
        }
        self.record(HostCall::NavigateHome);
        Ok(())
    }

    fn show_notice(&self, message: &str) -> HostResult<()> {
        self.record(HostCall::ShowNotice(message.to_string()));
        Ok(())
    }
}

impl HostAdapter for MockHost {}
