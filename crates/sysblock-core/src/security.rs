//! Tamper guard for the system settings screens
//!
//! Best-effort text matching over whatever the settings app shows. The
//! substrings are tuned for English UI strings, so this is a deterrent and
//! not a security boundary.

use sysblock_api::ForegroundEvent;
use sysblock_config::SystemConfig;
use sysblock_host_api::SystemNavigator;
use sysblock_util::PackageId;
use tracing::{info, warn};

/// Notice shown after bouncing the user out of a protected screen
pub const TAMPER_NOTICE: &str = "Disable PREVENT_UNINSTALL first";

const SETTINGS_PACKAGE: &str = "com.android.settings";

/// Class hints of screens that may list this app without being a threat
const SAFE_CLASS_HINTS: [&str; 2] = ["accessibilitysettings", "manageapplications"];

/// Why a screen was judged hostile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Revoking the usage statistics grant
    UsageAccess,
    /// Revoking device administrator protection
    DeviceAdmin,
    /// A settings page about this app itself (uninstall, force stop)
    SelfReference,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::UsageAccess => "usage_access",
            BlockReason::DeviceAdmin => "device_admin",
            BlockReason::SelfReference => "self_reference",
        }
    }
}

/// How this app appears on screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfIdentity {
    pub package: String,
    pub name: String,
}

impl SelfIdentity {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }
}

/// Settings, package installer and permission controller
pub fn is_settings_package(package_id: &PackageId) -> bool {
    package_id.as_str() == SETTINGS_PACKAGE
        || package_id.contains("packageinstaller")
        || package_id.contains("permissioncontroller")
}

/// Decide whether the event shows a protected screen. First match wins.
pub fn classify(
    event: &ForegroundEvent,
    config: &SystemConfig,
    identity: &SelfIdentity,
) -> Option<BlockReason> {
    if !config.tamper_protection_active() || !is_settings_package(&event.package_id) {
        return None;
    }

    let text = event.visible_text.to_lowercase();
    let class = event.class_hint.to_lowercase();

    if text.contains("usage access")
        || class.contains("usageaccess")
        || class.contains("usage access")
    {
        return Some(BlockReason::UsageAccess);
    }

    if class.contains("deviceadmin") || class.contains("device admin") {
        return Some(BlockReason::DeviceAdmin);
    }

    let mentions_self = [&identity.name, &identity.package]
        .iter()
        .any(|needle| !needle.is_empty() && text.contains(&needle.to_lowercase()));
    if mentions_self && !SAFE_CLASS_HINTS.iter().any(|safe| class.contains(safe)) {
        return Some(BlockReason::SelfReference);
    }

    None
}

/// Classifies foreground events and pushes the user home on a hit
pub struct SecurityGuard {
    identity: SelfIdentity,
}

impl SecurityGuard {
    pub fn new(identity: SelfIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &SelfIdentity {
        &self.identity
    }

    /// Returns the reason when the screen was blocked. A navigation failure
    /// counts as not blocked so the rest of the dispatch still runs.
    pub fn check<N: SystemNavigator + ?Sized>(
        &self,
        event: &ForegroundEvent,
        config: &SystemConfig,
        navigator: &N,
    ) -> Option<BlockReason> {
        let reason = classify(event, config, &self.identity)?;

        if let Err(e) = navigator.navigate_home() {
            warn!(package = %event.package_id, error = %e, "Tamper guard could not navigate home");
            return None;
        }
        if let Err(e) = navigator.show_notice(TAMPER_NOTICE) {
            warn!(error = %e, "Tamper notice not shown");
        }

        info!(
            package = %event.package_id,
            reason = reason.as_str(),
            "Blocked protected settings screen"
        );
        Some(reason)
    }
}
