//! Host collaborator traits

use sysblock_util::PackageId;
use thiserror::Error;

/// Errors from host collaborator calls
#[derive(Debug, Error)]
pub enum HostError {
    /// The usage source has no figure for the package yet
    #[error("Usage unavailable for {0}")]
    UsageUnavailable(PackageId),

    /// Nobody is connected to carry out the directive
    #[error("Host not connected")]
    NotConnected,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<HostError> for sysblock_util::SysblockError {
    fn from(e: HostError) -> Self {
        sysblock_util::SysblockError::host(e.to_string())
    }
}

pub type HostResult<T> = Result<T, HostError>;

/// Daily foreground time per package
pub trait UsageProvider: Send + Sync {
    /// Minutes of foreground time since local midnight
    fn daily_usage_minutes(&self, package_id: &PackageId) -> HostResult<u32>;
}

/// Puts the gatekeeper screen in front of a package
pub trait BlockScreenLauncher: Send + Sync {
    fn launch_block_screen(&self, package_id: &PackageId) -> HostResult<()>;
}

/// Countdown overlay drawn over the monitored app
pub trait OverlayRenderer: Send + Sync {
    fn show_warning(&self, remaining_ms: u64, threshold_ms: u64) -> HostResult<()>;

    fn hide(&self) -> HostResult<()>;
}

/// System navigation primitives used by the tamper guard
pub trait SystemNavigator: Send + Sync {
    fn navigate_home(&self) -> HostResult<()>;

    /// Short transient message for the user
    fn show_notice(&self, message: &str) -> HostResult<()>;
}

/// Everything the enforcer needs from the platform
pub trait HostAdapter: UsageProvider + BlockScreenLauncher + OverlayRenderer + SystemNavigator {
    /// Whether the platform side is connected and answering
    fn is_healthy(&self) -> bool {
        true
    }
}
