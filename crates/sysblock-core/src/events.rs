//! Core events emitted by the enforcer

use sysblock_api::SessionGrant;
use sysblock_util::PackageId;

use crate::{BlockCause, BlockReason};

/// Things the enforcer did that the service may want to announce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// The live snapshot was replaced
    ConfigReloaded {
        rule_count: usize,
        master_switch: bool,
    },

    /// The gatekeeper granted a session
    SessionGranted(SessionGrant),

    /// The watchdog ended a session
    SessionBlocked {
        package_id: PackageId,
        cause: BlockCause,
    },

    /// A protected settings screen was closed
    TamperBlocked {
        package_id: PackageId,
        reason: BlockReason,
    },
}
