//! Enforcement core for sysblockd
//!
//! This crate contains:
//! - Penalty state machine (strikes, lockouts, daily escalation)
//! - Freeze windows over the rule text and the guarded save
//! - Tamper guard for the settings screens
//! - Session watchdog (Idle -> Monitoring -> Blocked/Idle) and its timer
//! - The [`Enforcer`] that dispatches foreground events

mod config_cache;
mod engine;
mod events;
mod freeze;
mod penalty;
mod security;
mod timer;
mod watchdog;

pub use config_cache::*;
pub use engine::*;
pub use events::*;
pub use freeze::*;
pub use penalty::*;
pub use security::*;
pub use timer::*;
pub use watchdog::*;
