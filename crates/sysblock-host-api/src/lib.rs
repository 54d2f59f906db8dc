//! Platform collaborator traits for sysblockd
//!
//! The enforcement core never touches the OS directly. Everything it needs
//! from the device (usage minutes, putting a blocking screen up, drawing
//! the countdown overlay, going home) goes through the traits here. This
//! crate contains no platform code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
