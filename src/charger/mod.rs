//! Charger cloud client module
//!
//! Provides the capability interface the bridge polls and commands, plus the
//! Easee implementation of it.

pub mod easee;
pub mod types;

pub use easee::EaseeCharger;
pub use types::*;

use crate::errors::ChargerError;

/// What the bridge needs from a charger backend
pub trait Charger {
    /// Vendor charger id
    fn id(&self) -> &str;

    /// Poll the current state, decoded for the engine and raw for reports.
    fn fetch_state(&self) -> Result<ChargerState, ChargerError>;

    fn send_command(&self, command: ChargerCommand) -> Result<(), ChargerError>;
}
