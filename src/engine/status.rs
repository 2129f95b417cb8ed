//! Vendor operating code normalization
//!
//! Maps the charger's operating mode and "reason for no current" codes onto
//! vendor-independent connector status tags and connectivity flags.

use std::fmt;

use serde::Serialize;
use tracing::warn;

/// Coarse connector state, following the IEC 61851 control pilot letters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChargerStatus {
    /// No vehicle connected
    #[serde(rename = "statusA")]
    A,
    /// Vehicle connected, not charging
    #[serde(rename = "statusB")]
    B,
    /// Charging
    #[serde(rename = "statusC")]
    C,
    /// Charger offline or in error
    #[serde(rename = "statusF")]
    F,
}

impl fmt::Display for ChargerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            ChargerStatus::A => "A",
            ChargerStatus::B => "B",
            ChargerStatus::C => "C",
            ChargerStatus::F => "F",
        };
        f.write_str(letter)
    }
}

/// Output of [`normalize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalized {
    /// `None` for operating modes the table does not know
    pub status: Option<ChargerStatus>,
    pub is_connected: bool,
    pub is_charging_by_mode: bool,
    /// Charging permission derived from the reason code. Informational only.
    pub is_charging_by_reason: bool,
}

/// Operating modes after which a session counts as finished
pub const OP_MODE_DISCONNECTED: i32 = 1;
pub const OP_MODE_COMPLETED: i32 = 4;

fn map_op_mode(op_mode: i32) -> Option<(ChargerStatus, bool, bool)> {
    // (status, connected, charging)
    let mapped = match op_mode {
        0 => (ChargerStatus::F, false, false), // offline
        1 => (ChargerStatus::A, false, false), // disconnected
        2 => (ChargerStatus::B, true, true),   // awaiting start
        3 => (ChargerStatus::C, true, true),   // charging
        4 => (ChargerStatus::B, true, false),  // completed
        5 => (ChargerStatus::F, false, false), // error
        6 => (ChargerStatus::B, true, true),   // ready to charge
        _ => return None,
    };
    Some(mapped)
}

fn map_reason_code(reason_code: i32) -> Option<bool> {
    match reason_code {
        // OK, waiting in queue, or limited by circuit, equalizer, charger or car
        0..=6 | 25..=30 | 77 | 80 | 81 => Some(true),
        // No car, limits too low, schedule, car finished, undefined error
        50 | 51 | 52 | 54 | 76 | 79 | 82 | 100 => Some(false),
        _ => None,
    }
}

/// Normalize vendor operating mode and reason code.
///
/// Unknown codes are not errors: they are logged and fall back to
/// `is_connected = true` (unknown mode) and "not charging" (unknown reason)
/// so the poll loop keeps running across vendor payload changes. A missing
/// reason code takes the unknown-code path.
pub fn normalize(op_mode: i32, reason_code: Option<i32>) -> Normalized {
    let (status, is_connected, is_charging_by_mode) = match map_op_mode(op_mode) {
        Some((status, connected, charging)) => (Some(status), connected, charging),
        None => {
            warn!("Unknown charger opMode: {}", op_mode);
            (None, true, false)
        }
    };

    let is_charging_by_reason = match reason_code {
        Some(code) => map_reason_code(code).unwrap_or_else(|| {
            warn!("Unknown charger reasonForNoCurrent: {}", code);
            false
        }),
        None => {
            warn!("Charger state has no reasonForNoCurrent");
            false
        }
    };

    Normalized {
        status,
        is_connected,
        is_charging_by_mode,
        is_charging_by_reason,
    }
}
