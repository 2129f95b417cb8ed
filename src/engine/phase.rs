//! Equivalent phase current estimation
//!
//! Reduces the three per-phase conductor currents reported by the charger
//! to a single current figure, taking the earthing scheme of the supply
//! network into account.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// A phase carrying more than this (in A) counts as active.
pub const ACTIVE_PHASE_THRESHOLD: f64 = 0.01;

/// Earthing scheme of the supply network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topology {
    Tn,
    Tt,
    It,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::Tn => "TN",
            Topology::Tt => "TT",
            Topology::It => "IT",
        }
    }
}

impl FromStr for Topology {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TN" => Ok(Topology::Tn),
            "TT" => Ok(Topology::Tt),
            "IT" => Ok(Topology::It),
            _ => Err(EngineError::UnsupportedTopology(s.to_string())),
        }
    }
}

impl TryFrom<String> for Topology {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topology> for String {
    fn from(value: Topology) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of phases wired to (or drawn by) the charger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PhaseCount {
    One,
    Two,
    Three,
}

impl PhaseCount {
    pub fn as_u8(&self) -> u8 {
        match self {
            PhaseCount::One => 1,
            PhaseCount::Two => 2,
            PhaseCount::Three => 3,
        }
    }
}

impl TryFrom<u8> for PhaseCount {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PhaseCount::One),
            2 => Ok(PhaseCount::Two),
            3 => Ok(PhaseCount::Three),
            other => Err(EngineError::InvalidPhaseCount(other)),
        }
    }
}

impl From<PhaseCount> for u8 {
    fn from(value: PhaseCount) -> Self {
        value.as_u8()
    }
}

/// Result of [`estimate`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseEstimate {
    /// Equivalent single current in A
    pub current: f64,
    /// Phase count derived from the live measurement
    pub phases: PhaseCount,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Estimate the equivalent current from three phase currents.
///
/// The detected phase count is `Three` only when all three phases are
/// active, regardless of what the installation is configured for: a car
/// may refuse to charge on more than one phase. Anything less is treated
/// as single-phase and reports the first active phase.
///
/// # Errors
/// Returns [`EngineError::InvalidMeasurement`] if any input is NaN or
/// infinite.
pub fn estimate(l1: f64, l2: f64, l3: f64, topology: Topology) -> Result<PhaseEstimate, EngineError> {
    for (field, value) in [("l1", l1), ("l2", l2), ("l3", l3)] {
        if !value.is_finite() {
            return Err(EngineError::InvalidMeasurement { field, value });
        }
    }

    let active: Vec<f64> = [l1, l2, l3]
        .into_iter()
        .map(f64::abs)
        .filter(|i| *i > ACTIVE_PHASE_THRESHOLD)
        .collect();

    let phases = if active.len() == 3 {
        PhaseCount::Three
    } else {
        PhaseCount::One
    };

    let current = match (active.as_slice(), topology) {
        // Neutral conductor current; cancels to zero on a balanced load.
        ([i1, i2, i3], Topology::It) => {
            let squares = i1 * i1 + i2 * i2 + i3 * i3;
            let products = i1 * i2 + i2 * i3 + i3 * i1;
            round2((squares - products).max(0.0).sqrt())
        }
        // Three phases on TN/TT: plain sum, no trigonometric scaling.
        ([i1, i2, i3], _) => i1 + i2 + i3,
        // Single-phase detection: the first active phase carries the charge.
        (magnitudes, _) => magnitudes.first().copied().unwrap_or(0.0),
    };

    Ok(PhaseEstimate { current, phases })
}
