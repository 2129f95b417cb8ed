//! Telemetry normalization and energy accounting
//!
//! Turns raw charger telemetry into a canonical state: equivalent current,
//! integrated session/hourly energy, normalized status flags and a change
//! flag. Performs no I/O; the caller drives it once per poll.

pub mod change;
pub mod energy;
pub mod phase;
pub mod status;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

pub use change::ChangeDetector;
pub use energy::{EnergyIntegrator, EnergySeed, DEFAULT_VOLTAGE};
pub use phase::{PhaseCount, PhaseEstimate, Topology};
pub use status::{ChargerStatus, Normalized};

use crate::errors::EngineError;

/// Electrical installation the charger is wired into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkConfig {
    pub topology: Topology,
    /// Advisory only; the live phase count is derived per sample.
    pub phase_count: PhaseCount,
    /// A
    pub min_charging_current: f64,
}

impl NetworkConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if !self.min_charging_current.is_finite() || self.min_charging_current < 0.0 {
            return Err(EngineError::OutOfRangeThreshold(self.min_charging_current));
        }
        Ok(())
    }
}

/// One poll worth of vendor telemetry, already decoded
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub timestamp: DateTime<Utc>,
    /// Per-phase conductor currents in A
    pub l1: f64,
    pub l2: f64,
    pub l3: f64,
    /// V, [`DEFAULT_VOLTAGE`] is assumed when missing
    pub voltage: Option<f64>,
    pub op_mode: i32,
    /// `None` when the vendor omitted it; treated as an unknown code
    pub reason_code: Option<i32>,
    // Vendor-reported figures; compared and published, never integrated
    pub total_power: Option<f64>,
    pub session_energy: Option<f64>,
    pub energy_per_hour: Option<f64>,
    pub output_current: Option<f64>,
    pub latest_pulse: Option<DateTime<Utc>>,
}

/// Fields compared by the change detector
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub time_stamp: DateTime<Utc>,
    pub latest_pulse: Option<DateTime<Utc>>,
    pub op_mode: i32,
    #[serde(rename = "noCurrentCode")]
    pub reason_code: Option<i32>,
    #[serde(rename = "chargerMode")]
    pub status: Option<ChargerStatus>,
    pub is_connected: bool,
    pub is_charging_active: bool,
    pub is_charging_finished: bool,
    /// A
    pub actual_current: f64,
    /// V
    pub voltage: f64,
    /// Vendor-reported kW
    pub total_power: Option<f64>,
    /// Vendor-reported session kWh, serialized as `sessionEnergy`
    #[serde(rename = "sessionEnergy")]
    pub vendor_session_energy: Option<f64>,
    pub energy_per_hour: Option<f64>,
    pub output_current: Option<f64>,
}

/// Normalized charger state handed to publishers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalState {
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
    /// kW
    pub power: f64,
    /// kWh since the session started
    #[serde(rename = "realtimeEnergy")]
    pub session_energy: f64,
    /// kWh since the last hourly reset
    pub hourly_energy: f64,
}

/// Result of [`TelemetryEngine::ingest`]
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub state: CanonicalState,
    /// Whether any compared field differs from the previous ingest.
    ///
    /// The timestamp is compared too, so with live polling this is true on
    /// practically every call.
    pub changed: bool,
}

/// Per-charger engine. Needs `&mut self` for every write, one writer at a time.
#[derive(Debug)]
pub struct TelemetryEngine {
    network: NetworkConfig,
    energy: EnergyIntegrator,
    detector: ChangeDetector<StatusSnapshot>,
    latest: Option<CanonicalState>,
}

impl TelemetryEngine {
    /// Create an engine seeded with persisted energy counters.
    pub fn new(network: NetworkConfig, seed: EnergySeed) -> Result<Self, EngineError> {
        network.validate()?;
        Ok(Self {
            network,
            energy: EnergyIntegrator::new(network.topology, network.phase_count, seed),
            detector: ChangeDetector::new(),
            latest: None,
        })
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn energy(&self) -> &EnergyIntegrator {
        &self.energy
    }

    /// Equivalent current for the configured topology.
    pub fn estimate_current(&self, l1: f64, l2: f64, l3: f64) -> Result<f64, EngineError> {
        phase::estimate(l1, l2, l3, self.network.topology).map(|e| e.current)
    }

    /// Process one snapshot.
    ///
    /// On error nothing is changed: measurements and ordering are validated
    /// before the accumulator is touched.
    pub fn ingest(&mut self, snapshot: &TelemetrySnapshot) -> Result<Ingested, EngineError> {
        let estimate = phase::estimate(
            snapshot.l1,
            snapshot.l2,
            snapshot.l3,
            self.network.topology,
        )?;
        let voltage = snapshot.voltage.unwrap_or(DEFAULT_VOLTAGE);
        self.energy.set_energy_by_current(
            estimate.current,
            voltage,
            estimate.phases,
            snapshot.timestamp,
        )?;

        let normalized = status::normalize(snapshot.op_mode, snapshot.reason_code);
        let is_charging_active = estimate.current != 0.0;
        if normalized.is_charging_by_reason != is_charging_active {
            debug!(
                "Reason code {:?} says charging={}, measured current {} A",
                snapshot.reason_code, normalized.is_charging_by_reason, estimate.current
            );
        }

        let tracked = StatusSnapshot {
            time_stamp: snapshot.timestamp,
            latest_pulse: snapshot.latest_pulse,
            op_mode: snapshot.op_mode,
            reason_code: snapshot.reason_code,
            status: normalized.status,
            is_connected: normalized.is_connected,
            is_charging_active,
            is_charging_finished: snapshot.op_mode == status::OP_MODE_COMPLETED
                || snapshot.op_mode == status::OP_MODE_DISCONNECTED,
            actual_current: estimate.current,
            voltage,
            total_power: snapshot.total_power,
            vendor_session_energy: snapshot.session_energy,
            energy_per_hour: snapshot.energy_per_hour,
            output_current: snapshot.output_current,
        };
        let changed = self.detector.ingest(tracked.clone());

        let state = CanonicalState {
            snapshot: tracked,
            power: self.energy.power(),
            session_energy: self.energy.session_energy(),
            hourly_energy: self.energy.hourly_energy(),
        };
        self.latest = Some(state.clone());

        Ok(Ingested { state, changed })
    }

    /// Last ingested state with power and energy read fresh from the
    /// accumulator, so resets since the last ingest are visible.
    ///
    /// # Errors
    /// [`EngineError::NotInitialized`] until the first successful ingest.
    pub fn latest_state(&self) -> Result<CanonicalState, EngineError> {
        let mut state = self.latest.clone().ok_or(EngineError::NotInitialized)?;
        state.power = self.energy.power();
        state.session_energy = self.energy.session_energy();
        state.hourly_energy = self.energy.hourly_energy();
        Ok(state)
    }

    /// Zero the session counter at the end of a charging session.
    pub fn reset_session(&mut self) {
        self.energy.set_session_energy(0.0);
    }

    /// Zero the hourly counter and return the energy of the closed hour.
    pub fn reset_hourly(&mut self) -> f64 {
        let closed = self.energy.hourly_energy();
        self.energy.set_hourly_energy(0.0);
        closed
    }
}
