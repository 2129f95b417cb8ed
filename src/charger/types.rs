//! Charger data types
//!
//! Vendor response shapes and the commands the bridge can send.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::engine::TelemetrySnapshot;

/// One poll result
#[derive(Debug, Clone)]
pub struct ChargerState {
    pub snapshot: TelemetrySnapshot,
    /// Vendor response as received, for debug reports
    pub raw: serde_json::Value,
}

/// Remote charging commands accepted on the control topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargerCommand {
    Pause,
    Resume,
    Start,
    Stop,
    Toggle,
}

impl ChargerCommand {
    /// Easee command endpoint name
    pub fn endpoint(&self) -> &'static str {
        match self {
            ChargerCommand::Pause => "pause_charging",
            ChargerCommand::Resume => "resume_charging",
            ChargerCommand::Start => "start_charging",
            ChargerCommand::Stop => "stop_charging",
            ChargerCommand::Toggle => "toggle_charging",
        }
    }
}

impl FromStr for ChargerCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" | "pause_charging" => Ok(ChargerCommand::Pause),
            "resume" | "resume_charging" => Ok(ChargerCommand::Resume),
            "start" | "start_charging" => Ok(ChargerCommand::Start),
            "stop" | "stop_charging" => Ok(ChargerCommand::Stop),
            "toggle" | "toggle_charging" => Ok(ChargerCommand::Toggle),
            other => Err(format!("Unknown charger command '{}'", other)),
        }
    }
}

impl std::fmt::Display for ChargerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// `GET /chargers/{id}/state` response, only the fields the bridge reads
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EaseeState {
    pub charger_op_mode: i32,
    pub reason_for_no_current: Option<i32>,
    pub total_power: Option<f64>,
    pub session_energy: Option<f64>,
    pub energy_per_hour: Option<f64>,
    pub output_current: Option<f64>,
    pub voltage: Option<f64>,
    #[serde(rename = "circuitTotalPhaseConductorCurrentL1")]
    pub phase_current_l1: Option<f64>,
    #[serde(rename = "circuitTotalPhaseConductorCurrentL2")]
    pub phase_current_l2: Option<f64>,
    #[serde(rename = "circuitTotalPhaseConductorCurrentL3")]
    pub phase_current_l3: Option<f64>,
    pub latest_pulse: Option<DateTime<Utc>>,
}

impl EaseeState {
    /// Phase currents are null while idle and read as zero.
    pub fn to_snapshot(&self, timestamp: DateTime<Utc>) -> TelemetrySnapshot {
        TelemetrySnapshot {
            timestamp,
            l1: self.phase_current_l1.unwrap_or(0.0),
            l2: self.phase_current_l2.unwrap_or(0.0),
            l3: self.phase_current_l3.unwrap_or(0.0),
            voltage: self.voltage,
            op_mode: self.charger_op_mode,
            reason_code: self.reason_for_no_current,
            total_power: self.total_power,
            session_energy: self.session_energy,
            energy_per_hour: self.energy_per_hour,
            output_current: self.output_current,
            latest_pulse: self.latest_pulse,
        }
    }
}
