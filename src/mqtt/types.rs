use serde::Serialize;

use crate::control::ControlState;
use crate::engine::CanonicalState;

/// Body of the `sensor/state` topic: the canonical state plus control flags
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload<'a> {
    #[serde(flatten)]
    pub state: &'a CanonicalState,
    /// kWh of the last closed hour
    pub last_hour_energy: f64,
    pub is_below_threshold: Option<bool>,
    pub force_on_state: bool,
    pub force_off_state: bool,
    pub charge_allowed: bool,
}

impl<'a> StatePayload<'a> {
    pub fn new(state: &'a CanonicalState, control: &ControlState, last_hour_energy: f64) -> Self {
        Self {
            state,
            last_hour_energy,
            is_below_threshold: control.below_threshold,
            force_on_state: control.is_forced_on(),
            force_off_state: control.is_forced_off(),
            charge_allowed: control.charge_allowed(),
        }
    }
}
