//! Charging permission from price signals and manual overrides
//!
//! Pure state: every inbound control message produces a new [`ControlState`]
//! via [`ControlState::apply`]. Nothing here talks to the charger.

use serde::Serialize;

/// Manual override set through the override topic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverrideState {
    #[default]
    Auto,
    ForcedOn,
    ForcedOff,
}

/// Inbound control signal, already decoded from its MQTT payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Spot price below the configured threshold
    BelowThreshold(bool),
    /// `Some(true)` forces on, `Some(false)` forces off, `None` clears
    Override(Option<bool>),
    /// A force-off topic became active or inactive
    ForceOff(bool),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub mode: OverrideState,
    /// Unknown until the first price signal arrives
    pub below_threshold: Option<bool>,
}

impl ControlState {
    pub fn apply(self, event: ControlEvent) -> Self {
        match event {
            ControlEvent::BelowThreshold(below) => Self {
                below_threshold: Some(below),
                ..self
            },
            ControlEvent::Override(Some(true)) => Self {
                mode: OverrideState::ForcedOn,
                ..self
            },
            ControlEvent::Override(Some(false)) | ControlEvent::ForceOff(true) => Self {
                mode: OverrideState::ForcedOff,
                ..self
            },
            ControlEvent::Override(None) => Self {
                mode: OverrideState::Auto,
                ..self
            },
            // An inactive force-off topic only releases its own hold.
            ControlEvent::ForceOff(false) => match self.mode {
                OverrideState::ForcedOff => Self {
                    mode: OverrideState::Auto,
                    ..self
                },
                _ => self,
            },
        }
    }

    pub fn is_forced_on(&self) -> bool {
        self.mode == OverrideState::ForcedOn
    }

    pub fn is_forced_off(&self) -> bool {
        self.mode == OverrideState::ForcedOff
    }

    /// Whether charging should be allowed right now.
    pub fn charge_allowed(&self) -> bool {
        match self.mode {
            OverrideState::ForcedOn => true,
            OverrideState::ForcedOff => false,
            OverrideState::Auto => self.below_threshold.unwrap_or(false),
        }
    }
}

/// Interpret an on/off style payload. Returns `None` for anything else.
pub fn parse_switch(payload: &str) -> Option<bool> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

/// Interpret an override payload: on/off, or `clear`/`reset` to return to auto.
pub fn parse_override(payload: &str) -> Option<Option<bool>> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "clear" | "reset" | "auto" => Some(None),
        other => parse_switch(other).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_auto_without_price_signal() {
        let state = ControlState::default();
        assert_eq!(state.mode, OverrideState::Auto);
        assert_eq!(state.below_threshold, None);
        assert!(!state.charge_allowed());
    }

    #[test]
    fn test_price_signal_drives_auto_mode() {
        let state = ControlState::default().apply(ControlEvent::BelowThreshold(true));
        assert!(state.charge_allowed());

        let state = state.apply(ControlEvent::BelowThreshold(false));
        assert!(!state.charge_allowed());
    }

    #[test]
    fn test_override_wins_over_price() {
        let state = ControlState::default()
            .apply(ControlEvent::BelowThreshold(false))
            .apply(ControlEvent::Override(Some(true)));
        assert!(state.is_forced_on());
        assert!(state.charge_allowed());

        let state = state
            .apply(ControlEvent::BelowThreshold(true))
            .apply(ControlEvent::Override(Some(false)));
        assert!(state.is_forced_off());
        assert!(!state.charge_allowed());

        let state = state.apply(ControlEvent::Override(None));
        assert_eq!(state.mode, OverrideState::Auto);
        assert!(state.charge_allowed());
    }

    #[test]
    fn test_releasing_force_off_keeps_force_on() {
        let forced_on = ControlState::default().apply(ControlEvent::Override(Some(true)));
        assert_eq!(forced_on.apply(ControlEvent::ForceOff(false)), forced_on);

        let released = forced_on
            .apply(ControlEvent::ForceOff(true))
            .apply(ControlEvent::ForceOff(false));
        assert_eq!(released.mode, OverrideState::Auto);
    }

    #[test]
    fn test_parse_payloads() {
        assert_eq!(parse_switch(" ON "), Some(true));
        assert_eq!(parse_switch("0"), Some(false));
        assert_eq!(parse_switch("maybe"), None);

        assert_eq!(parse_override("true"), Some(Some(true)));
        assert_eq!(parse_override("off"), Some(Some(false)));
        assert_eq!(parse_override("Clear"), Some(None));
        assert_eq!(parse_override("reset"), Some(None));
        assert_eq!(parse_override(""), None);
    }
}
