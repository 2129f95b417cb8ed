//! Inbound MQTT messages
//!
//! Maps subscribed topics and their payloads onto bridge actions.

use tracing::warn;

use crate::charger::ChargerCommand;
use crate::config::MqttConfig;
use crate::control::{parse_override, parse_switch, ControlEvent};

/// Event delivered from the MQTT connection thread
#[derive(Debug, Clone, PartialEq)]
pub enum MqttEvent {
    Message { topic: String, payload: String },
    /// The connection failed; no further events follow.
    Disconnected(String),
}

/// Decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Control(ControlEvent),
    Command(ChargerCommand),
    /// Publish the raw charger state for debugging
    Report,
}

/// Topics the bridge listens on
#[derive(Debug, Clone)]
pub struct Subscriptions {
    pub control: String,
    pub override_topic: String,
    pub report: String,
    pub below_threshold: String,
    pub force_off: Vec<String>,
}

impl Subscriptions {
    pub fn from_config(config: &MqttConfig) -> Self {
        Self {
            control: format!("{}/control", config.root),
            override_topic: format!("{}/override", config.root),
            report: format!("{}/report", config.root),
            below_threshold: config.below_threshold_topic.clone(),
            force_off: config.force_off_topics.clone(),
        }
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics = vec![
            self.control.clone(),
            self.override_topic.clone(),
            self.report.clone(),
            self.below_threshold.clone(),
        ];
        topics.extend(self.force_off.iter().cloned());
        topics
    }

    /// Decode a message. Unknown topics and malformed payloads yield `None`.
    pub fn classify(&self, topic: &str, payload: &str) -> Option<Inbound> {
        if topic == self.control {
            return match payload.parse() {
                Ok(command) => Some(Inbound::Command(command)),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            };
        }
        if topic == self.report {
            return Some(Inbound::Report);
        }

        let event = if topic == self.override_topic {
            parse_override(payload).map(ControlEvent::Override)
        } else if topic == self.below_threshold {
            parse_switch(payload).map(ControlEvent::BelowThreshold)
        } else if self.force_off.iter().any(|t| t == topic) {
            parse_switch(payload).map(ControlEvent::ForceOff)
        } else {
            return None;
        };

        if event.is_none() {
            warn!("Ignoring payload '{}' on {}", payload, topic);
        }
        event.map(Inbound::Control)
    }
}
