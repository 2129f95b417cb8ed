use crate::config::Config;
use crate::engine::{CanonicalState, StatusSnapshot};
use crate::errors::MqttError;
use crate::mqtt::context::{Kwh, PublishContext};
use crate::mqtt::inbound::{MqttEvent, Subscriptions};
use crate::mqtt::types::StatePayload;
use rand::Rng;
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

/// Outbound side of the bridge
pub trait StatePublisher {
    fn publish_online_status(&self, online: bool) -> Result<(), MqttError>;

    /// Session and hourly energy, every poll
    fn publish_energy(&self, state: &CanonicalState) -> Result<(), MqttError>;

    fn publish_last_hour_energy(&self, kwh: f64) -> Result<(), MqttError>;

    /// Full state as JSON
    fn publish_state(&self, payload: &StatePayload) -> Result<(), MqttError>;

    /// Status fields that differ from `old`, one topic each
    fn publish_status(
        &self,
        status: &StatusSnapshot,
        old: Option<&StatusSnapshot>,
    ) -> Result<(), MqttError>;

    /// Raw charger response on request, not retained
    fn publish_charger_details(&self, raw: &serde_json::Value) -> Result<(), MqttError>;

    fn disconnect(&self) -> Result<(), MqttError>;
}

pub struct MqttPublisher {
    client: Client,
    root_topic: String,
}

macro_rules! publish_if_changed {
    ($context:expr, $src:ident , $old:ident, $field:ident) => {
        if $old.as_ref().map_or(true, |o| o.$field != $src.$field) {
            $context.publish(stringify!($field), &$src.$field)?;
        }
    };
}

fn client_id(charger_id: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("{}_{:06x}", charger_id, suffix)
}

impl MqttPublisher {
    /// Connect to the broker and subscribe to the control topics.
    ///
    /// Inbound messages and connection loss arrive on the returned receiver.
    pub fn new(config: &Config) -> Result<(Self, Receiver<MqttEvent>), MqttError> {
        let client_id = client_id(&config.charger.id);

        let mut mqtt_options = if let Some(socket_path) = &config.mqtt.socket {
            // Unix domain socket connection
            tracing::info!("Using MQTT Unix socket: {}", socket_path);
            MqttOptions::new(client_id, socket_path, 0)
        } else {
            // TCP connection
            let host = config.mqtt.host.as_ref().ok_or_else(|| {
                MqttError::ClientError("MQTT host or socket must be configured".to_string())
            })?;

            tracing::info!("Using MQTT TCP connection: {}:{}", host, config.mqtt.port);
            MqttOptions::new(client_id, host, config.mqtt.port)
        };

        if !config.mqtt.username.is_empty() {
            mqtt_options.set_credentials(&config.mqtt.username, &config.mqtt.password);
        }

        mqtt_options.set_keep_alive(Duration::from_secs(60));

        // Broker publishes "offline" for us when the connection drops
        let status_topic = format!("{}/sensor/status", config.mqtt.root);
        mqtt_options.set_last_will(rumqttc::LastWill {
            topic: status_topic.clone(),
            message: b"offline".to_vec().into(),
            qos: QoS::AtLeastOnce,
            retain: true,
        });

        let (client, mut connection) = Client::new(mqtt_options, 10);
        let (events, receiver) = mpsc::channel();
        let subscriptions = Subscriptions::from_config(&config.mqtt).topics();
        let loop_client = client.clone();

        thread::spawn(move || {
            for notification in connection.iter() {
                match notification {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("MQTT connected");
                        // The event loop is this thread, so never block on the request queue.
                        if let Err(e) =
                            loop_client.try_publish(&status_topic, QoS::AtLeastOnce, true, "online")
                        {
                            tracing::warn!("Failed to publish online status: {}", e);
                        }
                        for topic in &subscriptions {
                            match loop_client.try_subscribe(topic, QoS::AtLeastOnce) {
                                Ok(()) => tracing::debug!("Subscribed to {}", topic),
                                Err(e) => tracing::warn!("Failed to subscribe to {}: {}", topic, e),
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let event = MqttEvent::Message {
                            topic: publish.topic.clone(),
                            payload: String::from_utf8_lossy(&publish.payload).into_owned(),
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("MQTT connection error: {:?}", e);
                        let _ = events.send(MqttEvent::Disconnected(e.to_string()));
                        break;
                    }
                }
            }
        });

        Ok((
            Self {
                client,
                root_topic: config.mqtt.root.clone(),
            },
            receiver,
        ))
    }

    pub fn context(&'_ self, topic: &str) -> PublishContext<'_> {
        let full_topic = if topic.is_empty() {
            self.root_topic.clone()
        } else {
            format!("{}/{}", self.root_topic, topic)
        };
        PublishContext::new(&self.client, full_topic)
    }
}

impl StatePublisher for MqttPublisher {
    fn publish_online_status(&self, online: bool) -> Result<(), MqttError> {
        let status = if online { "online" } else { "offline" };
        self.context("sensor").publish("status", &status.to_string())
    }

    fn publish_energy(&self, state: &CanonicalState) -> Result<(), MqttError> {
        let context = self.context("sensor");
        context.publish("realtimeEnergy", &Kwh(state.session_energy))?;
        context.publish("hourlyEnergy", &Kwh(state.hourly_energy))
    }

    fn publish_last_hour_energy(&self, kwh: f64) -> Result<(), MqttError> {
        self.context("sensor")
            .publish("lastHourEnergy", &Kwh(kwh))
    }

    fn publish_state(&self, payload: &StatePayload) -> Result<(), MqttError> {
        let json = serde_json::to_string(payload)
            .map_err(|error| MqttError::SerializationError { error })?;
        self.context("sensor").publish("state", &json)
    }

    fn publish_status(
        &self,
        status: &StatusSnapshot,
        old: Option<&StatusSnapshot>,
    ) -> Result<(), MqttError> {
        let context = self.context("status");
        publish_if_changed!(context, status, old, time_stamp);
        publish_if_changed!(context, status, old, op_mode);
        publish_if_changed!(context, status, old, reason_code);
        publish_if_changed!(context, status, old, status);
        publish_if_changed!(context, status, old, is_connected);
        publish_if_changed!(context, status, old, is_charging_active);
        publish_if_changed!(context, status, old, is_charging_finished);
        publish_if_changed!(context, status, old, actual_current);
        publish_if_changed!(context, status, old, voltage);
        publish_if_changed!(context, status, old, latest_pulse);
        publish_if_changed!(context, status, old, total_power);
        publish_if_changed!(context, status, old, vendor_session_energy);
        publish_if_changed!(context, status, old, energy_per_hour);
        publish_if_changed!(context, status, old, output_current);

        Ok(())
    }

    fn publish_charger_details(&self, raw: &serde_json::Value) -> Result<(), MqttError> {
        let json = serde_json::to_string_pretty(raw)
            .map_err(|error| MqttError::SerializationError { error })?;
        self.context("debug")
            .transient()
            .publish("chargerDetails", &json)
    }

    fn disconnect(&self) -> Result<(), MqttError> {
        self.client
            .disconnect()
            .map_err(|e| MqttError::ClientError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_has_hex_suffix() {
        let id = client_id("EH123456");
        let (prefix, suffix) = id.rsplit_once('_').unwrap();
        assert_eq!(prefix, "EH123456");
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
