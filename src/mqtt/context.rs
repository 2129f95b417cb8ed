use chrono::{DateTime, Utc};
use rumqttc::{Client, QoS};

use crate::engine::ChargerStatus;
use crate::errors::MqttError;

pub trait MqttPayload {
    fn to_payload(&self) -> String;
}

/// Energy in kWh, published with four decimals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kwh(pub f64);

impl MqttPayload for Kwh {
    fn to_payload(&self) -> String {
        format!("{:.4}", self.0)
    }
}

impl MqttPayload for DateTime<Utc> {
    fn to_payload(&self) -> String {
        self.to_rfc3339()
    }
}

impl MqttPayload for ChargerStatus {
    fn to_payload(&self) -> String {
        self.to_string()
    }
}

impl<T: MqttPayload> MqttPayload for Option<T> {
    fn to_payload(&self) -> String {
        self.as_ref().map(T::to_payload).unwrap_or_default()
    }
}

impl MqttPayload for String {
    fn to_payload(&self) -> String {
        self.clone()
    }
}

impl MqttPayload for bool {
    fn to_payload(&self) -> String {
        self.to_string()
    }
}

impl MqttPayload for f64 {
    fn to_payload(&self) -> String {
        self.to_string()
    }
}

impl MqttPayload for i32 {
    fn to_payload(&self) -> String {
        self.to_string()
    }
}

pub struct PublishContext<'a> {
    client: &'a Client,
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
}

impl<'a> PublishContext<'a> {
    pub fn new(client: &'a Client, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
            qos: QoS::AtLeastOnce,
            retain: true,
        }
    }

    pub fn transient(mut self) -> Self {
        self.retain = false;
        self
    }

    pub fn publish<T: MqttPayload>(&self, topic: &str, payload: &T) -> Result<(), MqttError> {
        let full_topic = format!("{}/{}", self.topic, topic);
        self.client
            .publish(&full_topic, self.qos, self.retain, payload.to_payload())
            .map_err(|e| MqttError::PublishFailed {
                topic: full_topic,
                reason: e.to_string(),
            })
    }
}
