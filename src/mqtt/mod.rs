//! MQTT publishing and inbound control messages

pub mod context;
pub mod inbound;
pub mod publisher;
pub mod types;

pub use inbound::{Inbound, MqttEvent, Subscriptions};
pub use publisher::{MqttPublisher, StatePublisher};
pub use types::StatePayload;
