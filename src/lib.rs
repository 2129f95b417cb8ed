//! EV charger to MQTT bridge
//!
//! Polls an Easee charger through its cloud API, normalizes the telemetry,
//! integrates session and hourly energy and publishes the result to MQTT.

pub mod auth;
pub mod bridge;
pub mod cache;
pub mod charger;
pub mod config;
pub mod control;
pub mod engine;
pub mod errors;
pub mod mqtt;
pub mod schedule;

pub use bridge::Bridge;
pub use charger::{Charger, EaseeCharger};
pub use config::Config;
pub use engine::TelemetryEngine;
pub use mqtt::publisher::{MqttPublisher, StatePublisher};
