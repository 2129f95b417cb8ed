//! Error types for the charger-MQTT bridge
//!
//! Uses thiserror for ergonomic error definitions.
//! These errors can be converted to anyhow::Error in the main application.

use chrono::{DateTime, Utc};

/// Telemetry engine errors
///
/// Every variant is raised before the engine mutates any state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid measurement for {field}: {value}")]
    InvalidMeasurement { field: &'static str, value: f64 },

    #[error("Unsupported network topology '{0}', must be TN, TT or IT")]
    UnsupportedTopology(String),

    #[error("Invalid phase count {0}, must be 1, 2 or 3")]
    InvalidPhaseCount(u8),

    #[error("Minimum charging current must be finite and non-negative, got {0}")]
    OutOfRangeThreshold(f64),

    #[error("Sample at {at} is older than the last update at {last}")]
    OutOfOrderSample {
        at: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("No telemetry has been ingested yet")]
    NotInitialized,
}

/// Charger cloud API errors
#[derive(Debug, thiserror::Error)]
pub enum ChargerError {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to decode charger response: {0}")]
    Decode(String),

    #[error("Credential file {path}: {reason}")]
    Credentials { path: String, reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// MQTT connection and publishing errors
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("Failed to publish message to topic '{topic}': {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("Failed to serialize data: {error:?}")]
    SerializationError { error: serde_json::Error },

    #[error("MQTT client error: {0}")]
    ClientError(String),
}

/// Energy cache persistence errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to read energy cache {path}: {reason}")]
    ReadError { path: String, reason: String },

    #[error("Failed to write energy cache {path}: {reason}")]
    WriteError { path: String, reason: String },

    #[error("Failed to parse energy cache {path}: {reason}")]
    ParseError { path: String, reason: String },
}
