//! Configuration module for the charger-MQTT bridge
//!
//! Loads configuration from a TOML file with the following structure:
//! - [default] - General settings (log_level)
//! - [charger] - Charger identity, electrical installation, polling and storage
//! - [easee] - Easee cloud account
//! - [mqtt] - MQTT broker settings and topics

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{NetworkConfig, PhaseCount, Topology};

/// Log level for the application
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing LevelFilter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,
    pub charger: ChargerConfig,
    pub easee: EaseeConfig,
    pub mqtt: MqttConfig,
}

/// General application settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DefaultConfig {
    /// Log level: TRACE, DEBUG, INFO, WARN, ERROR
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Charger vendor
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChargerBrand {
    #[default]
    Easee,
    Zaptec,
}

impl ChargerBrand {
    /// Whether the vendor API exposes the phase currents the engine needs
    pub fn provides_telemetry(&self) -> bool {
        matches!(self, ChargerBrand::Easee)
    }
}

/// Charger identity and installation
#[derive(Debug, Deserialize, Clone)]
pub struct ChargerConfig {
    #[serde(default)]
    pub brand: ChargerBrand,

    /// Vendor charger id (serial), e.g. "EH123456"
    pub id: String,

    /// Earthing scheme: TN, TT or IT
    #[serde(default = "default_network_type")]
    pub network_type: Topology,

    /// Phases wired to the charger (1, 2 or 3)
    #[serde(default = "default_phase_count")]
    pub phase_count: PhaseCount,

    /// A
    #[serde(default = "default_min_charging_current")]
    pub min_charging_current: f64,

    /// Poll interval while a vehicle is connected (e.g., "10s")
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub busy_poll_interval: Duration,

    /// Poll interval while idle
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub idle_poll_interval: Duration,

    /// Where access/refresh tokens are stored
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,

    /// Where energy counters are persisted between restarts
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
}

fn default_network_type() -> Topology {
    Topology::Tn
}

fn default_phase_count() -> PhaseCount {
    PhaseCount::Three
}

fn default_min_charging_current() -> f64 {
    0.001
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("data/credentials.json")
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("data/energysave.json")
}

impl ChargerConfig {
    pub fn network(&self) -> NetworkConfig {
        NetworkConfig {
            topology: self.network_type,
            phase_count: self.phase_count,
            min_charging_current: self.min_charging_current,
        }
    }
}

/// Easee cloud account
#[derive(Deserialize, Clone)]
pub struct EaseeConfig {
    /// Easee account username (usually email or phone number)
    pub username: String,

    pub password: String,

    /// Overrides the token lifetime reported by the API (e.g., "1h")
    #[serde(default, with = "humantime_serde")]
    pub auth_interval: Option<Duration>,
}

impl std::fmt::Debug for EaseeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("EaseeConfig")
            .field("username", &self.username)
            .field("password", &"***REDACTED***")
            .field("auth_interval", &self.auth_interval)
            .finish()
    }
}

/// MQTT broker configuration
#[derive(Deserialize, Clone)]
pub struct MqttConfig {
    /// MQTT root topic (e.g., "evcharger")
    #[serde(default = "default_mqtt_root")]
    pub root: String,

    /// MQTT broker hostname
    #[serde(default)]
    pub host: Option<String>,

    /// MQTT broker port (default 1883)
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Unix socket path, takes precedence over host
    #[serde(default)]
    pub socket: Option<String>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Spot price "below threshold" flag published by a price service
    #[serde(default = "default_below_threshold_topic")]
    pub below_threshold_topic: String,

    /// Topics whose active state forces charging off
    #[serde(default)]
    pub force_off_topics: Vec<String>,
}

fn default_mqtt_root() -> String {
    "evcharger".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_below_threshold_topic() -> String {
    "elwiz/chart/spotBelowThreshold".to_string()
}

impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("socket", &self.socket)
            .field("username", &self.username)
            .field("password", &"***REDACTED***")
            .field("root", &self.root)
            .field("below_threshold_topic", &self.below_threshold_topic)
            .field("force_off_topics", &self.force_off_topics)
            .finish()
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the config.toml file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration logic (semantic validation beyond type checks)
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.charger.brand.provides_telemetry() {
            return Err(ConfigError::ValidationError(format!(
                "charger.brand {:?} does not provide phase current telemetry",
                self.charger.brand
            )));
        }

        if self.charger.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "charger.id must not be empty".to_string(),
            ));
        }

        let min_current = self.charger.min_charging_current;
        if !min_current.is_finite() || min_current < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "charger.min_charging_current must be finite and non-negative, got {}",
                min_current
            )));
        }

        if self.charger.busy_poll_interval.is_zero() || self.charger.idle_poll_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "charger poll intervals must be greater than zero".to_string(),
            ));
        }

        let has_host = self.mqtt.host.as_ref().is_some_and(|h| !h.is_empty());
        if !has_host && self.mqtt.socket.is_none() {
            return Err(ConfigError::ValidationError(
                "mqtt.host or mqtt.socket must be configured".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
