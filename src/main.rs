use std::cmp::{max, min};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::{debug, error, info};

use charger_mqtt_rs::auth::{Authenticator, CredentialStore, RefreshTask};
use charger_mqtt_rs::cache::EnergyCache;
use charger_mqtt_rs::mqtt::{MqttEvent, Subscriptions};
use charger_mqtt_rs::schedule::{next_hourly_rollover, next_interval, poll_interval};
use charger_mqtt_rs::{Bridge, Config, EaseeCharger, MqttPublisher, TelemetryEngine};

/// EV Charger MQTT Bridge - Publishes charger state and energy to MQTT
#[derive(Parser)]
#[command(name = "charger-mqtt-rs")]
#[command(version)]
#[command(about = "EV Charger MQTT Bridge - Publishes charger state and energy to MQTT", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration first (to get log level)
    let config_path = cli.config;
    let config = Config::from_file(&config_path)?;

    // Initialize tracing with log level from config
    let app_log_level = config.default.log_level.as_str();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("charger_mqtt_rs={}", app_log_level).parse()?)
                .add_directive("rumqttc=warn".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    info!("Configuration loaded from: {}", config_path);
    info!("Log level: {}", config.default.log_level);
    debug!("Debug logging is enabled");

    info!("  Charger: {} ({:?})", config.charger.id, config.charger.brand);
    info!(
        "  Network: {} with {} phase(s)",
        config.charger.network_type,
        config.charger.phase_count.as_u8()
    );
    info!("  MQTT Root: {}", config.mqtt.root);
    info!(
        "  Poll interval: {:?} busy / {:?} idle",
        config.charger.busy_poll_interval, config.charger.idle_poll_interval
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Failed to install signal handler")?;
    }

    let cache = EnergyCache::open(&config.charger.cache_file)?;
    let engine = TelemetryEngine::new(config.charger.network(), cache.seed())?;
    info!(
        "Restored counters: session={:.4} kWh hour={:.4} kWh",
        cache.record().realtime_energy,
        cache.record().hourly_energy
    );

    info!("Authenticating with Easee cloud...");
    let auth = Arc::new(Authenticator::new(
        &config.easee,
        CredentialStore::new(&config.charger.credentials_file),
    )?);
    if auth.authenticate_with_retry(&running).is_err() {
        info!("Shutdown requested before authentication succeeded");
        return Ok(());
    }
    let refresh_task = RefreshTask::spawn(auth.clone());
    let charger = EaseeCharger::new(config.charger.id.clone(), auth)?;

    info!("Creating MQTT publisher...");
    let (publisher, events) = MqttPublisher::new(&config)?;
    let subscriptions = Subscriptions::from_config(&config.mqtt);
    let mut bridge = Bridge::new(charger, engine, cache, publisher, subscriptions);

    let busy = config.charger.busy_poll_interval;
    let idle = config.charger.idle_poll_interval;
    let mut interval = Duration::from_std(idle)?;
    let mut next_poll = Utc::now();
    let mut next_rollover = next_hourly_rollover(Utc::now());
    info!("Starting main loop...");

    let result = loop {
        if !running.load(Ordering::SeqCst) {
            info!("Shutting down...");
            break Ok(());
        }

        let now = Utc::now();
        if now >= next_poll {
            match bridge.poll() {
                Ok(Some(is_connected)) => {
                    interval = Duration::from_std(poll_interval(is_connected, busy, idle))?;
                }
                Ok(None) => {}
                Err(e) => break Err(anyhow::Error::from(e)),
            }
            next_poll = next_interval(now, interval);
        }

        if now >= next_rollover {
            if let Err(e) = bridge.hourly_rollover() {
                break Err(e.into());
            }
            next_rollover = next_hourly_rollover(now);
        }

        // Wait for the next deadline, waking early for inbound messages
        let wait = max(
            min(next_poll, next_rollover) - Utc::now(),
            Duration::milliseconds(100),
        );
        let wait = min(wait, Duration::seconds(1)).to_std()?;
        match events.recv_timeout(wait) {
            Ok(MqttEvent::Message { topic, payload }) => {
                if let Err(e) = bridge.handle_message(&topic, &payload) {
                    break Err(e.into());
                }
            }
            Ok(MqttEvent::Disconnected(reason)) => {
                break Err(anyhow::anyhow!("MQTT connection lost: {}", reason));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                break Err(anyhow::anyhow!("MQTT event loop stopped"));
            }
        }
    };

    refresh_task.stop();
    if let Err(e) = bridge.shutdown() {
        error!("Failed to persist energy counters: {}", e);
    }
    // Give MQTT a moment to flush the offline status
    std::thread::sleep(Duration::milliseconds(500).to_std()?);
    result
}
