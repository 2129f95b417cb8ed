//! Poll, publish and persist cycle for one charger

use tracing::{debug, error, info, warn};

use crate::cache::{EnergyCache, EnergyRecord};
use crate::charger::{Charger, ChargerState};
use crate::control::ControlState;
use crate::engine::status::OP_MODE_DISCONNECTED;
use crate::engine::{CanonicalState, StatusSnapshot, TelemetryEngine};
use crate::errors::{CacheError, MqttError};
use crate::mqtt::{Inbound, StatePayload, StatePublisher, Subscriptions};

pub struct Bridge<C: Charger, P: StatePublisher> {
    charger: C,
    engine: TelemetryEngine,
    cache: EnergyCache,
    publisher: P,
    subscriptions: Subscriptions,
    control: ControlState,
    last_status: Option<StatusSnapshot>,
}

impl<C: Charger, P: StatePublisher> Bridge<C, P> {
    pub fn new(
        charger: C,
        engine: TelemetryEngine,
        cache: EnergyCache,
        publisher: P,
        subscriptions: Subscriptions,
    ) -> Self {
        Self {
            charger,
            engine,
            cache,
            publisher,
            subscriptions,
            control: ControlState::default(),
            last_status: None,
        }
    }

    /// Poll the charger once and publish the result.
    ///
    /// Returns whether a vehicle is connected, or `None` when the poll failed
    /// and the caller should keep its current interval. Only MQTT failures
    /// are returned as errors.
    pub fn poll(&mut self) -> Result<Option<bool>, MqttError> {
        let state = match self.charger.fetch_state() {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to fetch charger state: {}", e);
                return Ok(None);
            }
        };

        let ingested = match self.engine.ingest(&state.snapshot) {
            Ok(ingested) => ingested,
            Err(e) => {
                warn!("Rejected charger sample: {}", e);
                return Ok(None);
            }
        };
        let current = &ingested.state;

        self.publisher.publish_energy(current)?;
        if ingested.changed {
            self.publish_state(current)?;
            self.publisher
                .publish_status(&current.snapshot, self.last_status.as_ref())?;
            self.last_status = Some(current.snapshot.clone());
        }
        debug!(
            "Charger {}: {:?} {:.2} A {:.3} kW session={:.4} kWh hour={:.4} kWh",
            self.charger.id(),
            current.snapshot.status,
            current.snapshot.actual_current,
            current.power,
            current.session_energy,
            current.hourly_energy
        );
        let is_connected = current.snapshot.is_connected;

        if current.snapshot.op_mode == OP_MODE_DISCONNECTED
            && self.engine.energy().session_energy() != 0.0
        {
            info!(
                "Session ended after {:.4} kWh",
                self.engine.energy().session_energy()
            );
            self.engine.reset_session();
            self.store_counters();
            self.persist();
        } else {
            self.store_counters();
        }

        Ok(Some(is_connected))
    }

    /// Close the current hour: publish its energy and restart the counter.
    pub fn hourly_rollover(&mut self) -> Result<(), MqttError> {
        let closed = self.engine.reset_hourly();
        info!("Energy last hour: {:.4} kWh", closed);

        self.publisher.publish_last_hour_energy(closed)?;
        let mut record = self.counters();
        record.last_hour_energy = closed;
        self.cache.set(record);
        self.persist();

        if let Ok(state) = self.engine.latest_state() {
            self.publisher.publish_energy(&state)?;
        }
        Ok(())
    }

    /// Act on one inbound message.
    pub fn handle_message(&mut self, topic: &str, payload: &str) -> Result<(), MqttError> {
        match self.subscriptions.classify(topic, payload) {
            Some(Inbound::Control(event)) => {
                self.control = self.control.apply(event);
                info!(
                    "Control {:?} -> mode {:?}, below threshold {:?}, charging allowed: {}",
                    event,
                    self.control.mode,
                    self.control.below_threshold,
                    self.control.charge_allowed()
                );
                if let Ok(state) = self.engine.latest_state() {
                    self.publish_state(&state)?;
                }
            }
            Some(Inbound::Command(command)) => {
                if let Err(e) = self.charger.send_command(command) {
                    error!("Command {} failed: {}", command, e);
                }
            }
            Some(Inbound::Report) => match self.charger.fetch_state() {
                Ok(ChargerState { raw, .. }) => self.publisher.publish_charger_details(&raw)?,
                Err(e) => error!("Failed to fetch charger details: {}", e),
            },
            None => debug!("Unhandled message on {}", topic),
        }
        Ok(())
    }

    /// Write counters to disk, logging failures.
    pub fn persist(&mut self) {
        if let Err(e) = self.cache.sync() {
            error!("{}", e);
        }
    }

    /// Persist counters and announce that the bridge is going offline.
    pub fn shutdown(&mut self) -> Result<(), CacheError> {
        self.store_counters();
        self.cache.sync()?;
        if let Err(e) = self.publisher.publish_online_status(false) {
            warn!("Failed to publish offline status: {}", e);
        }
        if let Err(e) = self.publisher.disconnect() {
            debug!("MQTT disconnect: {}", e);
        }
        Ok(())
    }

    fn publish_state(&self, state: &CanonicalState) -> Result<(), MqttError> {
        let payload = StatePayload::new(state, &self.control, self.cache.record().last_hour_energy);
        self.publisher.publish_state(&payload)
    }

    fn counters(&self) -> EnergyRecord {
        EnergyRecord {
            realtime_energy: self.engine.energy().session_energy(),
            hourly_energy: self.engine.energy().hourly_energy(),
            last_hour_energy: self.cache.record().last_hour_energy,
        }
    }

    fn store_counters(&mut self) {
        let record = self.counters();
        self.cache.set(record);
    }
}
