//! Telemetry engine behavior across successive polls

use std::io;
use std::sync::{Arc, Mutex};

use charger_mqtt_rs::engine::{
    EnergySeed, NetworkConfig, PhaseCount, TelemetryEngine, TelemetrySnapshot, Topology,
};
use charger_mqtt_rs::errors::EngineError;
use chrono::{DateTime, Duration, TimeZone, Utc};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn network(topology: Topology) -> NetworkConfig {
    NetworkConfig {
        topology,
        phase_count: PhaseCount::Three,
        min_charging_current: 0.001,
    }
}

fn engine(topology: Topology) -> TelemetryEngine {
    TelemetryEngine::new(network(topology), EnergySeed::default()).unwrap()
}

fn snapshot(timestamp: DateTime<Utc>, l1: f64, l2: f64, l3: f64, op_mode: i32) -> TelemetrySnapshot {
    TelemetrySnapshot {
        timestamp,
        l1,
        l2,
        l3,
        voltage: Some(230.0),
        op_mode,
        reason_code: Some(0),
        total_power: None,
        session_energy: None,
        energy_per_hour: None,
        output_current: None,
        latest_pulse: None,
    }
}

#[test]
fn test_latest_state_before_first_ingest() {
    let engine = engine(Topology::Tn);
    assert_eq!(engine.latest_state(), Err(EngineError::NotInitialized));
}

#[test]
fn test_rejects_negative_threshold() {
    let mut config = network(Topology::Tn);
    config.min_charging_current = -1.0;
    assert!(matches!(
        TelemetryEngine::new(config, EnergySeed::default()),
        Err(EngineError::OutOfRangeThreshold(_))
    ));
}

#[test]
fn test_identical_snapshot_is_unchanged() {
    let mut engine = engine(Topology::Tn);
    let sample = snapshot(t0(), 16.0, 16.0, 16.0, 3);

    assert!(engine.ingest(&sample).unwrap().changed);
    assert!(!engine.ingest(&sample).unwrap().changed);
}

#[test]
fn test_new_timestamp_is_a_change() {
    let mut engine = engine(Topology::Tn);
    engine.ingest(&snapshot(t0(), 16.0, 16.0, 16.0, 3)).unwrap();

    let next = engine
        .ingest(&snapshot(t0() + Duration::seconds(10), 16.0, 16.0, 16.0, 3))
        .unwrap();
    assert!(next.changed);
}

#[test]
fn test_vendor_field_change_is_a_change() {
    let mut engine = engine(Topology::Tn);
    let mut sample = snapshot(t0(), 16.0, 16.0, 16.0, 3);
    sample.total_power = Some(1.0);
    sample.session_energy = Some(1.0);
    assert!(engine.ingest(&sample).unwrap().changed);

    sample.total_power = Some(7.0);
    let ingested = engine.ingest(&sample).unwrap();
    assert!(ingested.changed);
    assert_eq!(ingested.state.snapshot.total_power, Some(7.0));

    sample.session_energy = Some(5.0);
    let ingested = engine.ingest(&sample).unwrap();
    assert!(ingested.changed);
    assert_eq!(ingested.state.snapshot.vendor_session_energy, Some(5.0));

    sample.latest_pulse = Some(t0() - Duration::seconds(30));
    assert!(engine.ingest(&sample).unwrap().changed);
    assert!(!engine.ingest(&sample).unwrap().changed);
}

#[test]
fn test_vendor_session_energy_is_not_integrated() {
    let mut engine = engine(Topology::Tn);
    let mut sample = snapshot(t0(), 0.0, 0.0, 0.0, 3);
    sample.session_energy = Some(12.5);
    let state = engine.ingest(&sample).unwrap().state;
    assert_eq!(state.session_energy, 0.0);
    assert_eq!(state.snapshot.vendor_session_energy, Some(12.5));
}

#[test]
fn test_one_hour_three_phase_tn() {
    let mut engine = engine(Topology::Tn);
    engine.ingest(&snapshot(t0(), 10.0, 10.0, 10.0, 3)).unwrap();
    let state = engine
        .ingest(&snapshot(t0() + Duration::seconds(3600), 10.0, 10.0, 10.0, 3))
        .unwrap()
        .state;

    // sqrt(3) * 230 V * 30 A for one hour
    let expected = 3_f64.sqrt() * 230.0 * 30.0 / 1000.0;
    assert!((state.session_energy - expected).abs() < 1e-9);
    assert!((state.hourly_energy - expected).abs() < 1e-9);
    assert!((state.power - expected).abs() < 1e-9);
    assert!(state.snapshot.is_charging_active);
}

#[test]
fn test_single_phase_power() {
    let mut engine = engine(Topology::Tn);
    let state = engine
        .ingest(&snapshot(t0(), 16.0, 0.0, 0.0, 3))
        .unwrap()
        .state;
    assert_eq!(state.snapshot.actual_current, 16.0);
    assert!((state.power - 3.68).abs() < 1e-9);
}

#[test]
fn test_unequal_two_phase_reports_first_phase() {
    let mut engine = engine(Topology::Tn);
    let state = engine
        .ingest(&snapshot(t0(), 10.0, 6.0, 0.0, 3))
        .unwrap()
        .state;
    assert_eq!(state.snapshot.actual_current, 10.0);
    assert!((state.power - 2.3).abs() < 1e-9);
}

#[test]
fn test_it_balanced_load_reads_zero() {
    let mut engine = engine(Topology::It);
    let state = engine
        .ingest(&snapshot(t0(), 16.0, 16.0, 16.0, 3))
        .unwrap()
        .state;
    assert_eq!(state.snapshot.actual_current, 0.0);
    assert!(!state.snapshot.is_charging_active);
    assert_eq!(state.power, 0.0);
}

#[test]
fn test_missing_voltage_defaults() {
    let mut engine = engine(Topology::Tn);
    let mut sample = snapshot(t0(), 10.0, 0.0, 0.0, 3);
    sample.voltage = None;
    let state = engine.ingest(&sample).unwrap().state;
    assert_eq!(state.snapshot.voltage, 230.0);
    assert!((state.power - 2.3).abs() < 1e-9);
}

#[test]
fn test_finished_flags() {
    let mut engine = engine(Topology::Tn);
    let completed = engine.ingest(&snapshot(t0(), 0.0, 0.0, 0.0, 4)).unwrap();
    assert!(completed.state.snapshot.is_charging_finished);
    assert!(completed.state.snapshot.is_connected);

    let disconnected = engine
        .ingest(&snapshot(t0() + Duration::seconds(10), 0.0, 0.0, 0.0, 1))
        .unwrap();
    assert!(disconnected.state.snapshot.is_charging_finished);
    assert!(!disconnected.state.snapshot.is_connected);
}

#[test]
fn test_failed_ingest_leaves_state_untouched() {
    let mut engine = engine(Topology::Tn);
    let first = engine
        .ingest(&snapshot(t0(), 10.0, 10.0, 10.0, 3))
        .unwrap()
        .state;

    let bad = snapshot(t0() + Duration::seconds(60), 10.0, f64::NAN, 10.0, 3);
    assert!(matches!(
        engine.ingest(&bad),
        Err(EngineError::InvalidMeasurement { field: "l2", .. })
    ));

    let stale = snapshot(t0() - Duration::seconds(1), 10.0, 10.0, 10.0, 3);
    assert!(matches!(
        engine.ingest(&stale),
        Err(EngineError::OutOfOrderSample { .. })
    ));

    assert_eq!(engine.latest_state().unwrap(), first);
    // The detector still holds the first snapshot.
    assert!(!engine.ingest(&snapshot(t0(), 10.0, 10.0, 10.0, 3)).unwrap().changed);
}

#[test]
fn test_resets_are_visible_and_independent() {
    let seed = EnergySeed {
        session_energy: 5.0,
        hourly_energy: 1.5,
    };
    let mut engine = TelemetryEngine::new(network(Topology::Tn), seed).unwrap();
    engine.ingest(&snapshot(t0(), 0.0, 0.0, 0.0, 3)).unwrap();

    assert_eq!(engine.reset_hourly(), 1.5);
    let state = engine.latest_state().unwrap();
    assert_eq!(state.hourly_energy, 0.0);
    assert_eq!(state.session_energy, 5.0);

    engine.reset_session();
    let state = engine.latest_state().unwrap();
    assert_eq!(state.session_energy, 0.0);
    assert_eq!(engine.reset_hourly(), 0.0);
}

#[test]
fn test_estimate_current_matches_topology() {
    assert_eq!(engine(Topology::Tt).estimate_current(6.0, 6.0, 6.0), Ok(18.0));
    assert_eq!(engine(Topology::It).estimate_current(10.0, 6.0, 4.0), Ok(5.29));
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_unknown_op_mode_is_logged_and_tolerated() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let state = tracing::subscriber::with_default(subscriber, || {
        let mut engine = engine(Topology::Tn);
        engine
            .ingest(&snapshot(t0(), 0.0, 0.0, 0.0, 42))
            .unwrap()
            .state
    });

    assert_eq!(state.snapshot.status, None);
    assert!(state.snapshot.is_connected);

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("WARN"));
    assert!(output.contains("Unknown charger opMode: 42"));
}

#[test]
fn test_missing_reason_code_is_logged_and_tolerated() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let state = tracing::subscriber::with_default(subscriber, || {
        let mut engine = engine(Topology::Tn);
        let mut sample = snapshot(t0(), 16.0, 0.0, 0.0, 3);
        sample.reason_code = None;
        engine.ingest(&sample).unwrap().state
    });

    assert_eq!(state.snapshot.reason_code, None);
    assert!(state.snapshot.is_charging_active);

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("WARN"));
    assert!(output.contains("no reasonForNoCurrent"));
}
