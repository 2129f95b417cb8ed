//! Session and hourly energy accounting
//!
//! Integrates instantaneous charging power over the wall-clock time between
//! samples. The vendor's own energy figures are never used here.

use chrono::{DateTime, Utc};

use super::phase::{PhaseCount, Topology};
use crate::errors::EngineError;

/// Voltage assumed when the charger does not report one
pub const DEFAULT_VOLTAGE: f64 = 230.0;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Persisted counter values used for a warm start
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergySeed {
    /// kWh
    pub session_energy: f64,
    /// kWh
    pub hourly_energy: f64,
}

/// Accumulates session and hourly energy from power samples
#[derive(Debug, Clone)]
pub struct EnergyIntegrator {
    topology: Topology,
    phases: PhaseCount,
    voltage: f64,
    current: f64,
    power: f64,
    last_update: Option<DateTime<Utc>>,
    session_energy: f64,
    hourly_energy: f64,
}

/// Instantaneous power in kW for the given topology and active phases.
pub fn power_kw(topology: Topology, phases: PhaseCount, current: f64, voltage: f64) -> f64 {
    match (topology, phases) {
        // No neutral conductor: full line-to-line contribution per phase.
        (Topology::It, PhaseCount::Three) => 3.0 * voltage * current / 1000.0,
        (_, PhaseCount::Three) => 3_f64.sqrt() * voltage * current / 1000.0,
        _ => voltage * current / 1000.0,
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidMeasurement { field, value })
    }
}

impl EnergyIntegrator {
    pub fn new(topology: Topology, phases: PhaseCount, seed: EnergySeed) -> Self {
        Self {
            topology,
            phases,
            voltage: 0.0,
            current: 0.0,
            power: 0.0,
            last_update: None,
            session_energy: seed.session_energy,
            hourly_energy: seed.hourly_energy,
        }
    }

    /// Record a current sample and integrate the power held since the
    /// previous sample.
    ///
    /// `phases` is the phase count detected on this sample, not the one the
    /// installation is configured for.
    pub fn set_energy_by_current(
        &mut self,
        current: f64,
        voltage: f64,
        phases: PhaseCount,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        check_non_negative("current", current)?;
        check_non_negative("voltage", voltage)?;
        self.check_order(at)?;

        let power = power_kw(self.topology, phases, current, voltage);
        self.integrate(at);

        self.voltage = voltage;
        self.current = current;
        self.phases = phases;
        self.power = power;
        self.last_update = Some(at);
        Ok(())
    }

    /// Record a power sample (kW) for callers that already know the power.
    pub fn set_energy(&mut self, power: f64, at: DateTime<Utc>) -> Result<(), EngineError> {
        check_non_negative("power", power)?;
        self.check_order(at)?;

        self.integrate(at);
        self.power = power;
        self.last_update = Some(at);
        Ok(())
    }

    fn check_order(&self, at: DateTime<Utc>) -> Result<(), EngineError> {
        match self.last_update {
            Some(last) if at < last => Err(EngineError::OutOfOrderSample { at, last }),
            _ => Ok(()),
        }
    }

    // Left Riemann step: the previous power held until `at`.
    fn integrate(&mut self, at: DateTime<Utc>) {
        let Some(last) = self.last_update else {
            return;
        };
        let elapsed = (at - last).num_milliseconds() as f64 / 1000.0;
        let kwh = self.power * elapsed / SECONDS_PER_HOUR;
        self.session_energy += kwh;
        self.hourly_energy += kwh;
    }

    pub fn set_session_energy(&mut self, kwh: f64) {
        self.session_energy = kwh;
    }

    pub fn set_hourly_energy(&mut self, kwh: f64) {
        self.hourly_energy = kwh;
    }

    /// kW
    pub fn power(&self) -> f64 {
        self.power
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn phases(&self) -> PhaseCount {
        self.phases
    }

    pub fn session_energy(&self) -> f64 {
        self.session_energy
    }

    pub fn hourly_energy(&self) -> f64 {
        self.hourly_energy
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn integrator(topology: Topology) -> EnergyIntegrator {
        EnergyIntegrator::new(topology, PhaseCount::Three, EnergySeed::default())
    }

    #[test]
    fn test_power_formulas() {
        assert!((power_kw(Topology::It, PhaseCount::Three, 10.0, 230.0) - 6.9).abs() < 1e-9);
        assert!(
            (power_kw(Topology::Tn, PhaseCount::Three, 10.0, 230.0) - 3.983_716_857).abs() < 1e-6
        );
        assert!((power_kw(Topology::Tt, PhaseCount::One, 10.0, 230.0) - 2.3).abs() < 1e-9);
        assert!((power_kw(Topology::It, PhaseCount::Two, 10.0, 230.0) - 2.3).abs() < 1e-9);
    }

    #[test]
    fn test_first_sample_only_sets_baseline() {
        let mut energy = integrator(Topology::Tn);
        energy
            .set_energy_by_current(16.0, 230.0, PhaseCount::One, t0())
            .unwrap();

        assert_eq!(energy.session_energy(), 0.0);
        assert_eq!(energy.hourly_energy(), 0.0);
        assert!((energy.power() - 3.68).abs() < 1e-9);
        assert_eq!(energy.voltage(), 230.0);
        assert_eq!(energy.last_update(), Some(t0()));
    }

    #[test]
    fn test_one_hour_at_constant_power() {
        let mut energy = integrator(Topology::Tn);
        energy.set_energy(2.0, t0()).unwrap();
        energy.set_energy(2.0, t0() + Duration::seconds(3600)).unwrap();

        assert!((energy.session_energy() - 2.0).abs() < 1e-9);
        assert!((energy.hourly_energy() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_integrates_previous_power() {
        let mut energy = integrator(Topology::Tn);
        energy.set_energy(0.0, t0()).unwrap();
        // The jump to 11 kW only counts from this sample on.
        energy.set_energy(11.0, t0() + Duration::seconds(1800)).unwrap();
        assert_eq!(energy.session_energy(), 0.0);

        energy.set_energy(0.0, t0() + Duration::seconds(3600)).unwrap();
        assert!((energy.session_energy() - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_elapsed_adds_nothing() {
        let mut energy = integrator(Topology::Tn);
        energy
            .set_energy_by_current(16.0, 230.0, PhaseCount::Three, t0())
            .unwrap();
        energy
            .set_energy_by_current(16.0, 230.0, PhaseCount::Three, t0())
            .unwrap();
        assert_eq!(energy.session_energy(), 0.0);
        assert_eq!(energy.hourly_energy(), 0.0);
    }

    #[test]
    fn test_warm_start_accumulates_on_seed() {
        let seed = EnergySeed {
            session_energy: 4.5,
            hourly_energy: 0.25,
        };
        let mut energy = EnergyIntegrator::new(Topology::Tn, PhaseCount::One, seed);
        energy.set_energy(1.0, t0()).unwrap();
        energy.set_energy(1.0, t0() + Duration::seconds(900)).unwrap();

        assert!((energy.session_energy() - 4.75).abs() < 1e-9);
        assert!((energy.hourly_energy() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_resets_are_independent() {
        let seed = EnergySeed {
            session_energy: 3.0,
            hourly_energy: 1.0,
        };
        let mut energy = EnergyIntegrator::new(Topology::Tn, PhaseCount::One, seed);

        energy.set_session_energy(0.0);
        assert_eq!(energy.session_energy(), 0.0);
        assert_eq!(energy.hourly_energy(), 1.0);

        energy.set_session_energy(3.0);
        energy.set_hourly_energy(0.0);
        assert_eq!(energy.session_energy(), 3.0);
        assert_eq!(energy.hourly_energy(), 0.0);
    }

    #[test]
    fn test_rejects_invalid_samples_without_mutation() {
        let mut energy = integrator(Topology::Tn);
        energy.set_energy(2.0, t0()).unwrap();

        assert!(energy.set_energy(f64::NAN, t0() + Duration::seconds(60)).is_err());
        assert!(energy.set_energy(-1.0, t0() + Duration::seconds(60)).is_err());
        assert!(energy
            .set_energy_by_current(10.0, -230.0, PhaseCount::One, t0() + Duration::seconds(60))
            .is_err());
        assert_eq!(
            energy.set_energy(2.0, t0() - Duration::seconds(1)),
            Err(EngineError::OutOfOrderSample {
                at: t0() - Duration::seconds(1),
                last: t0()
            })
        );

        assert_eq!(energy.power(), 2.0);
        assert_eq!(energy.last_update(), Some(t0()));
        assert_eq!(energy.session_energy(), 0.0);
    }
}
