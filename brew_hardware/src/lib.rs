//! Device implementations for the brewing stack.
//!
//! The simulated devices share one kettle model so that switching the simulated
//! heater actually moves the simulated thermometer. Real devices live behind the
//! `hardware` feature (GPIO relays and buzzer) or need only sysfs (1-Wire probe).
pub mod error;
#[cfg(feature = "hardware")]
pub mod gpio;
pub mod util;
pub mod w1;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use brew_traits::{Actuator, Beeper, HwResult, Thermometer};

pub use error::HwError;
pub use w1::W1Thermometer;

#[derive(Debug)]
struct Kettle {
    celsius: f32,
    room: f32,
    heater_on: bool,
    heat_per_read: f32,
    cool_ratio: f32,
    fail_reads: u32,
}

/// Thermal model shared by the simulated heater and thermometer.
///
/// Every thermometer read advances the model by one step: the water gains
/// `heat_per_read` degrees while the heater is on, and otherwise relaxes
/// towards room temperature.
#[derive(Debug, Clone)]
pub struct SimulatedKettle {
    inner: Arc<Mutex<Kettle>>,
}

impl SimulatedKettle {
    pub fn new(room_celsius: f32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Kettle {
                celsius: room_celsius,
                room: room_celsius,
                heater_on: false,
                heat_per_read: 1.0,
                cool_ratio: 0.01,
                fail_reads: 0,
            })),
        }
    }

    pub fn with_heating_rate(self, celsius_per_read: f32) -> Self {
        if let Ok(mut k) = self.inner.lock() {
            k.heat_per_read = celsius_per_read;
        }
        self
    }

    pub fn thermometer(&self) -> SimulatedThermometer {
        SimulatedThermometer {
            kettle: self.clone(),
        }
    }

    pub fn heater(&self) -> SimulatedHeater {
        SimulatedHeater {
            kettle: self.clone(),
        }
    }

    pub fn celsius(&self) -> f32 {
        self.inner.lock().map(|k| k.celsius).unwrap_or(f32::NAN)
    }

    pub fn set_celsius(&self, celsius: f32) {
        if let Ok(mut k) = self.inner.lock() {
            k.celsius = celsius;
        }
    }

    pub fn heater_on(&self) -> bool {
        self.inner.lock().map(|k| k.heater_on).unwrap_or(false)
    }

    /// Make the next `n` thermometer reads fail.
    pub fn fail_next_reads(&self, n: u32) {
        if let Ok(mut k) = self.inner.lock() {
            k.fail_reads = n;
        }
    }
}

/// Thermometer reading the simulated kettle.
#[derive(Debug, Clone)]
pub struct SimulatedThermometer {
    kettle: SimulatedKettle,
}

impl Thermometer for SimulatedThermometer {
    fn read_celsius(&mut self) -> HwResult<f32> {
        let mut k = self
            .kettle
            .inner
            .lock()
            .map_err(|_| HwError::SensorMissing("simulated kettle poisoned".into()))?;
        if k.fail_reads > 0 {
            k.fail_reads -= 1;
            return Err(Box::new(HwError::Injected("thermometer read")));
        }
        if k.heater_on {
            k.celsius += k.heat_per_read;
        } else {
            let drift = (k.celsius - k.room) * k.cool_ratio;
            k.celsius -= drift;
        }
        tracing::trace!(celsius = k.celsius, "simulated thermometer read");
        Ok(k.celsius)
    }
}

/// Heater relay of the simulated kettle.
#[derive(Debug, Clone)]
pub struct SimulatedHeater {
    kettle: SimulatedKettle,
}

impl SimulatedHeater {
    fn set(&mut self, on: bool) -> HwResult<()> {
        let mut k = self
            .kettle
            .inner
            .lock()
            .map_err(|_| HwError::Gpio("simulated kettle poisoned".into()))?;
        if k.heater_on != on {
            tracing::debug!(on, "simulated heater switched");
        }
        k.heater_on = on;
        Ok(())
    }
}

impl Actuator for SimulatedHeater {
    fn switch_on(&mut self) -> HwResult<()> {
        self.set(true)
    }
    fn switch_off(&mut self) -> HwResult<()> {
        self.set(false)
    }
    fn is_on(&self) -> bool {
        self.kettle.heater_on()
    }
}

/// Simulated stirrer motor. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedStirrer {
    on: Arc<AtomicBool>,
    jammed: Arc<AtomicBool>,
}

impl SimulatedStirrer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following switch command fail, as a blocked motor would.
    pub fn jam(&self, jammed: bool) {
        self.jammed.store(jammed, Ordering::SeqCst);
    }

    fn set(&mut self, on: bool) -> HwResult<()> {
        if self.jammed.load(Ordering::SeqCst) {
            return Err(Box::new(HwError::Injected("stirrer jammed")));
        }
        self.on.store(on, Ordering::SeqCst);
        tracing::debug!(on, "simulated stirrer switched");
        Ok(())
    }
}

impl Actuator for SimulatedStirrer {
    fn switch_on(&mut self) -> HwResult<()> {
        self.set(true)
    }
    fn switch_off(&mut self) -> HwResult<()> {
        self.set(false)
    }
    fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}

/// Beeper that counts signals instead of making noise. Clones share counters.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBeeper {
    singles: Arc<AtomicU32>,
    doubles: Arc<AtomicU32>,
    muted: Arc<AtomicBool>,
}

impl SimulatedBeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single_beeps(&self) -> u32 {
        self.singles.load(Ordering::SeqCst)
    }

    pub fn double_beeps(&self) -> u32 {
        self.doubles.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }
}

impl Beeper for SimulatedBeeper {
    fn single_beep(&mut self) -> HwResult<()> {
        if !self.is_muted() {
            self.singles.fetch_add(1, Ordering::SeqCst);
            tracing::info!("beep");
        }
        Ok(())
    }
    fn double_beep(&mut self) -> HwResult<()> {
        if !self.is_muted() {
            self.doubles.fetch_add(1, Ordering::SeqCst);
            tracing::info!("beep beep");
        }
        Ok(())
    }
    fn switch_off(&mut self) -> HwResult<()> {
        self.muted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heater_warms_simulated_kettle() {
        let kettle = SimulatedKettle::new(20.0).with_heating_rate(2.0);
        let mut thermo = kettle.thermometer();
        let mut heater = kettle.heater();
        heater.switch_on().unwrap();
        let t1 = thermo.read_celsius().unwrap();
        let t2 = thermo.read_celsius().unwrap();
        assert!(t2 > t1);
        assert!(heater.is_on());
    }

    #[test]
    fn kettle_relaxes_towards_room_temperature() {
        let kettle = SimulatedKettle::new(20.0);
        kettle.set_celsius(80.0);
        let mut thermo = kettle.thermometer();
        let t1 = thermo.read_celsius().unwrap();
        let t2 = thermo.read_celsius().unwrap();
        assert!(t1 < 80.0 && t2 < t1 && t2 > 20.0);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let kettle = SimulatedKettle::new(20.0);
        kettle.fail_next_reads(2);
        let mut thermo = kettle.thermometer();
        assert!(thermo.read_celsius().is_err());
        assert!(thermo.read_celsius().is_err());
        assert!(thermo.read_celsius().is_ok());
    }

    #[test]
    fn jammed_stirrer_reports_errors() {
        let stirrer = SimulatedStirrer::new();
        let mut handle = stirrer.clone();
        stirrer.jam(true);
        assert!(handle.switch_on().is_err());
        assert!(!stirrer.is_on());
        stirrer.jam(false);
        handle.switch_on().unwrap();
        assert!(stirrer.is_on());
    }

    #[test]
    fn muted_beeper_stays_silent() {
        let beeper = SimulatedBeeper::new();
        let mut handle = beeper.clone();
        handle.double_beep().unwrap();
        handle.switch_off().unwrap();
        handle.single_beep().unwrap();
        assert_eq!(beeper.double_beeps(), 1);
        assert_eq!(beeper.single_beeps(), 0);
    }
}
