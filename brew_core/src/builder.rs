//! Type-state builder for `BrewingController`.
//!
//! Thermometer, heater and stirrer must be provided before `build()` is
//! available. `try_build()` is always available for dynamic checks.
use std::marker::PhantomData;
use std::sync::Arc;

use brew_traits::{Actuator, Beeper, Clock, MonotonicClock, Thermometer};

use crate::config::BrewCfg;
use crate::controller::{BrewingController, Parts};
use crate::error::BuildError;
use crate::log::{BrewingLogger, LogStorage, MemoryLogStorage};
use crate::notify::{AcousticNotifier, Notifier, TracingNotifier};
use crate::stirrer::StirrerService;
use crate::temperature::TemperatureController;

#[derive(Debug, Default)]
pub struct Missing;
#[derive(Debug, Default)]
pub struct Set;

pub struct BrewingControllerBuilder<T, H, S> {
    thermometer: Option<Box<dyn Thermometer + Send>>,
    heater: Option<Box<dyn Actuator + Send>>,
    stirrer: Option<Box<dyn Actuator + Send>>,
    beeper: Option<Box<dyn Beeper + Send>>,
    notifier: Option<Arc<dyn Notifier>>,
    log_storage: Option<Arc<dyn LogStorage>>,
    clock: Option<Arc<dyn Clock>>,
    cfg: BrewCfg,
    _state: PhantomData<(T, H, S)>,
}

impl Default for BrewingControllerBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            thermometer: None,
            heater: None,
            stirrer: None,
            beeper: None,
            notifier: None,
            log_storage: None,
            clock: None,
            cfg: BrewCfg::default(),
            _state: PhantomData,
        }
    }
}

impl BrewingController {
    pub fn builder() -> BrewingControllerBuilder<Missing, Missing, Missing> {
        BrewingControllerBuilder::default()
    }
}

fn validate(cfg: &BrewCfg) -> Result<(), BuildError> {
    let t = &cfg.temperature;
    if !t.heatup_delta.is_finite() || t.heatup_delta.is_sign_negative() {
        return Err(BuildError::InvalidConfig("heatup_delta must be finite and >= 0"));
    }
    if t.sample_interval.is_zero() {
        return Err(BuildError::InvalidConfig("sample_interval must be > 0"));
    }
    if t.max_read_failures == 0 {
        return Err(BuildError::InvalidConfig("max_read_failures must be >= 1"));
    }
    if cfg.timing.response_timeout.is_zero() {
        return Err(BuildError::InvalidConfig("response_timeout must be > 0"));
    }
    if cfg.timing.watchdog_poll.is_zero() {
        return Err(BuildError::InvalidConfig("watchdog_poll must be > 0"));
    }
    if !(18.0..=100.0).contains(&cfg.hop.temperature) {
        return Err(BuildError::InvalidConfig(
            "hop cooking temperature must be within 18..=100",
        ));
    }
    if !cfg.hop.prenotify_delta.is_finite() || cfg.hop.prenotify_delta.is_sign_negative() {
        return Err(BuildError::InvalidConfig("prenotify_delta must be finite and >= 0"));
    }
    Ok(())
}

impl<T, H, S> BrewingControllerBuilder<T, H, S> {
    fn retype<T2, H2, S2>(self) -> BrewingControllerBuilder<T2, H2, S2> {
        BrewingControllerBuilder {
            thermometer: self.thermometer,
            heater: self.heater,
            stirrer: self.stirrer,
            beeper: self.beeper,
            notifier: self.notifier,
            log_storage: self.log_storage,
            clock: self.clock,
            cfg: self.cfg,
            _state: PhantomData,
        }
    }

    pub fn with_config(mut self, cfg: BrewCfg) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn with_beeper(mut self, beeper: impl Beeper + Send + 'static) -> Self {
        self.beeper = Some(Box::new(beeper));
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_log_storage(mut self, storage: Arc<dyn LogStorage>) -> Self {
        self.log_storage = Some(storage);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fallible build available in any type-state; reports missing devices.
    pub fn try_build(self) -> eyre::Result<BrewingController> {
        let thermometer = self
            .thermometer
            .ok_or_else(|| eyre::Report::new(BuildError::MissingThermometer))?;
        let heater = self
            .heater
            .ok_or_else(|| eyre::Report::new(BuildError::MissingHeater))?;
        let stirrer = self
            .stirrer
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStirrer))?;
        validate(&self.cfg).map_err(eyre::Report::new)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let storage = self
            .log_storage
            .unwrap_or_else(|| Arc::new(MemoryLogStorage::new()));
        let cfg = self.cfg;
        Ok(BrewingController::from_parts(Parts {
            temperature: Arc::new(TemperatureController::new(
                thermometer,
                heater,
                cfg.temperature.clone(),
            )),
            stirrer: Arc::new(StirrerService::new(stirrer)),
            logger: Arc::new(BrewingLogger::new(storage, Arc::clone(&clock))),
            acoustic: AcousticNotifier::new(self.beeper, cfg.notifier),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
            clock,
            cfg,
        }))
    }
}

impl<H, S> BrewingControllerBuilder<Missing, H, S> {
    pub fn with_thermometer(
        mut self,
        thermometer: impl Thermometer + Send + 'static,
    ) -> BrewingControllerBuilder<Set, H, S> {
        self.thermometer = Some(Box::new(thermometer));
        self.retype()
    }
}

impl<T, S> BrewingControllerBuilder<T, Missing, S> {
    pub fn with_heater(
        mut self,
        heater: impl Actuator + Send + 'static,
    ) -> BrewingControllerBuilder<T, Set, S> {
        self.heater = Some(Box::new(heater));
        self.retype()
    }
}

impl<T, H> BrewingControllerBuilder<T, H, Missing> {
    pub fn with_stirrer(
        mut self,
        stirrer: impl Actuator + Send + 'static,
    ) -> BrewingControllerBuilder<T, H, Set> {
        self.stirrer = Some(Box::new(stirrer));
        self.retype()
    }
}

impl BrewingControllerBuilder<Set, Set, Set> {
    /// Validate the configuration and build. Only available once every device is set.
    pub fn build(self) -> eyre::Result<BrewingController> {
        self.try_build()
    }
}
