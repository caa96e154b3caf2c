//! Shared rig for the controller integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use brew_core::mocks::RecordingNotifier;
use brew_core::phase::{ControllerHandle, DriverContext, PhaseHost, RunToken};
use brew_core::stirrer::StirrerService;
use brew_core::{
    BrewCfg, BrewingController, BrewingLogger, BrewingState, MemoryLogStorage, MessageKind,
    Position, Result, StepData, TemperatureController, TemperatureLevelInfo,
};
use brew_hardware::{SimulatedBeeper, SimulatedKettle, SimulatedStirrer};
use brew_traits::MonotonicClock;

pub const fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Millisecond-scale timing so whole phases run in well under a second.
pub fn fast_cfg() -> BrewCfg {
    let mut cfg = BrewCfg::default();
    cfg.temperature.sample_interval = ms(5);
    cfg.timing.prenotify_lead = ms(20);
    cfg.timing.response_timeout = ms(400);
    cfg.timing.watchdog_poll = ms(5);
    cfg.hop.end_notice_lead = ms(50);
    cfg.hop.prenotify_lead = ms(20);
    cfg.temperature_log.time_delta = ms(20);
    cfg
}

pub struct Rig {
    pub controller: BrewingController,
    pub kettle: SimulatedKettle,
    pub stirrer: SimulatedStirrer,
    pub beeper: SimulatedBeeper,
    pub notifier: RecordingNotifier,
    pub storage: Arc<MemoryLogStorage>,
}

pub fn rig(cfg: BrewCfg) -> Rig {
    let kettle = SimulatedKettle::new(20.0).with_heating_rate(0.5);
    let stirrer = SimulatedStirrer::new();
    let beeper = SimulatedBeeper::new();
    let notifier = RecordingNotifier::new();
    let storage = Arc::new(MemoryLogStorage::new());
    let controller = BrewingController::builder()
        .with_thermometer(kettle.thermometer())
        .with_heater(kettle.heater())
        .with_stirrer(stirrer.clone())
        .with_beeper(beeper.clone())
        .with_notifier(Arc::new(notifier.clone()))
        .with_log_storage(storage.clone())
        .with_config(cfg)
        .build()
        .unwrap();
    Rig {
        controller,
        kettle,
        stirrer,
        beeper,
        notifier,
        storage,
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(ms(2));
    }
    cond()
}

impl Rig {
    pub fn state(&self) -> Option<BrewingState> {
        self.controller.current_state()
    }

    /// Wait until the current state has exactly this triple.
    pub fn wait_state(&self, expected: &BrewingState) -> BrewingState {
        let ok = wait_for(Duration::from_secs(5), || self.state().as_ref() == Some(expected));
        assert!(ok, "expected {expected}, still at {:?}", self.state());
        self.state().unwrap()
    }

    pub fn confirm(&self, state: BrewingState) {
        self.controller.confirm_step(state).unwrap();
    }

    pub fn logged(&self, pred: impl Fn(&MessageKind) -> bool) -> usize {
        self.controller
            .brewing_log()
            .map_or(0, |log| log.messages.iter().filter(|m| pred(&m.kind)).count())
    }
}

/// Host that records every driver callback instead of moving a process.
#[derive(Debug, Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PhaseHost for RecordingHost {
    fn request_confirmation(&self, _run: RunToken, position: Position, _data: Option<StepData>) {
        self.record(format!("request {position:?}"));
    }

    fn request_internal(&self, _run: RunToken, position: Position) {
        self.record(format!("internal {position:?}"));
    }

    fn proceed(&self, _run: RunToken, position: Position) {
        self.record(format!("proceed {position:?}"));
    }

    fn notify(&self, _run: RunToken, message: MessageKind) {
        self.record(format!("notify {message:?}"));
    }

    fn update_temperature_level(&self, _run: RunToken, info: TemperatureLevelInfo) {
        self.record(format!("level {} started={}", info.index, info.started));
    }

    fn complete_phase(&self, _run: RunToken) -> Result<()> {
        self.record("complete".into());
        Ok(())
    }
}

/// Collaborators for driving a phase driver directly, without a controller.
pub struct DriverRig {
    pub ctx: DriverContext,
    pub host: Arc<RecordingHost>,
    pub kettle: SimulatedKettle,
    pub stirrer: SimulatedStirrer,
}

pub fn driver_rig(cfg: BrewCfg) -> DriverRig {
    let kettle = SimulatedKettle::new(20.0).with_heating_rate(0.5);
    let stirrer = SimulatedStirrer::new();
    let host = Arc::new(RecordingHost::default());
    let clock = Arc::new(MonotonicClock::new());
    let logger = Arc::new(BrewingLogger::new(Arc::new(MemoryLogStorage::new()), clock.clone()));
    logger.start_log(1, brew_core::Recipe::default());
    let weak: Weak<RecordingHost> = Arc::downgrade(&host);
    let ctx = DriverContext {
        temperature: Arc::new(TemperatureController::new(
            Box::new(kettle.thermometer()),
            Box::new(kettle.heater()),
            cfg.temperature.clone(),
        )),
        stirrer: Arc::new(StirrerService::new(Box::new(stirrer.clone()))),
        logger,
        clock,
        host: ControllerHandle::new(weak),
        cfg,
    };
    DriverRig {
        ctx,
        host,
        kettle,
        stirrer,
    }
}
