//! Phase drivers and the narrow interface they use to reach the controller.
//!
//! A driver owns one scheduling thread per run. That thread reacts to events
//! (alarm wake-ups, temperature reached, confirmations) and calls back into the
//! controller through a `ControllerHandle`. Every call carries the `RunToken` of
//! the run it belongs to; the controller ignores calls whose token no longer
//! matches the current process and phase.
//!
//! Lock order is controller → driver → temperature subscribers. A driver thread
//! never holds its own lock while calling the controller.
pub mod hop;
pub mod mash;

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use brew_traits::Clock;
use crossbeam_channel as xch;

use crate::config::BrewCfg;
use crate::error::{BrewError, Result};
use crate::log::BrewingLogger;
use crate::message::MessageKind;
use crate::process::TemperatureLevelInfo;
use crate::recipe::IngredientAddition;
use crate::state::{BrewingState, Phase, Position, StepData};
use crate::stirrer::StirrerService;
use crate::temperature::TemperatureController;
use crate::timer::TimerSlot;

pub use hop::HopCookDriver;
pub use mash::MashDriver;

/// Identifies one phase of one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunToken {
    pub process_id: u64,
    pub phase: Phase,
}

/// Controller operations available to phase drivers.
pub trait PhaseHost: Send + Sync {
    /// Move to REQUEST/`position` and ask the operator to confirm.
    fn request_confirmation(&self, run: RunToken, position: Position, data: Option<StepData>);
    /// Move to INTERN/`position`; the driver confirms it itself.
    fn request_internal(&self, run: RunToken, position: Position);
    /// Move to NORMAL/`position`.
    fn proceed(&self, run: RunToken, position: Position);
    fn notify(&self, run: RunToken, message: MessageKind);
    fn update_temperature_level(&self, run: RunToken, info: TemperatureLevelInfo);
    /// Move to INTERN/END and confirm it in one step, ending the phase.
    fn complete_phase(&self, run: RunToken) -> Result<()>;
}

/// Lazily resolved reference to the controller; resolution happens on every call.
#[derive(Clone)]
pub struct ControllerHandle {
    host: Weak<dyn PhaseHost>,
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("alive", &(self.host.strong_count() > 0))
            .finish()
    }
}

impl ControllerHandle {
    pub fn new(host: Weak<dyn PhaseHost>) -> Self {
        Self { host }
    }

    fn with<R>(&self, f: impl FnOnce(&dyn PhaseHost) -> R) -> Option<R> {
        match self.host.upgrade() {
            Some(host) => Some(f(host.as_ref())),
            None => {
                tracing::debug!("controller gone, phase callback dropped");
                None
            }
        }
    }

    pub fn request_confirmation(&self, run: RunToken, position: Position, data: Option<StepData>) {
        self.with(|h| h.request_confirmation(run, position, data));
    }

    pub fn request_internal(&self, run: RunToken, position: Position) {
        self.with(|h| h.request_internal(run, position));
    }

    pub fn proceed(&self, run: RunToken, position: Position) {
        self.with(|h| h.proceed(run, position));
    }

    pub fn notify(&self, run: RunToken, message: MessageKind) {
        self.with(|h| h.notify(run, message));
    }

    pub fn update_temperature_level(&self, run: RunToken, info: TemperatureLevelInfo) {
        self.with(|h| h.update_temperature_level(run, info));
    }

    /// End the phase of `run`; a stale token is reported and otherwise ignored.
    pub fn complete_phase(&self, run: RunToken) {
        let res = self
            .with(|h| h.complete_phase(run))
            .unwrap_or(Err(BrewError::ProcessNotFound));
        if let Err(e) = res {
            tracing::debug!(error = %e, phase = ?run.phase, "phase end not accepted");
        }
    }
}

/// Result of starting a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStart {
    /// The scheduling thread is running.
    Started,
    /// Nothing to do for this phase; the caller ends it right away.
    Skipped,
}

/// What the controller does after a driver accepted a confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Proceed(Position),
    /// Some items are still outstanding; ask for them again.
    Rerequest { position: Position, data: StepData },
}

/// Contract shared by the mashing and hop-cooking drivers.
pub trait PhaseDriver: Send + Sync {
    type Plan;

    fn start(&self, run: RunToken, plan: Option<&Self::Plan>) -> Result<PhaseStart>;
    fn confirm_state(&self, state: &BrewingState) -> Result<StepOutcome>;
    /// Abort timers and release stirrer and heater. Safe at any time, idempotent.
    fn finish(&self);
    fn is_active(&self) -> bool;
}

/// Collaborators every driver needs.
#[derive(Clone)]
pub struct DriverContext {
    pub temperature: Arc<TemperatureController>,
    pub stirrer: Arc<StirrerService>,
    pub logger: Arc<BrewingLogger>,
    pub clock: Arc<dyn Clock>,
    pub host: ControllerHandle,
    pub cfg: BrewCfg,
}

impl DriverContext {
    /// Stop stirring and heating.
    pub(crate) fn release_hardware(&self) {
        if !self.stirrer.stop() {
            tracing::warn!("stirrer did not stop");
        }
        self.temperature.stop();
    }

    pub(crate) fn log(&self, kind: MessageKind) {
        if let Err(e) = self.logger.log(kind) {
            tracing::debug!(error = %e, "log entry dropped");
        }
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Run bookkeeping shared between a driver's API and its scheduling thread.
#[derive(Debug)]
pub(crate) struct RunSlot<E> {
    pub run: Option<RunToken>,
    pub events: Option<xch::Sender<E>>,
    pub alarm: TimerSlot,
    pub wake_seq: u64,
}

impl<E: Send + 'static> RunSlot<E> {
    pub fn new() -> Self {
        Self {
            run: None,
            events: None,
            alarm: TimerSlot::new(),
            wake_seq: 0,
        }
    }

    pub fn is_current(&self, run: RunToken) -> bool {
        self.run == Some(run)
    }

    pub fn send(&self, event: E) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Replace the pending wait with one firing `make(seq)` after `delay`.
    /// Returns the sequence number the wake-up will carry.
    pub fn arm(&mut self, name: &str, delay: Duration, make: fn(u64) -> E) -> Option<u64> {
        let tx = self.events.clone()?;
        self.wake_seq += 1;
        let seq = self.wake_seq;
        self.alarm.replace(name, delay, move || {
            let _ = tx.send(make(seq));
        });
        Some(seq)
    }

    /// Deactivate the run: cancel the alarm and wake the thread with `stop`.
    pub fn close(&mut self, stop: E) -> Option<RunToken> {
        self.alarm.cancel();
        self.send(stop);
        self.events = None;
        self.run.take()
    }
}

/// Items of `confirmed` removed from `pending`; errors if any was never requested.
pub(crate) fn take_confirmed(
    pending: &mut Vec<IngredientAddition>,
    confirmed: &[IngredientAddition],
) -> Result<()> {
    if let Some(extra) = confirmed.iter().find(|c| !pending.contains(c)) {
        return Err(BrewError::invalid_step(format!(
            "{} was not requested",
            extra.name
        )));
    }
    pending.retain(|p| !confirmed.contains(p));
    Ok(())
}

/// Milliseconds to wait until `at_ms` given the phase clock reads `now_ms`.
pub(crate) fn delay_until(at_ms: i64, now_ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(at_ms.saturating_sub(now_ms)).unwrap_or(0))
}
