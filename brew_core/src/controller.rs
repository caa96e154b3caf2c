//! The brewing state machine.
//!
//! `BrewingController` owns the optional process slot, both phase drivers, the
//! pending-confirmation set and the response watchdog. Every public operation
//! runs under the controller lock; drivers reach back in through `PhaseHost`
//! with a `RunToken`, and calls for a process or phase that is no longer
//! current are dropped.
//!
//! Confirmation dispatch per phase:
//! - NOT_STARTED: nothing to do.
//! - MASHING / HOP_COOKING: START starts the driver, sub-steps go to the driver,
//!   END (issued internally by the driver) advances to the next manual phase.
//! - LAUTERING / WHIRLPOOL: END advances.
//! - FINISHED: END removes the process.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use brew_traits::Clock;

use crate::config::BrewCfg;
use crate::error::{BrewError, ProcessError, Result};
use crate::log::BrewingLogger;
use crate::message::{BrewingLog, Message, MessageKind};
use crate::notify::{AcousticNotifier, Notifier};
use crate::phase::{
    ControllerHandle, DriverContext, HopCookDriver, MashDriver, PhaseDriver, PhaseHost, PhaseStart,
    RunToken, StepOutcome,
};
use crate::process::{ActuatorDetails, BrewingProcess, BrewingSummary, SensorStatus, TemperatureLevelInfo};
use crate::recipe::Recipe;
use crate::state::{BrewingState, Phase, Position, StateType, StepData};
use crate::stirrer::StirrerService;
use crate::temp_logger::TemperatureLogger;
use crate::temperature::TemperatureController;
use crate::watchdog::{PendingConfirmations, ResponseGuard, Verdict, Watchdog};

const REASON_CANCELLED: &str = "Cancelled";
const REASON_TIMEOUT: &str = "RequestResponseTimeout";
const REASON_SHUTDOWN: &str = "Shutdown";

/// Collaborators assembled by the builder.
pub(crate) struct Parts {
    pub temperature: Arc<TemperatureController>,
    pub stirrer: Arc<StirrerService>,
    pub logger: Arc<BrewingLogger>,
    pub acoustic: AcousticNotifier,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub cfg: BrewCfg,
}

struct Slot {
    process: Option<BrewingProcess>,
    pending: PendingConfirmations,
    summary: BrewingSummary,
    pushed: Vec<Message>,
    watchdog: Option<Watchdog>,
    /// Log of a process removed under the lock, persisted once it is released.
    retired: Option<BrewingLog>,
}

impl Slot {
    fn new() -> Self {
        Self {
            process: None,
            pending: PendingConfirmations::new(),
            summary: BrewingSummary::new(BrewingState::default()),
            pushed: Vec::new(),
            watchdog: None,
            retired: None,
        }
    }

    fn state(&self) -> Option<&BrewingState> {
        self.process.as_ref().map(|p| &p.state)
    }

    fn set_state(&mut self, state: BrewingState) {
        if let Some(p) = self.process.as_mut() {
            tracing::debug!(process_id = p.id, code = state.code(), "state {state}");
            p.state = state;
        }
    }

    fn is_current(&self, run: RunToken) -> bool {
        self.process
            .as_ref()
            .is_some_and(|p| p.id == run.process_id && p.state.phase == run.phase && !p.state.is_cancelled())
    }
}

struct Inner {
    slot: Mutex<Slot>,
    mash: MashDriver,
    hop: HopCookDriver,
    temperature: Arc<TemperatureController>,
    stirrer: Arc<StirrerService>,
    logger: Arc<BrewingLogger>,
    temp_logger: TemperatureLogger,
    acoustic: AcousticNotifier,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    cfg: BrewCfg,
    next_id: AtomicU64,
}

/// Supervises at most one brewing process.
pub struct BrewingController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BrewingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrewingController")
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}

impl BrewingController {
    pub(crate) fn from_parts(parts: Parts) -> Self {
        let Parts {
            temperature,
            stirrer,
            logger,
            acoustic,
            notifier,
            clock,
            cfg,
        } = parts;
        let inner = Arc::new_cyclic(|me: &Weak<Inner>| {
            let host: Weak<dyn PhaseHost> = me.clone();
            let ctx = DriverContext {
                temperature: Arc::clone(&temperature),
                stirrer: Arc::clone(&stirrer),
                logger: Arc::clone(&logger),
                clock: Arc::clone(&clock),
                host: ControllerHandle::new(host),
                cfg: cfg.clone(),
            };
            let temp_logger = TemperatureLogger::new(
                Arc::clone(&temperature),
                Arc::clone(&logger),
                Arc::clone(&clock),
                cfg.temperature_log.clone(),
            );
            Inner {
                slot: Mutex::new(Slot::new()),
                mash: MashDriver::new(ctx.clone()),
                hop: HopCookDriver::new(ctx),
                temperature,
                stirrer,
                logger,
                temp_logger,
                acoustic,
                notifier,
                clock,
                cfg,
                next_id: AtomicU64::new(1),
            }
        });
        tracing::info!("brewing controller ready");
        Self { inner }
    }

    /// Validate `recipe`, create the process and ask for the mashing start.
    ///
    /// Rejections leave no trace: no process, no log, no watchdog.
    pub fn start_brewing(&self, recipe: Recipe) -> Result<u64> {
        let inner = &self.inner;
        let mut slot = inner.lock();
        if let Some(p) = &slot.process {
            tracing::warn!(running = p.id, recipe = %p.recipe.id, "start rejected");
            return Err(ProcessError::AlreadyRunning.into());
        }
        recipe
            .validate(inner.cfg.temperature.room_temperature)
            .map_err(|e| ProcessError::InvalidRecipe(format!("{} ({}): {e}", recipe.id, recipe.name)))?;

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let watchdog = Watchdog::spawn(Arc::downgrade(inner), id, inner.cfg.timing.watchdog_poll)
            .map_err(|e| ProcessError::Scheduler(e.to_string()))?;

        let mut process = BrewingProcess::new(id, recipe.clone(), inner.clock.wall_ms());
        process.state = BrewingState::request(Phase::Mashing, Position::Start);
        inner.logger.start_log(id, recipe);
        slot.summary = BrewingSummary::new(process.state.clone());
        slot.summary.recipe_id = Some(process.recipe.id.clone());
        slot.pending.clear();
        slot.pushed.clear();
        slot.watchdog = Some(watchdog);
        inner.log(MessageKind::BrewingStart {
            recipe_id: process.recipe.id.clone(),
        });
        tracing::info!(process_id = id, recipe = %process.recipe.id, "brewing process created");
        slot.process = Some(process);
        inner.send_confirmation_request(&mut slot);
        Ok(id)
    }

    /// Accept an operator confirmation of the current request.
    pub fn confirm_step(&self, state: BrewingState) -> Result<()> {
        let mut slot = self.inner.lock();
        let res = self.inner.confirm_locked(&mut slot, &state);
        self.inner.settle(slot);
        res
    }

    /// Abort the running process; it stays in CANCEL until acknowledged.
    pub fn cancel_current_brewing_process(&self) -> Result<()> {
        let mut slot = self.inner.lock();
        let res = self.inner.terminate(
            &mut slot,
            REASON_CANCELLED,
            "Brewing process was cancelled by the operator",
        );
        self.inner.settle(slot);
        res
    }

    pub fn current_brewing_process(&self) -> Option<BrewingProcess> {
        self.inner.lock().process.clone()
    }

    pub fn current_state(&self) -> Option<BrewingState> {
        self.inner.lock().state().cloned()
    }

    pub fn current_brewing_process_summary(&self) -> Result<BrewingSummary> {
        let slot = self.inner.lock();
        let state = slot.state().ok_or(BrewError::ProcessNotFound)?;
        let mut summary = slot.summary.clone();
        summary.state = state.clone();
        Ok(summary)
    }

    /// Pre-notifications pushed during the running process.
    pub fn pushed_messages(&self) -> Result<Vec<Message>> {
        let slot = self.inner.lock();
        if slot.process.is_none() {
            return Err(BrewError::ProcessNotFound);
        }
        Ok(slot.pushed.clone())
    }

    pub fn pending_confirmations(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Snapshot of the running process's audit log.
    pub fn brewing_log(&self) -> Option<BrewingLog> {
        self.inner.logger.snapshot()
    }

    pub fn actuator_details(&self) -> ActuatorDetails {
        let inner = &self.inner;
        let sensor = inner.temperature.sensor_status();
        ActuatorDetails {
            heater_on: inner.temperature.heater_on(),
            stirrer_on: inner.stirrer.is_running(),
            sensor,
            temperature: if sensor == SensorStatus::Ok {
                inner.temperature.last_temperature()
            } else {
                None
            },
        }
    }

    pub fn config(&self) -> &BrewCfg {
        &self.inner.cfg
    }

    /// Best-effort stop of everything; never fails.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if !inner.stirrer.stop() {
            tracing::warn!("stirrer did not stop during shutdown");
        }
        inner.temperature.stop();
        inner.acoustic.switch_off();
        let mut slot = inner.lock();
        if slot.process.is_some() {
            if let Err(e) = inner.terminate(&mut slot, REASON_SHUTDOWN, "Brewing controller shut down") {
                tracing::debug!(error = %e, "terminate during shutdown");
            }
            inner.teardown(&mut slot);
        }
        inner.settle(slot);
        tracing::info!("brewing controller shut down");
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Release the lock, then persist a log retired while it was held.
    fn settle(&self, mut slot: MutexGuard<'_, Slot>) {
        let retired = slot.retired.take();
        drop(slot);
        if let Some(log) = retired {
            self.logger.persist(&log);
        }
    }

    fn log(&self, kind: MessageKind) {
        if let Err(e) = self.logger.log(kind) {
            tracing::debug!(error = %e, "log entry dropped");
        }
    }

    fn confirm_locked(&self, slot: &mut Slot, confirmed: &BrewingState) -> Result<()> {
        let current = slot.state().cloned().ok_or(BrewError::ProcessNotFound)?;
        self.log(MessageKind::Confirmation {
            current: current.clone(),
            confirmed: confirmed.clone(),
        });
        let res = self.dispatch(slot, &current, confirmed);
        if let Err(e) = &res {
            tracing::info!(current = %current, confirmed = %confirmed, error = %e, "confirmation rejected");
            self.log(MessageKind::Info {
                text: format!("confirmation rejected: {e}"),
            });
        }
        res
    }

    fn dispatch(&self, slot: &mut Slot, current: &BrewingState, confirmed: &BrewingState) -> Result<()> {
        if current.is_cancelled() {
            if confirmed == current {
                tracing::info!(state = %current, "cancellation acknowledged");
                self.teardown(slot);
                return Ok(());
            }
            return Err(BrewError::invalid_step(format!(
                "process was cancelled; only {current} can be confirmed"
            )));
        }
        if current.kind == StateType::Normal {
            return Err(BrewError::invalid_step("there is no request to be confirmed"));
        }
        if current != confirmed {
            return Err(BrewError::invalid_step(format!(
                "requested {} but confirmed {}",
                current.code(),
                confirmed.code()
            )));
        }
        match confirmed.phase {
            Phase::NotStarted => Ok(()),
            Phase::Mashing => self.on_mashing(slot, confirmed),
            Phase::Lautering => {
                Self::expect_end(confirmed)?;
                self.end_manual(slot, Phase::Lautering, Phase::HopCooking, Position::Start);
                Ok(())
            }
            Phase::HopCooking => self.on_hop_cooking(slot, confirmed),
            Phase::Whirlpool => {
                Self::expect_end(confirmed)?;
                self.end_manual(slot, Phase::Whirlpool, Phase::Finished, Position::End);
                Ok(())
            }
            Phase::Finished => {
                Self::expect_end(confirmed)?;
                self.log(MessageKind::BrewingComplete);
                self.teardown(slot);
                Ok(())
            }
        }
    }

    fn expect_end(state: &BrewingState) -> Result<()> {
        if state.position == Position::End {
            Ok(())
        } else {
            Err(BrewError::invalid_step(format!(
                "{:?} only accepts END",
                state.phase
            )))
        }
    }

    fn run_token(slot: &Slot, phase: Phase) -> Result<RunToken> {
        let process = slot.process.as_ref().ok_or(BrewError::ProcessNotFound)?;
        Ok(RunToken {
            process_id: process.id,
            phase,
        })
    }

    fn on_mashing(&self, slot: &mut Slot, confirmed: &BrewingState) -> Result<()> {
        match confirmed.position {
            Position::Start => {
                let run = Self::run_token(slot, Phase::Mashing)?;
                let plan = slot.process.as_ref().and_then(|p| p.recipe.mashing.clone());
                self.temp_logger.subscribe();
                let started = self.mash.start(run, plan.as_ref()).map_err(|e| {
                    self.temp_logger.unsubscribe();
                    BrewError::invalid_step(format!("cannot start mashing: {e}"))
                })?;
                slot.summary.mashing_start_ms = Some(self.clock.wall_ms());
                self.log(MessageKind::PhaseStarted {
                    phase: Phase::Mashing,
                });
                slot.set_state(BrewingState::new(StateType::Normal, Phase::Mashing, Position::Ongoing));
                if started == PhaseStart::Skipped {
                    self.end_mashing(slot);
                }
                Ok(())
            }
            Position::Adding => {
                let outcome = self.mash.confirm_state(confirmed)?;
                if let Some(items) = confirmed.ingredients() {
                    slot.pending.response_received(items);
                }
                self.apply(slot, Phase::Mashing, outcome);
                Ok(())
            }
            Position::Ongoing | Position::Iodine => {
                let outcome = self.mash.confirm_state(confirmed)?;
                self.apply(slot, Phase::Mashing, outcome);
                Ok(())
            }
            Position::End => {
                self.end_mashing(slot);
                Ok(())
            }
        }
    }

    fn on_hop_cooking(&self, slot: &mut Slot, confirmed: &BrewingState) -> Result<()> {
        match confirmed.position {
            Position::Start => {
                let run = Self::run_token(slot, Phase::HopCooking)?;
                let plan = slot.process.as_ref().and_then(|p| p.recipe.hop_cooking.clone());
                self.temp_logger.subscribe();
                let started = self.hop.start(run, plan.as_ref()).map_err(|e| {
                    self.temp_logger.unsubscribe();
                    BrewError::invalid_step(format!("cannot start hop cooking: {e}"))
                })?;
                // Mashing levels are no longer of interest.
                slot.summary.levels.clear();
                slot.summary.hop_cooking_start_ms = Some(self.clock.wall_ms());
                self.log(MessageKind::PhaseStarted {
                    phase: Phase::HopCooking,
                });
                slot.set_state(BrewingState::new(StateType::Normal, Phase::HopCooking, Position::Ongoing));
                if started == PhaseStart::Skipped {
                    self.end_hop_cooking(slot);
                }
                Ok(())
            }
            Position::End => {
                self.end_hop_cooking(slot);
                Ok(())
            }
            _ => {
                let outcome = self.hop.confirm_state(confirmed)?;
                if let Some(items) = confirmed.ingredients() {
                    slot.pending.response_received(items);
                }
                self.apply(slot, Phase::HopCooking, outcome);
                Ok(())
            }
        }
    }

    fn apply(&self, slot: &mut Slot, phase: Phase, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Proceed(position) => {
                slot.set_state(BrewingState::new(StateType::Normal, phase, position));
            }
            StepOutcome::Rerequest { position, data } => {
                slot.set_state(BrewingState::request(phase, position).with_data(data));
                self.send_confirmation_request(slot);
            }
        }
    }

    fn end_mashing(&self, slot: &mut Slot) {
        self.temp_logger.unsubscribe();
        self.mash.finish();
        self.log(MessageKind::PhaseEnded {
            phase: Phase::Mashing,
        });
        self.log(MessageKind::PhaseStarted {
            phase: Phase::Lautering,
        });
        slot.set_state(BrewingState::request(Phase::Lautering, Position::End));
        self.send_confirmation_request(slot);
    }

    fn end_hop_cooking(&self, slot: &mut Slot) {
        self.temp_logger.unsubscribe();
        self.hop.finish();
        self.log(MessageKind::PhaseEnded {
            phase: Phase::HopCooking,
        });
        self.log(MessageKind::PhaseStarted {
            phase: Phase::Whirlpool,
        });
        slot.set_state(BrewingState::request(Phase::Whirlpool, Position::End));
        self.send_confirmation_request(slot);
    }

    fn end_manual(&self, slot: &mut Slot, done: Phase, next: Phase, position: Position) {
        self.log(MessageKind::PhaseEnded { phase: done });
        slot.set_state(BrewingState::request(next, position));
        self.send_confirmation_request(slot);
    }

    /// Tell the operator about the current request and track its ingredients.
    fn send_confirmation_request(&self, slot: &mut Slot) {
        let Some(state) = slot.state().cloned() else {
            return;
        };
        if !state.phase.is_manual()
            && !state.is_cancelled()
            && let Some(items) = state.ingredients()
        {
            slot.pending.request_sent(items, self.clock.now());
        }
        self.acoustic.confirmation_request();
        let msg = Message::new(
            MessageKind::ConfirmationRequest {
                state: state.clone(),
            },
            self.clock.wall_ms(),
        );
        self.notifier.notify(&msg);
        if let Err(e) = self.logger.append(msg) {
            tracing::warn!(error = %e, code = state.code(), "could not log confirmation request");
        }
        tracing::info!(code = state.code(), "confirmation requested: {state}");
    }

    /// Force the running process into CANCEL. Only the first call has an effect.
    fn terminate(&self, slot: &mut Slot, reason: &str, alarm: &str) -> Result<()> {
        let state = slot.state().cloned().ok_or(BrewError::ProcessNotFound)?;
        if state.is_cancelled() {
            return Ok(());
        }
        self.log(MessageKind::BrewingAborted {
            reason: reason.to_owned(),
        });
        self.mash.finish();
        self.hop.finish();
        self.temp_logger.unsubscribe();
        if let Some(dog) = slot.watchdog.take() {
            dog.stop();
        }
        slot.pending.clear();
        slot.set_state(BrewingState::new(StateType::Cancel, state.phase, state.position));
        tracing::warn!(reason, state = %state, "brewing process aborted");
        self.notifier.alarm(alarm);
        self.send_confirmation_request(slot);
        Ok(())
    }

    /// Remove the process and release everything it held.
    fn teardown(&self, slot: &mut Slot) {
        if let Some(dog) = slot.watchdog.take() {
            dog.stop();
        }
        self.mash.finish();
        self.hop.finish();
        self.temp_logger.unsubscribe();
        slot.pending.clear();
        slot.pushed.clear();
        slot.summary = BrewingSummary::new(BrewingState::default());
        if let Some(process) = slot.process.take() {
            tracing::info!(
                process_id = process.id,
                state = %process.state,
                "brewing process removed"
            );
        }
        let end_time_ms = self.clock.wall_ms();
        slot.retired = self.logger.take_log().ok().map(|mut log| {
            log.end_time_ms = Some(end_time_ms);
            log
        });
    }
}

impl PhaseHost for Inner {
    fn request_confirmation(&self, run: RunToken, position: Position, data: Option<StepData>) {
        let mut slot = self.lock();
        if !slot.is_current(run) {
            tracing::debug!(?run, ?position, "stale confirmation request dropped");
            return;
        }
        let mut state = BrewingState::request(run.phase, position);
        state.data = data;
        slot.set_state(state);
        self.send_confirmation_request(&mut slot);
    }

    fn request_internal(&self, run: RunToken, position: Position) {
        let mut slot = self.lock();
        if slot.is_current(run) {
            slot.set_state(BrewingState::intern(run.phase, position));
        }
    }

    fn proceed(&self, run: RunToken, position: Position) {
        let mut slot = self.lock();
        if slot.is_current(run) {
            slot.set_state(BrewingState::new(StateType::Normal, run.phase, position));
        }
    }

    fn notify(&self, run: RunToken, message: MessageKind) {
        let mut slot = self.lock();
        if !slot.is_current(run) {
            return;
        }
        let msg = Message::new(message, self.clock.wall_ms());
        if msg.is_prenotification() {
            self.acoustic.prenotification();
            slot.pushed.push(msg.clone());
        }
        self.notifier.notify(&msg);
        if let Err(e) = self.logger.append(msg) {
            tracing::debug!(error = %e, "notification not logged");
        }
    }

    fn update_temperature_level(&self, run: RunToken, info: TemperatureLevelInfo) {
        let mut slot = self.lock();
        if slot.is_current(run) {
            slot.summary.update_level(info);
        }
    }

    fn complete_phase(&self, run: RunToken) -> Result<()> {
        let mut slot = self.lock();
        if !slot.is_current(run) {
            return Err(BrewError::invalid_step(format!(
                "{:?} of process {} is not running",
                run.phase, run.process_id
            )));
        }
        let state = BrewingState::intern(run.phase, Position::End);
        slot.set_state(state.clone());
        let res = self.confirm_locked(&mut slot, &state);
        self.settle(slot);
        res
    }
}

impl ResponseGuard for Inner {
    fn check_responses(&self, process_id: u64) -> Verdict {
        let mut slot = self.lock();
        let live = slot
            .process
            .as_ref()
            .is_some_and(|p| p.id == process_id && !p.state.is_cancelled());
        if !live {
            return Verdict::Done;
        }
        let timeout = self.cfg.timing.response_timeout;
        let Some(item) = slot.pending.expired(self.clock.now(), timeout).cloned() else {
            return Verdict::KeepWatching;
        };
        tracing::warn!(
            process_id,
            item = %item.name,
            ?timeout,
            "confirmation request timed out, cancelling brewing process"
        );
        if let Err(e) = self.terminate(
            &mut slot,
            REASON_TIMEOUT,
            "Brewing process was aborted. The confirmation request was not confirmed in time",
        ) {
            tracing::debug!(error = %e, "timeout without process");
        }
        Verdict::Done
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Driver threads wait on channels owned by the drivers; close them.
        self.mash.finish();
        self.hop.finish();
    }
}
