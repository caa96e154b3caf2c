//! Mashing: temperature levels, malt additions and the closing iodine test.
//!
//! The recipe is flattened into one schedule ordered by phase time. The phase
//! clock is a `PausableTimer` that stands still while a level is heating up and
//! while malt additions wait for confirmation, so recipe offsets count only
//! time spent at temperature.
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel as xch;

use super::{
    DriverContext, PhaseDriver, PhaseStart, RunSlot, RunToken, StepOutcome, delay_until, lock,
    take_confirmed,
};
use crate::error::{BrewError, ProcessError, Result};
use crate::message::MessageKind;
use crate::process::TemperatureLevelInfo;
use crate::recipe::{IngredientAddition, IodineTest, MashingPlan};
use crate::state::{BrewingState, Position, StepData};
use crate::temperature::{SubscribeStatus, SubscriptionId};
use crate::timer::PausableTimer;

#[derive(Debug, Clone, PartialEq)]
pub enum MashAction {
    PreNotify(Vec<IngredientAddition>),
    AdditionDue(Vec<IngredientAddition>),
    /// Heat to the level with this index.
    LevelStart(usize),
}

impl MashAction {
    fn items_mut(&mut self) -> Option<&mut Vec<IngredientAddition>> {
        match self {
            Self::PreNotify(v) | Self::AdditionDue(v) => Some(v),
            Self::LevelStart(_) => None,
        }
    }

    // Tie-break for equal timestamps.
    const fn rank(&self) -> u8 {
        match self {
            Self::PreNotify(_) => 0,
            Self::AdditionDue(_) => 1,
            Self::LevelStart(_) => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledAction {
    /// Phase time in ms; pre-notifications of early additions may be negative.
    pub at_ms: i64,
    pub action: MashAction,
}

/// Merge levels after the first, pre-notifications and addition-due events.
///
/// Ordered by time, then pre-notify before addition-due before level start.
/// Additions sharing a time are grouped into one entry.
pub fn build_schedule(plan: &MashingPlan, lead_ms: i64) -> Vec<ScheduledAction> {
    let mut raw: Vec<ScheduledAction> = Vec::with_capacity(plan.malt_additions.len() * 2 + plan.levels.len());
    for m in &plan.malt_additions {
        raw.push(ScheduledAction {
            at_ms: m.input_time_ms.saturating_sub(lead_ms),
            action: MashAction::PreNotify(vec![m.clone()]),
        });
        raw.push(ScheduledAction {
            at_ms: m.input_time_ms,
            action: MashAction::AdditionDue(vec![m.clone()]),
        });
    }
    for (i, level) in plan.levels.iter().enumerate().skip(1) {
        raw.push(ScheduledAction {
            at_ms: level.start_ms,
            action: MashAction::LevelStart(i),
        });
    }
    raw.sort_by_key(|a| (a.at_ms, a.action.rank()));

    let mut out: Vec<ScheduledAction> = Vec::with_capacity(raw.len());
    for next in raw {
        if let Some(prev) = out.last_mut()
            && prev.at_ms == next.at_ms
            && prev.action.rank() == next.action.rank()
            && let (Some(into), MashAction::PreNotify(items) | MashAction::AdditionDue(items)) =
                (prev.action.items_mut(), &next.action)
        {
            into.extend(items.iter().cloned());
            continue;
        }
        out.push(next);
    }
    out
}

#[derive(Debug)]
enum MashEvent {
    Wake(u64),
    LevelReached(usize),
    AdditionsConfirmed,
    Iodine(IodineTest),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Heating(usize),
    Waiting,
    AwaitingAdditions,
    FinalRest,
    AwaitingIodine,
    IodineWait,
}

struct MashShared {
    slot: RunSlot<MashEvent>,
    level_sub: Option<SubscriptionId>,
    requested: Vec<IngredientAddition>,
    awaiting_iodine: bool,
}

pub struct MashDriver {
    ctx: DriverContext,
    shared: Arc<Mutex<MashShared>>,
}

impl std::fmt::Debug for MashDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MashDriver")
            .field("active", &self.is_active())
            .finish()
    }
}

impl MashDriver {
    pub fn new(ctx: DriverContext) -> Self {
        Self {
            ctx,
            shared: Arc::new(Mutex::new(MashShared {
                slot: RunSlot::new(),
                level_sub: None,
                requested: Vec::new(),
                awaiting_iodine: false,
            })),
        }
    }

    /// Malt additions currently waiting for confirmation.
    pub fn requested(&self) -> Vec<IngredientAddition> {
        lock(&self.shared).requested.clone()
    }
}

impl PhaseDriver for MashDriver {
    type Plan = MashingPlan;

    fn start(&self, run: RunToken, plan: Option<&MashingPlan>) -> Result<PhaseStart> {
        let mut s = lock(&self.shared);
        if s.slot.run.is_some() {
            return Err(BrewError::invalid_step("another mashing process is already running"));
        }
        let Some(plan) = plan.filter(|p| !p.is_empty()) else {
            tracing::info!("no mashing plan, skipping mashing");
            return Ok(PhaseStart::Skipped);
        };
        let lead_ms = i64::try_from(self.ctx.cfg.timing.prenotify_lead.as_millis()).unwrap_or(i64::MAX);
        let (tx, rx) = xch::unbounded();
        let mut job = MashRun {
            run,
            schedule: build_schedule(plan, lead_ms),
            plan: plan.clone(),
            cursor: 0,
            timer: PausableTimer::new(),
            stage: Stage::Waiting,
            wake: None,
            ctx: self.ctx.clone(),
            shared: Arc::clone(&self.shared),
        };
        s.slot.run = Some(run);
        s.slot.events = Some(tx);
        s.requested.clear();
        s.awaiting_iodine = false;
        drop(s);

        let spawned = thread::Builder::new()
            .name("mash-schedule".into())
            .spawn(move || job.run_loop(&rx));
        if let Err(e) = spawned {
            lock(&self.shared).slot.close(MashEvent::Stop);
            return Err(ProcessError::Scheduler(e.to_string()).into());
        }
        if !self.ctx.stirrer.start() {
            tracing::warn!("stirrer did not start, mashing continues");
        }
        tracing::info!(process_id = run.process_id, "mashing started");
        Ok(PhaseStart::Started)
    }

    fn confirm_state(&self, state: &BrewingState) -> Result<StepOutcome> {
        let mut s = lock(&self.shared);
        if s.slot.run.is_none() {
            return Err(BrewError::invalid_step("mashing is not running"));
        }
        match state.position {
            Position::Adding => {
                let items = state
                    .ingredients()
                    .ok_or_else(|| BrewError::invalid_step("malt confirmation without ingredients"))?;
                take_confirmed(&mut s.requested, items)?;
                self.ctx.log(MessageKind::MaltAddition {
                    additions: items.to_vec(),
                });
                if s.requested.is_empty() {
                    s.slot.send(MashEvent::AdditionsConfirmed);
                    Ok(StepOutcome::Proceed(Position::Ongoing))
                } else {
                    Ok(StepOutcome::Rerequest {
                        position: Position::Adding,
                        data: StepData::Ingredients(s.requested.clone()),
                    })
                }
            }
            Position::Iodine => {
                if !s.awaiting_iodine {
                    return Err(BrewError::invalid_step("no iodine test was requested"));
                }
                let test = *state
                    .iodine_test()
                    .ok_or_else(|| BrewError::invalid_step("iodine confirmation without result"))?;
                s.awaiting_iodine = false;
                self.ctx.log(MessageKind::IodineTest { result: test });
                s.slot.send(MashEvent::Iodine(test));
                Ok(StepOutcome::Proceed(Position::Iodine))
            }
            Position::Ongoing => Ok(StepOutcome::Proceed(Position::Ongoing)),
            other => Err(BrewError::invalid_step(format!(
                "mashing cannot confirm {other:?}"
            ))),
        }
    }

    fn finish(&self) {
        let closed = {
            let mut s = lock(&self.shared);
            if let Some(id) = s.level_sub.take() {
                self.ctx.temperature.unsubscribe(id);
            }
            s.requested.clear();
            s.awaiting_iodine = false;
            s.slot.close(MashEvent::Stop)
        };
        self.ctx.release_hardware();
        if let Some(run) = closed {
            tracing::info!(process_id = run.process_id, "mashing finished");
        }
    }

    fn is_active(&self) -> bool {
        lock(&self.shared).slot.run.is_some()
    }
}

/// State owned by the scheduling thread of one mashing run.
struct MashRun {
    run: RunToken,
    plan: MashingPlan,
    schedule: Vec<ScheduledAction>,
    cursor: usize,
    timer: PausableTimer,
    stage: Stage,
    wake: Option<u64>,
    ctx: DriverContext,
    shared: Arc<Mutex<MashShared>>,
}

impl MashRun {
    fn run_loop(&mut self, rx: &xch::Receiver<MashEvent>) {
        if !self.begin_level(0) {
            return;
        }
        while let Ok(event) = rx.recv() {
            tracing::trace!(?event, stage = ?self.stage, "mash event");
            let keep_going = match event {
                MashEvent::Stop => false,
                MashEvent::Wake(seq) if self.wake == Some(seq) => {
                    self.wake = None;
                    match self.stage {
                        Stage::Waiting => self.advance(),
                        Stage::FinalRest | Stage::IodineWait => self.request_iodine(),
                        _ => true,
                    }
                }
                MashEvent::LevelReached(idx) if self.stage == Stage::Heating(idx) => {
                    self.level_reached(idx)
                }
                MashEvent::AdditionsConfirmed if self.stage == Stage::AwaitingAdditions => {
                    self.timer.resume(self.ctx.clock.now());
                    self.advance()
                }
                MashEvent::Iodine(test) if self.stage == Stage::AwaitingIodine => {
                    if test.is_positive() {
                        self.end();
                        false
                    } else {
                        self.stage = Stage::IodineWait;
                        self.arm(test.wait())
                    }
                }
                stale => {
                    tracing::trace!(?stale, "stale mash event ignored");
                    true
                }
            };
            if !keep_going {
                break;
            }
        }
        tracing::debug!(process_id = self.run.process_id, "mash scheduler exiting");
    }

    fn now_ms(&self) -> i64 {
        self.timer.elapsed_ms(self.ctx.clock.now())
    }

    fn arm(&mut self, delay: std::time::Duration) -> bool {
        let mut s = lock(&self.shared);
        if !s.slot.is_current(self.run) {
            return false;
        }
        self.wake = s.slot.arm("mash-wait", delay, MashEvent::Wake);
        self.wake.is_some()
    }

    fn level_info(&self, idx: usize, started: bool) -> Option<TemperatureLevelInfo> {
        let level = self.plan.levels.get(idx)?;
        Some(TemperatureLevelInfo {
            index: idx,
            recipe_start_ms: level.start_ms,
            duration_ms: level.duration_ms,
            temperature: level.temperature,
            started,
            start_time_ms: started.then(|| self.ctx.clock.wall_ms()),
        })
    }

    fn begin_level(&mut self, idx: usize) -> bool {
        self.timer.pause(self.ctx.clock.now());
        let Some(level) = self.plan.levels.get(idx).copied() else {
            return self.advance();
        };
        {
            let mut s = lock(&self.shared);
            if !s.slot.is_current(self.run) {
                return false;
            }
            if let Some(old) = s.level_sub.take() {
                self.ctx.temperature.unsubscribe(old);
            }
            let Some(tx) = s.slot.events.clone() else {
                return false;
            };
            let id = self.ctx.temperature.subscribe(
                level.temperature,
                self.ctx.cfg.temperature.heatup_delta,
                move |_celsius: f32| {
                    let _ = tx.send(MashEvent::LevelReached(idx));
                    SubscribeStatus::Unsubscribe
                },
            );
            s.level_sub = Some(id);
            self.ctx.temperature.heat_up(level.temperature);
        }
        self.stage = Stage::Heating(idx);
        tracing::info!(level = idx, temperature = level.temperature, "heating to mash level");
        if let Some(info) = self.level_info(idx, false) {
            self.ctx.host.update_temperature_level(self.run, info);
        }
        true
    }

    fn level_reached(&mut self, idx: usize) -> bool {
        {
            let mut s = lock(&self.shared);
            if !s.slot.is_current(self.run) {
                return false;
            }
            s.level_sub = None;
        }
        self.timer.resume(self.ctx.clock.now());
        if let Some(level) = self.plan.levels.get(idx) {
            self.ctx.log(MessageKind::TemperatureLevel {
                index: idx,
                duration_ms: level.duration_ms,
                temperature: level.temperature,
            });
        }
        if let Some(info) = self.level_info(idx, true) {
            self.ctx.host.update_temperature_level(self.run, info);
        }
        self.advance()
    }

    /// Process every due action; stops at the first one that has to wait.
    fn advance(&mut self) -> bool {
        loop {
            let now_ms = self.now_ms();
            let Some(next) = self.schedule.get(self.cursor).cloned() else {
                return self.final_rest(now_ms);
            };
            if next.at_ms > now_ms {
                self.stage = Stage::Waiting;
                return self.arm(delay_until(next.at_ms, now_ms));
            }
            self.cursor += 1;
            match next.action {
                MashAction::PreNotify(items) => self.prenotify(&items, now_ms),
                MashAction::AdditionDue(items) => return self.request_additions(items),
                MashAction::LevelStart(idx) => return self.begin_level(idx),
            }
        }
    }

    fn prenotify(&self, items: &[IngredientAddition], now_ms: i64) {
        let Some(due) = items.first().map(|i| i.input_time_ms) else {
            return;
        };
        // Late notices are still useful as long as the addition is not due yet.
        if due < now_ms {
            tracing::debug!(due, now_ms, "malt pre-notification skipped");
            return;
        }
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        self.ctx.host.notify(
            self.run,
            MessageKind::PreNotification {
                content: format!("Malt addition due soon: {}", names.join(", ")),
                millis_to_go: u64::try_from(due - now_ms).unwrap_or(0),
            },
        );
    }

    fn request_additions(&mut self, items: Vec<IngredientAddition>) -> bool {
        self.timer.pause(self.ctx.clock.now());
        let pending = {
            let mut s = lock(&self.shared);
            if !s.slot.is_current(self.run) {
                return false;
            }
            s.requested.extend(items);
            s.requested.clone()
        };
        self.stage = Stage::AwaitingAdditions;
        self.ctx.host.request_confirmation(
            self.run,
            Position::Adding,
            Some(StepData::Ingredients(pending)),
        );
        true
    }

    fn final_rest(&mut self, now_ms: i64) -> bool {
        let end_ms = self.plan.levels.last().map_or(0, |l| l.end_ms());
        if end_ms > now_ms {
            self.stage = Stage::FinalRest;
            return self.arm(delay_until(end_ms, now_ms));
        }
        self.request_iodine()
    }

    fn request_iodine(&mut self) -> bool {
        {
            let mut s = lock(&self.shared);
            if !s.slot.is_current(self.run) {
                return false;
            }
            s.awaiting_iodine = true;
        }
        self.stage = Stage::AwaitingIodine;
        self.ctx
            .host
            .request_confirmation(self.run, Position::Iodine, None);
        true
    }

    fn end(&mut self) {
        {
            let mut s = lock(&self.shared);
            if !s.slot.is_current(self.run) {
                return;
            }
            if let Some(id) = s.level_sub.take() {
                self.ctx.temperature.unsubscribe(id);
            }
        }
        self.ctx.release_hardware();
        tracing::info!(process_id = self.run.process_id, "iodine test positive, mashing done");
        self.ctx.host.complete_phase(self.run);
    }
}
