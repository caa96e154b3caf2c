//! Hop cooking: heat to boil, add hops on schedule, boil for the plan duration.
//! A plan without additions skips the phase.
//!
//! Unlike mashing, the boil clock does not wait for each addition to be
//! confirmed. Only once every addition has been requested does the driver wait
//! for outstanding confirmations, pausing its clock, for at most the response
//! timeout plus two watchdog periods. If additions are still unconfirmed by then
//! the driver stops advancing and leaves the process to the watchdog.
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel as xch;

use super::{
    DriverContext, PhaseDriver, PhaseStart, RunSlot, RunToken, StepOutcome, delay_until, lock,
    take_confirmed,
};
use crate::error::{BrewError, ProcessError, Result};
use crate::message::MessageKind;
use crate::process::TemperatureLevelInfo;
use crate::recipe::{HopCookingPlan, IngredientAddition};
use crate::state::{BrewingState, Position, StepData};
use crate::temperature::{SubscribeStatus, SubscriptionId};
use crate::timer::PausableTimer;

/// Band around the boil temperature that counts as reached.
const BOIL_TOLERANCE: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum HopAction {
    PreNotify(Vec<IngredientAddition>),
    AdditionDue(Vec<IngredientAddition>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HopStep {
    pub at_ms: i64,
    pub action: HopAction,
}

/// Pre-notification and addition-due steps for every group of same-time hops.
pub fn build_hop_schedule(plan: &HopCookingPlan, lead_ms: i64) -> Vec<HopStep> {
    let mut groups: Vec<(i64, Vec<IngredientAddition>)> = Vec::new();
    for hop in &plan.additions {
        match groups.last_mut() {
            Some((t, items)) if *t == hop.input_time_ms => items.push(hop.clone()),
            _ => groups.push((hop.input_time_ms, vec![hop.clone()])),
        }
    }
    let mut steps = Vec::with_capacity(groups.len() * 2);
    for (t, items) in groups {
        steps.push(HopStep {
            at_ms: t.saturating_sub(lead_ms),
            action: HopAction::PreNotify(items.clone()),
        });
        steps.push(HopStep {
            at_ms: t,
            action: HopAction::AdditionDue(items),
        });
    }
    steps.sort_by_key(|s| (s.at_ms, matches!(s.action, HopAction::AdditionDue(_))));
    steps
}

#[derive(Debug)]
enum HopEvent {
    Wake(u64),
    PreHeat,
    Reached,
    AdditionsConfirmed,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Heating,
    Waiting,
    Tolerating,
    Stalled,
    EndNotice,
    Boiling,
}

struct HopShared {
    slot: RunSlot<HopEvent>,
    subscriptions: Vec<SubscriptionId>,
    expected: Vec<IngredientAddition>,
}

pub struct HopCookDriver {
    ctx: DriverContext,
    shared: Arc<Mutex<HopShared>>,
}

impl std::fmt::Debug for HopCookDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HopCookDriver")
            .field("active", &self.is_active())
            .finish()
    }
}

impl HopCookDriver {
    pub fn new(ctx: DriverContext) -> Self {
        Self {
            ctx,
            shared: Arc::new(Mutex::new(HopShared {
                slot: RunSlot::new(),
                subscriptions: Vec::new(),
                expected: Vec::new(),
            })),
        }
    }

    /// Hop additions requested but not yet confirmed.
    pub fn expected(&self) -> Vec<IngredientAddition> {
        lock(&self.shared).expected.clone()
    }
}

impl PhaseDriver for HopCookDriver {
    type Plan = HopCookingPlan;

    fn start(&self, run: RunToken, plan: Option<&HopCookingPlan>) -> Result<PhaseStart> {
        let mut s = lock(&self.shared);
        if s.slot.run.is_some() {
            return Err(BrewError::invalid_step("hop cooking is already running"));
        }
        let Some(plan) = plan.filter(|p| !p.additions.is_empty()) else {
            tracing::info!("no hop additions, skipping hop cooking");
            return Ok(PhaseStart::Skipped);
        };
        let cfg = &self.ctx.cfg;
        let lead_ms = i64::try_from(cfg.hop.prenotify_lead.as_millis()).unwrap_or(i64::MAX);
        let (tx, rx) = xch::unbounded();

        let boil = cfg.hop.temperature;
        let pre_tx = tx.clone();
        let pre = self
            .ctx
            .temperature
            .subscribe(boil, cfg.hop.prenotify_delta, move |_celsius: f32| {
                let _ = pre_tx.send(HopEvent::PreHeat);
                SubscribeStatus::Unsubscribe
            });
        let reached_tx = tx.clone();
        let reached = self
            .ctx
            .temperature
            .subscribe(boil, BOIL_TOLERANCE, move |_celsius: f32| {
                let _ = reached_tx.send(HopEvent::Reached);
                SubscribeStatus::Unsubscribe
            });

        let mut job = HopRun {
            run,
            steps: build_hop_schedule(plan, lead_ms),
            plan: plan.clone(),
            cursor: 0,
            timer: PausableTimer::new(),
            stage: Stage::Heating,
            wake: None,
            ctx: self.ctx.clone(),
            shared: Arc::clone(&self.shared),
        };
        s.slot.run = Some(run);
        s.slot.events = Some(tx);
        s.subscriptions = vec![pre, reached];
        s.expected.clear();
        drop(s);

        let spawned = thread::Builder::new()
            .name("hop-schedule".into())
            .spawn(move || job.run_loop(&rx));
        if let Err(e) = spawned {
            self.finish();
            return Err(ProcessError::Scheduler(e.to_string()).into());
        }
        self.ctx.temperature.heat_up(boil);
        tracing::info!(process_id = run.process_id, boil, "hop cooking started");
        Ok(PhaseStart::Started)
    }

    fn confirm_state(&self, state: &BrewingState) -> Result<StepOutcome> {
        let mut s = lock(&self.shared);
        if s.slot.run.is_none() {
            return Err(BrewError::invalid_step("hop cooking is not running"));
        }
        if state.position != Position::Adding {
            return Err(BrewError::invalid_step(format!(
                "hop cooking cannot confirm {:?}",
                state.position
            )));
        }
        let items = state
            .ingredients()
            .ok_or_else(|| BrewError::invalid_step("hop confirmation without ingredients"))?;
        take_confirmed(&mut s.expected, items)?;
        self.ctx.log(MessageKind::HopAddition {
            additions: items.to_vec(),
        });
        if s.expected.is_empty() {
            s.slot.send(HopEvent::AdditionsConfirmed);
            Ok(StepOutcome::Proceed(Position::Adding))
        } else {
            Ok(StepOutcome::Rerequest {
                position: Position::Adding,
                data: StepData::Ingredients(s.expected.clone()),
            })
        }
    }

    fn finish(&self) {
        let closed = {
            let mut s = lock(&self.shared);
            for id in s.subscriptions.drain(..) {
                self.ctx.temperature.unsubscribe(id);
            }
            s.expected.clear();
            s.slot.close(HopEvent::Stop)
        };
        self.ctx.release_hardware();
        if let Some(run) = closed {
            tracing::info!(process_id = run.process_id, "hop cooking finished");
        }
    }

    fn is_active(&self) -> bool {
        lock(&self.shared).slot.run.is_some()
    }
}

struct HopRun {
    run: RunToken,
    plan: HopCookingPlan,
    steps: Vec<HopStep>,
    cursor: usize,
    timer: PausableTimer,
    stage: Stage,
    wake: Option<u64>,
    ctx: DriverContext,
    shared: Arc<Mutex<HopShared>>,
}

impl HopRun {
    fn run_loop(&mut self, rx: &xch::Receiver<HopEvent>) {
        self.ctx.host.update_temperature_level(self.run, self.level_info(false));
        while let Ok(event) = rx.recv() {
            tracing::trace!(?event, stage = ?self.stage, "hop event");
            let keep_going = match event {
                HopEvent::Stop => false,
                HopEvent::PreHeat if self.stage == Stage::Heating => {
                    self.ctx.host.notify(
                        self.run,
                        MessageKind::PreNotification {
                            content: "Hop cooking temperature will be reached shortly".into(),
                            millis_to_go: 0,
                        },
                    );
                    true
                }
                HopEvent::Reached if self.stage == Stage::Heating => self.boil_reached(),
                HopEvent::Wake(seq) if self.wake == Some(seq) => {
                    self.wake = None;
                    match self.stage {
                        Stage::Waiting => self.advance(),
                        Stage::Tolerating => {
                            tracing::warn!(
                                process_id = self.run.process_id,
                                "hop additions still unconfirmed, waiting for the watchdog"
                            );
                            self.stage = Stage::Stalled;
                            true
                        }
                        Stage::EndNotice => self.end_notice(),
                        Stage::Boiling => {
                            self.end();
                            false
                        }
                        _ => true,
                    }
                }
                HopEvent::AdditionsConfirmed
                    if matches!(self.stage, Stage::Tolerating | Stage::Stalled) =>
                {
                    self.timer.resume(self.ctx.clock.now());
                    self.tail()
                }
                stale => {
                    tracing::trace!(?stale, "hop event ignored");
                    true
                }
            };
            if !keep_going {
                break;
            }
        }
        tracing::debug!(process_id = self.run.process_id, "hop scheduler exiting");
    }

    fn now_ms(&self) -> i64 {
        self.timer.elapsed_ms(self.ctx.clock.now())
    }

    fn arm(&mut self, delay: Duration) -> bool {
        let mut s = lock(&self.shared);
        if !s.slot.is_current(self.run) {
            return false;
        }
        self.wake = s.slot.arm("hop-wait", delay, HopEvent::Wake);
        self.wake.is_some()
    }

    fn level_info(&self, started: bool) -> TemperatureLevelInfo {
        TemperatureLevelInfo {
            index: 0,
            recipe_start_ms: 0,
            duration_ms: self.plan.duration_ms,
            temperature: self.ctx.cfg.hop.temperature,
            started,
            start_time_ms: started.then(|| self.ctx.clock.wall_ms()),
        }
    }

    fn boil_reached(&mut self) -> bool {
        {
            let mut s = lock(&self.shared);
            if !s.slot.is_current(self.run) {
                return false;
            }
            // Both one-shot listeners have fired or are about to; drop them.
            for id in s.subscriptions.drain(..) {
                self.ctx.temperature.unsubscribe(id);
            }
        }
        self.timer.resume(self.ctx.clock.now());
        self.ctx.log(MessageKind::TemperatureLevel {
            index: 0,
            duration_ms: self.plan.duration_ms,
            temperature: self.ctx.cfg.hop.temperature,
        });
        self.ctx
            .host
            .update_temperature_level(self.run, self.level_info(true));
        tracing::info!(process_id = self.run.process_id, "boil reached");
        self.advance()
    }

    fn advance(&mut self) -> bool {
        loop {
            let now_ms = self.now_ms();
            let Some(step) = self.steps.get(self.cursor).cloned() else {
                return self.tail();
            };
            if step.at_ms > now_ms {
                self.stage = Stage::Waiting;
                return self.arm(delay_until(step.at_ms, now_ms));
            }
            self.cursor += 1;
            match step.action {
                HopAction::PreNotify(items) => self.prenotify(&items, now_ms),
                HopAction::AdditionDue(items) => {
                    if !self.request(items) {
                        return false;
                    }
                }
            }
        }
    }

    fn prenotify(&self, items: &[IngredientAddition], now_ms: i64) {
        let Some(due) = items.first().map(|i| i.input_time_ms) else {
            return;
        };
        if due < now_ms {
            return;
        }
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        self.ctx.host.notify(
            self.run,
            MessageKind::PreNotification {
                content: format!("Hop addition due soon: {}", names.join(", ")),
                millis_to_go: u64::try_from(due - now_ms).unwrap_or(0),
            },
        );
    }

    fn request(&mut self, items: Vec<IngredientAddition>) -> bool {
        let pending = {
            let mut s = lock(&self.shared);
            if !s.slot.is_current(self.run) {
                return false;
            }
            s.expected.extend(items);
            s.expected.clone()
        };
        self.ctx.host.request_confirmation(
            self.run,
            Position::Adding,
            Some(StepData::Ingredients(pending)),
        );
        true
    }

    /// Every addition has been requested: settle outstanding ones, then boil out.
    fn tail(&mut self) -> bool {
        let outstanding = {
            let s = lock(&self.shared);
            if !s.slot.is_current(self.run) {
                return false;
            }
            !s.expected.is_empty()
        };
        if outstanding {
            self.timer.pause(self.ctx.clock.now());
            self.stage = Stage::Tolerating;
            let timing = &self.ctx.cfg.timing;
            let window = timing.response_timeout + timing.watchdog_poll * 2;
            return self.arm(window);
        }
        let now_ms = self.now_ms();
        let lead_ms =
            i64::try_from(self.ctx.cfg.hop.end_notice_lead.as_millis()).unwrap_or(i64::MAX);
        let notice_at = self.plan.duration_ms.saturating_sub(lead_ms);
        if notice_at > now_ms {
            self.stage = Stage::EndNotice;
            return self.arm(delay_until(notice_at, now_ms));
        }
        self.end_notice()
    }

    fn end_notice(&mut self) -> bool {
        let now_ms = self.now_ms();
        let left = self.plan.duration_ms.saturating_sub(now_ms);
        if left > 0 {
            self.ctx.host.notify(
                self.run,
                MessageKind::PreNotification {
                    content: "Hop cooking will end shortly".into(),
                    millis_to_go: u64::try_from(left).unwrap_or(0),
                },
            );
            self.stage = Stage::Boiling;
            return self.arm(delay_until(self.plan.duration_ms, now_ms));
        }
        self.end();
        false
    }

    fn end(&mut self) {
        if !lock(&self.shared).slot.is_current(self.run) {
            return;
        }
        self.ctx.temperature.stop();
        tracing::info!(process_id = self.run.process_id, "hop cooking duration elapsed");
        self.ctx.host.complete_phase(self.run);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Unit;

    fn hop(name: &str, t: i64) -> IngredientAddition {
        IngredientAddition::new(name, 10.0, Unit::G, t)
    }

    #[test]
    fn groups_same_time_hops() {
        let plan = HopCookingPlan {
            duration_ms: 1000,
            additions: vec![hop("a", 0), hop("b", 0), hop("c", 500)],
        };
        let steps = build_hop_schedule(&plan, 100);
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].at_ms, -100);
        assert_eq!(steps[1].action, HopAction::AdditionDue(vec![hop("a", 0), hop("b", 0)]));
        assert_eq!(steps[2], HopStep {
            at_ms: 400,
            action: HopAction::PreNotify(vec![hop("c", 500)]),
        });
    }

    #[test]
    fn long_lead_interleaves_notices() {
        let plan = HopCookingPlan {
            duration_ms: 1000,
            additions: vec![hop("a", 100), hop("b", 200)],
        };
        let steps = build_hop_schedule(&plan, 150);
        let at: Vec<i64> = steps.iter().map(|s| s.at_ms).collect();
        assert_eq!(at, vec![-50, 50, 100, 200]);
        assert!(matches!(steps[1].action, HopAction::PreNotify(_)));
    }
}
