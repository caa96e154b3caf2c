//! Brew command: hardware assembly, time scaling and the operator loop.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use brew_config::Config;
use brew_core::{
    BrewCfg, BrewingController, BrewingLog, BrewingState, FileLogStorage, IodineTest, LogStorage,
    MemoryLogStorage, Message, MessageKind, Notifier, Position, Recipe, StepData,
};
use brew_traits::{Actuator, Beeper, Thermometer};
use crossbeam_channel as xch;
use eyre::{Result, WrapErr};

use crate::cli::json_mode;

const POLL: Duration = Duration::from_millis(20);

/// Why a brew did not complete normally.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("brewing process aborted: {reason}")]
    Aborted { reason: String },
    #[error("interrupted by signal")]
    Interrupted,
    #[error("time scale must be a finite number > 0, got {0}")]
    TimeScale(String),
}

#[derive(Debug)]
pub struct BrewOpts {
    pub recipe: PathBuf,
    pub auto_confirm: bool,
    pub time_scale: f64,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BrewReport {
    pub process_id: u64,
    pub recipe_id: String,
    pub confirmations: usize,
    pub log_entries: usize,
}

/// Prints notifications for the operator; JSON lines in `--json` mode.
#[derive(Debug, Clone, Copy)]
struct ConsoleNotifier {
    json: bool,
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &Message) {
        if self.json {
            if let Ok(line) = serde_json::to_string(message) {
                println!("{line}");
            }
            return;
        }
        match &message.kind {
            MessageKind::PreNotification { content, millis_to_go } => {
                println!("notice: {content} (in {}s)", millis_to_go / 1000);
            }
            MessageKind::ConfirmationRequest { state } => println!("request: {state}"),
            other => println!("info: {other:?}"),
        }
    }

    fn alarm(&self, text: &str) {
        eprintln!("ALARM: {text}");
    }
}

fn scale_ms(ms: i64, factor: f64) -> i64 {
    (ms as f64 / factor).round() as i64
}

fn scale_dur(d: Duration, factor: f64) -> Duration {
    d.div_f64(factor).max(Duration::from_millis(1))
}

/// Shrink every recipe offset by `factor`.
pub fn scale_recipe(recipe: &mut Recipe, factor: f64) {
    if let Some(m) = recipe.mashing.as_mut() {
        for l in &mut m.levels {
            l.start_ms = scale_ms(l.start_ms, factor);
            l.duration_ms = scale_ms(l.duration_ms, factor);
        }
        for a in &mut m.malt_additions {
            a.input_time_ms = scale_ms(a.input_time_ms, factor);
        }
    }
    if let Some(h) = recipe.hop_cooking.as_mut() {
        h.duration_ms = scale_ms(h.duration_ms, factor);
        for a in &mut h.additions {
            a.input_time_ms = scale_ms(a.input_time_ms, factor);
        }
    }
}

/// Shrink the controller's periods and timeouts by `factor`.
pub fn scale_cfg(cfg: &mut BrewCfg, factor: f64) {
    cfg.temperature.sample_interval = scale_dur(cfg.temperature.sample_interval, factor);
    cfg.timing.prenotify_lead = scale_dur(cfg.timing.prenotify_lead, factor);
    cfg.hop.prenotify_lead = scale_dur(cfg.hop.prenotify_lead, factor);
    cfg.timing.response_timeout = scale_dur(cfg.timing.response_timeout, factor);
    cfg.timing.watchdog_poll = scale_dur(cfg.timing.watchdog_poll, factor);
    cfg.hop.end_notice_lead = scale_dur(cfg.hop.end_notice_lead, factor);
    cfg.temperature_log.time_delta = scale_dur(cfg.temperature_log.time_delta, factor);
}

type Devices = (
    Box<dyn Thermometer + Send>,
    Box<dyn Actuator + Send>,
    Box<dyn Actuator + Send>,
    Box<dyn Beeper + Send>,
);

fn thermometer(cfg: &Config, kettle: &brew_hardware::SimulatedKettle) -> Result<Box<dyn Thermometer + Send>> {
    let spec = cfg.hardware.thermometer.as_str();
    Ok(match spec {
        "simulated" => Box::new(kettle.thermometer()),
        "w1" => Box::new(brew_hardware::W1Thermometer::discover().wrap_err("discover 1-wire thermometer")?),
        id => {
            let id = id.strip_prefix("w1:").unwrap_or(id);
            Box::new(brew_hardware::W1Thermometer::from_id(id))
        }
    })
}

#[cfg(feature = "hardware")]
fn relay(pin: Option<u8>, active_low: bool, fallback: Box<dyn Actuator + Send>) -> Result<Box<dyn Actuator + Send>> {
    match pin {
        Some(p) => Ok(Box::new(
            brew_hardware::gpio::GpioRelay::new(p, active_low).wrap_err_with(|| format!("open relay pin {p}"))?,
        )),
        None => Ok(fallback),
    }
}

fn devices(cfg: &Config) -> Result<Devices> {
    let kettle = brew_hardware::SimulatedKettle::new(cfg.temperature.room_temperature)
        .with_heating_rate(cfg.hardware.sim_heat_per_sample);
    let thermometer = thermometer(cfg, &kettle)?;
    let heater: Box<dyn Actuator + Send> = Box::new(kettle.heater());
    let stirrer: Box<dyn Actuator + Send> = Box::new(brew_hardware::SimulatedStirrer::new());
    let beeper: Box<dyn Beeper + Send> = Box::new(brew_hardware::SimulatedBeeper::new());

    #[cfg(feature = "hardware")]
    {
        let hw = &cfg.hardware;
        let heater = relay(hw.heater_pin, hw.relays_active_low, heater)?;
        let stirrer = relay(hw.stirrer_pin, hw.relays_active_low, stirrer)?;
        let beeper: Box<dyn Beeper + Send> = match hw.buzzer_pin {
            Some(p) => Box::new(
                brew_hardware::gpio::GpioBuzzer::new(p).wrap_err_with(|| format!("open buzzer pin {p}"))?,
            ),
            None => beeper,
        };
        Ok((thermometer, heater, stirrer, beeper))
    }
    #[cfg(not(feature = "hardware"))]
    {
        if cfg.hardware.heater_pin.is_some() || cfg.hardware.stirrer_pin.is_some() {
            tracing::warn!("GPIO pins configured but built without the `hardware` feature; relays are simulated");
        }
        Ok((thermometer, heater, stirrer, beeper))
    }
}

/// Operator answer to a pending state.
enum Answer {
    Confirm(BrewingState),
    Cancel,
    Ignore,
}

fn auto_answer(state: &BrewingState) -> BrewingState {
    if state.position == Position::Iodine && !state.is_cancelled() {
        return state.clone().with_data(StepData::Iodine(IodineTest::positive()));
    }
    state.clone()
}

/// Interpret one stdin line for `state`.
///
/// Empty or `y` confirms, `c` cancels, a number answers an iodine test with a
/// negative result and that many seconds of waiting.
fn parse_answer(line: &str, state: &BrewingState) -> Answer {
    let line = line.trim();
    match line {
        "" | "y" | "yes" => Answer::Confirm(auto_answer(state)),
        "c" | "cancel" => Answer::Cancel,
        _ => match line.parse::<u64>() {
            Ok(secs) if state.position == Position::Iodine && !state.is_cancelled() => Answer::Confirm(
                state
                    .clone()
                    .with_data(StepData::Iodine(IodineTest::negative(Duration::from_secs(secs)))),
            ),
            _ => {
                eprintln!("unrecognised answer {line:?}; press Enter to confirm or type c to cancel");
                Answer::Ignore
            }
        },
    }
}

fn spawn_stdin_reader() -> Result<xch::Receiver<String>> {
    let (tx, rx) = xch::unbounded();
    std::thread::Builder::new()
        .name("operator-input".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .wrap_err("spawn stdin reader")?;
    Ok(rx)
}

pub fn run_brew(cfg: &Config, opts: &BrewOpts, shutdown: &AtomicBool) -> Result<BrewReport> {
    if !(opts.time_scale.is_finite() && opts.time_scale > 0.0) {
        return Err(RunError::TimeScale(opts.time_scale.to_string()).into());
    }
    let file = brew_config::load_recipe_file(&opts.recipe)?;
    let mut recipe = Recipe::from(&file);
    let mut core_cfg = BrewCfg::from(cfg);
    if (opts.time_scale - 1.0).abs() > f64::EPSILON {
        scale_recipe(&mut recipe, opts.time_scale);
        scale_cfg(&mut core_cfg, opts.time_scale);
        tracing::info!(factor = opts.time_scale, "time scaled");
    }

    let (thermometer, heater, stirrer, beeper) = devices(cfg)?;
    let storage = Arc::new(MemoryLogStorage::new());
    let controller = BrewingController::builder()
        .with_thermometer(thermometer)
        .with_heater(heater)
        .with_stirrer(stirrer)
        .with_beeper(beeper)
        .with_notifier(Arc::new(ConsoleNotifier { json: json_mode() }))
        .with_log_storage(Arc::clone(&storage) as Arc<dyn LogStorage>)
        .with_config(core_cfg)
        .build()?;

    let recipe_id = recipe.id.clone();
    let process_id = controller.start_brewing(recipe)?;
    tracing::info!(process_id, recipe = %recipe_id, "brew started");

    let input = if opts.auto_confirm {
        None
    } else {
        Some(spawn_stdin_reader()?)
    };
    let confirmations = operate(&controller, input.as_ref(), shutdown)?;
    drop(controller);

    let log = storage
        .logs()
        .into_iter()
        .find(|l| l.id == process_id)
        .ok_or_else(|| eyre::eyre!("audit log of process {process_id} was not stored"))?;
    if let Some(dir) = &opts.log_dir {
        let files = FileLogStorage::new(dir);
        files
            .save(&log)
            .map_err(|e| eyre::eyre!("write audit log to {}: {e}", files.path_for(process_id).display()))?;
    }
    if let Some(reason) = aborted(&log) {
        return Err(RunError::Aborted { reason }.into());
    }
    Ok(BrewReport {
        process_id,
        recipe_id,
        confirmations,
        log_entries: log.messages.len(),
    })
}

fn aborted(log: &BrewingLog) -> Option<String> {
    log.messages.iter().find_map(|m| match &m.kind {
        MessageKind::BrewingAborted { reason } => Some(reason.clone()),
        _ => None,
    })
}

/// Answer requests until the process is gone. Returns accepted confirmations.
fn operate(
    controller: &BrewingController,
    input: Option<&xch::Receiver<String>>,
    shutdown: &AtomicBool,
) -> Result<usize> {
    let mut accepted = 0usize;
    let mut prompted: Option<u16> = None;
    let mut input_closed = false;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            controller.shutdown();
            return Err(RunError::Interrupted.into());
        }
        let Some(state) = controller.current_state() else {
            return Ok(accepted);
        };
        if !(state.request_needed() || state.is_cancelled()) {
            prompted = None;
            std::thread::sleep(POLL);
            continue;
        }

        let answer = match input {
            None => Answer::Confirm(auto_answer(&state)),
            Some(_) if input_closed => Answer::Confirm(auto_answer(&state)),
            Some(rx) => {
                if prompted != Some(state.code()) && !json_mode() {
                    println!("confirm {state}? [Enter = yes, c = cancel]");
                }
                prompted = Some(state.code());
                match rx.recv_timeout(POLL) {
                    Ok(line) => parse_answer(&line, &state),
                    Err(xch::RecvTimeoutError::Timeout) => Answer::Ignore,
                    Err(xch::RecvTimeoutError::Disconnected) => {
                        // Nobody is left to answer: abort and acknowledge on their behalf.
                        tracing::warn!("operator input closed, cancelling");
                        input_closed = true;
                        if state.is_cancelled() {
                            Answer::Confirm(state.clone())
                        } else {
                            Answer::Cancel
                        }
                    }
                }
            }
        };

        match answer {
            Answer::Confirm(s) => match controller.confirm_step(s) {
                Ok(()) => {
                    accepted += 1;
                    prompted = None;
                }
                // The state may have moved on between the read and the answer.
                Err(e) => tracing::debug!(error = %e, "confirmation not accepted"),
            },
            Answer::Cancel => {
                if let Err(e) = controller.cancel_current_brewing_process() {
                    tracing::debug!(error = %e, "cancel not accepted");
                }
            }
            Answer::Ignore => {}
        }
    }
}
