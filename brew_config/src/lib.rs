#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config and recipe schemas for the brewing controller.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - `RecipeFile` is the on-disk recipe format; structural checks happen here,
//!   brewing semantics (ordering, overlaps) are checked by the core.
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TemperatureCfg {
    /// Heater hysteresis half-band in °C: on below target - delta, off above target + delta
    pub heatup_delta: f32,
    /// Control loop period (ms)
    pub sample_interval_ms: u64,
    /// Consecutive failed reads before the loop shuts the heater off for good
    pub max_read_failures: u32,
    /// Start temperature of the simulated kettle
    pub room_temperature: f32,
}

impl Default for TemperatureCfg {
    fn default() -> Self {
        Self {
            heatup_delta: 2.0,
            sample_interval_ms: 1500,
            max_read_failures: 10,
            room_temperature: 20.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingCfg {
    /// Lead time of ingredient pre-notifications (ms)
    pub prenotify_ms: u64,
    /// Max time an operator may take to confirm a request (ms)
    pub response_timeout_ms: u64,
    /// Watchdog sample period (ms)
    pub watchdog_poll_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            prenotify_ms: 5 * 60 * 1000,
            response_timeout_ms: 15 * 60 * 1000,
            watchdog_poll_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HopCookingCfg {
    /// Boil temperature (°C)
    pub temperature: f32,
    /// Band below the boil temperature that triggers the "reached shortly" notice
    pub prenotify_delta: f32,
    /// Lead of the "ending shortly" notice (ms)
    pub prenotify_ms: u64,
    /// Lead of hop addition notices (ms); falls back to `timing.prenotify_ms`
    pub hop_prenotify_ms: Option<u64>,
}

impl Default for HopCookingCfg {
    fn default() -> Self {
        Self {
            temperature: 100.0,
            prenotify_delta: 5.0,
            prenotify_ms: 3 * 60 * 1000,
            hop_prenotify_ms: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Logging {
    /// Audit log gets a temperature entry once the reading moved this far (°C)
    pub temperature_delta: f32,
    /// ... or once this much time passed since the last entry (ms)
    pub time_delta_ms: u64,
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            temperature_delta: 3.0,
            time_delta_ms: 5000,
            file: None,
            level: None,
            rotation: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotifierCfg {
    pub beep_on_prenotification: bool,
    pub beep_on_confirmation_request: bool,
}

impl Default for NotifierCfg {
    fn default() -> Self {
        Self {
            beep_on_prenotification: true,
            beep_on_confirmation_request: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Hardware {
    /// "simulated" or "w1:<device id>" (e.g. "w1:28-0316a2798aff"); "w1" alone probes the bus
    pub thermometer: String,
    pub heater_pin: Option<u8>,
    pub stirrer_pin: Option<u8>,
    pub buzzer_pin: Option<u8>,
    /// Relay board switches on a low level
    pub relays_active_low: bool,
    /// Simulated heating speed (°C per sample)
    pub sim_heat_per_sample: f32,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            thermometer: "simulated".into(),
            heater_pin: None,
            stirrer_pin: None,
            buzzer_pin: None,
            relays_active_low: true,
            sim_heat_per_sample: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub temperature: TemperatureCfg,
    pub timing: TimingCfg,
    pub hop_cooking: HopCookingCfg,
    pub logging: Logging,
    pub notifier: NotifierCfg,
    pub hardware: Hardware,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Temperature
        let t = &self.temperature;
        if !t.heatup_delta.is_finite() || t.heatup_delta.is_sign_negative() {
            eyre::bail!("temperature.heatup_delta must be a finite value >= 0");
        }
        if t.sample_interval_ms == 0 {
            eyre::bail!("temperature.sample_interval_ms must be >= 1");
        }
        if t.max_read_failures == 0 {
            eyre::bail!("temperature.max_read_failures must be >= 1");
        }
        if !t.room_temperature.is_finite() {
            eyre::bail!("temperature.room_temperature must be finite");
        }

        // Timing
        if self.timing.response_timeout_ms == 0 {
            eyre::bail!("timing.response_timeout_ms must be >= 1");
        }
        if self.timing.watchdog_poll_ms == 0 {
            eyre::bail!("timing.watchdog_poll_ms must be >= 1");
        }
        if self.timing.watchdog_poll_ms > self.timing.response_timeout_ms {
            eyre::bail!("timing.watchdog_poll_ms must not exceed timing.response_timeout_ms");
        }

        // Hop cooking
        let h = &self.hop_cooking;
        if !(18.0..=100.0).contains(&h.temperature) {
            eyre::bail!("hop_cooking.temperature must be in [18, 100]");
        }
        if !h.prenotify_delta.is_finite() || h.prenotify_delta.is_sign_negative() {
            eyre::bail!("hop_cooking.prenotify_delta must be a finite value >= 0");
        }

        // Logging
        if !self.logging.temperature_delta.is_finite()
            || self.logging.temperature_delta.is_sign_negative()
        {
            eyre::bail!("logging.temperature_delta must be a finite value >= 0");
        }
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        // Hardware
        let th = self.hardware.thermometer.as_str();
        if th != "simulated" && th != "w1" && !th.starts_with("w1:") {
            eyre::bail!("hardware.thermometer must be \"simulated\", \"w1\" or \"w1:<id>\"");
        }
        let rate = self.hardware.sim_heat_per_sample;
        if !(rate.is_finite() && rate > 0.0) {
            eyre::bail!("hardware.sim_heat_per_sample must be > 0");
        }

        Ok(())
    }
}

// ── Recipes ──────────────────────────────────────────────────────────────────

/// Quantity unit of an ingredient.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitToml {
    Ml,
    L,
    Kg,
    #[default]
    G,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdditionToml {
    pub name: String,
    pub amount: f32,
    #[serde(default)]
    pub unit: UnitToml,
    /// Offset from the phase start (ms). Also accepts "input_time_ms".
    #[serde(alias = "input_time_ms")]
    pub input_ms: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LevelToml {
    pub start_ms: i64,
    pub duration_ms: i64,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MashingToml {
    pub levels: Vec<LevelToml>,
    pub malt: Vec<AdditionToml>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HopCookingToml {
    pub duration_ms: i64,
    pub hops: Vec<AdditionToml>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecipeFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub mashing: Option<MashingToml>,
    pub hop_cooking: Option<HopCookingToml>,
}

pub fn load_recipe(s: &str) -> Result<RecipeFile, toml::de::Error> {
    toml::from_str::<RecipeFile>(s)
}

impl RecipeFile {
    /// Structural checks only; ordering and overlap rules belong to the core recipe model.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.id.trim().is_empty() {
            eyre::bail!("recipe.id must not be empty");
        }
        let additions = self
            .mashing
            .iter()
            .flat_map(|m| m.malt.iter())
            .chain(self.hop_cooking.iter().flat_map(|h| h.hops.iter()));
        for a in additions {
            if a.name.trim().is_empty() {
                eyre::bail!("ingredient name must not be empty");
            }
            if !a.amount.is_finite() || a.amount <= 0.0 {
                eyre::bail!("ingredient {:?}: amount must be > 0", a.name);
            }
        }
        if let Some(m) = &self.mashing {
            for (i, l) in m.levels.iter().enumerate() {
                if !l.temperature.is_finite() {
                    eyre::bail!("mashing.levels[{i}].temperature must be finite");
                }
            }
        }
        Ok(())
    }
}

pub fn load_recipe_file(path: &std::path::Path) -> eyre::Result<RecipeFile> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read recipe {:?}: {}", path, e))?;
    let recipe = load_recipe(&text).map_err(|e| eyre::eyre!("parse recipe {:?}: {}", path, e))?;
    recipe.validate()?;
    Ok(recipe)
}
