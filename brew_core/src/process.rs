//! Per-attempt process aggregate and the read-only views handed to clients.
use serde::Serialize;

use crate::recipe::Recipe;
use crate::state::BrewingState;

/// One brewing attempt. Lives in the controller's process slot.
#[derive(Debug, Clone, Serialize)]
pub struct BrewingProcess {
    pub id: u64,
    pub recipe: Recipe,
    pub state: BrewingState,
    pub start_time_ms: u64,
}

impl BrewingProcess {
    pub fn new(id: u64, recipe: Recipe, start_time_ms: u64) -> Self {
        Self {
            id,
            recipe,
            state: BrewingState::default(),
            start_time_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureLevelInfo {
    /// Index of the level in the recipe.
    pub index: usize,
    pub recipe_start_ms: i64,
    pub duration_ms: i64,
    pub temperature: f32,
    pub started: bool,
    /// Wall-clock start, set once the level was reached.
    pub start_time_ms: Option<u64>,
}

/// Snapshot of the running process for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrewingSummary {
    pub state: BrewingState,
    pub recipe_id: Option<String>,
    pub mashing_start_ms: Option<u64>,
    pub hop_cooking_start_ms: Option<u64>,
    pub levels: Vec<TemperatureLevelInfo>,
}

impl BrewingSummary {
    pub fn new(state: BrewingState) -> Self {
        Self {
            state,
            recipe_id: None,
            mashing_start_ms: None,
            hop_cooking_start_ms: None,
            levels: Vec::new(),
        }
    }

    /// Insert or replace the info for one level, keeping the list ordered by index.
    pub fn update_level(&mut self, info: TemperatureLevelInfo) {
        match self.levels.binary_search_by_key(&info.index, |l| l.index) {
            Ok(i) => self.levels[i] = info,
            Err(i) => self.levels.insert(i, info),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorStatus {
    Ok,
    Error,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorDetails {
    pub heater_on: bool,
    pub stirrer_on: bool,
    pub sensor: SensorStatus,
    pub temperature: Option<f32>,
}
