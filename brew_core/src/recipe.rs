//! Recipe model and the semantic checks run before a process may start.
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Ml,
    L,
    Kg,
    G,
}

/// One malt or hop addition, timed relative to its phase start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientAddition {
    pub name: String,
    pub amount: f32,
    pub unit: Unit,
    pub input_time_ms: i64,
}

impl IngredientAddition {
    pub fn new(name: impl Into<String>, amount: f32, unit: Unit, input_time_ms: i64) -> Self {
        Self {
            name: name.into(),
            amount,
            unit,
            input_time_ms,
        }
    }
}

// Identity is used as a map key by the watchdog, so the amount compares bitwise.
impl PartialEq for IngredientAddition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.amount.to_bits() == other.amount.to_bits()
            && self.unit == other.unit
            && self.input_time_ms == other.input_time_ms
    }
}

impl Eq for IngredientAddition {}

impl Hash for IngredientAddition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.amount.to_bits().hash(state);
        self.unit.hash(state);
        self.input_time_ms.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureLevel {
    pub start_ms: i64,
    pub duration_ms: i64,
    pub temperature: f32,
}

impl TemperatureLevel {
    pub const fn new(start_ms: i64, duration_ms: i64, temperature: f32) -> Self {
        Self {
            start_ms,
            duration_ms,
            temperature,
        }
    }

    pub const fn end_ms(&self) -> i64 {
        self.start_ms.saturating_add(self.duration_ms)
    }
}

/// Iodine test result. A zero waiting period means the starch is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IodineTest {
    pub wait_ms: u64,
}

impl IodineTest {
    pub const fn positive() -> Self {
        Self { wait_ms: 0 }
    }

    pub fn negative(wait: Duration) -> Self {
        Self {
            wait_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub const fn is_positive(&self) -> bool {
        self.wait_ms == 0
    }

    pub const fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MashingPlan {
    pub levels: Vec<TemperatureLevel>,
    pub malt_additions: Vec<IngredientAddition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HopCookingPlan {
    pub duration_ms: i64,
    pub additions: Vec<IngredientAddition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub description: String,
    pub mashing: Option<MashingPlan>,
    pub hop_cooking: Option<HopCookingPlan>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecipeError {
    #[error("mashing plan needs both temperature levels and malt additions, or neither")]
    IncompleteMashing,
    #[error("temperature level {index}: {reason}")]
    Level { index: usize, reason: &'static str },
    #[error("temperature level {index}: {temperature} °C is below room temperature {room} °C")]
    BelowRoom { index: usize, temperature: f32, room: f32 },
    #[error("temperature level {index} overlaps the previous level")]
    Overlap { index: usize },
    #[error("{what} addition {name:?}: negative input time")]
    NegativeInput { what: &'static str, name: String },
    #[error("{what} additions are not in ascending input order at {name:?}")]
    Unordered { what: &'static str, name: String },
    #[error("hop cooking duration must be positive")]
    HopDuration,
    #[error("hop addition {name:?} is after the end of hop cooking")]
    HopAfterEnd { name: String },
}

fn check_additions(what: &'static str, additions: &[IngredientAddition]) -> Result<(), RecipeError> {
    let mut prev = i64::MIN;
    for a in additions {
        if a.input_time_ms < 0 {
            return Err(RecipeError::NegativeInput {
                what,
                name: a.name.clone(),
            });
        }
        if a.input_time_ms < prev {
            return Err(RecipeError::Unordered {
                what,
                name: a.name.clone(),
            });
        }
        prev = a.input_time_ms;
    }
    Ok(())
}

impl MashingPlan {
    /// A level colder than `room_temperature` can never be reached by heating.
    pub fn validate(&self, room_temperature: f32) -> Result<(), RecipeError> {
        match (self.levels.is_empty(), self.malt_additions.is_empty()) {
            (true, true) => return Ok(()),
            (false, false) => {}
            _ => return Err(RecipeError::IncompleteMashing),
        }
        for (index, level) in self.levels.iter().enumerate() {
            if level.start_ms < 0 {
                return Err(RecipeError::Level {
                    index,
                    reason: "negative start",
                });
            }
            if level.duration_ms < 0 {
                return Err(RecipeError::Level {
                    index,
                    reason: "negative duration",
                });
            }
            if !(18.0..=100.0).contains(&level.temperature) {
                return Err(RecipeError::Level {
                    index,
                    reason: "temperature outside 18..=100 °C",
                });
            }
            if level.temperature < room_temperature {
                return Err(RecipeError::BelowRoom {
                    index,
                    temperature: level.temperature,
                    room: room_temperature,
                });
            }
        }
        for (index, pair) in self.levels.windows(2).enumerate() {
            if pair[0].end_ms() > pair[1].start_ms {
                return Err(RecipeError::Overlap { index: index + 1 });
            }
        }
        check_additions("malt", &self.malt_additions)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty() || self.malt_additions.is_empty()
    }
}

impl HopCookingPlan {
    pub fn validate(&self) -> Result<(), RecipeError> {
        let Some(last) = self.additions.last() else {
            return Ok(());
        };
        if self.duration_ms <= 0 {
            return Err(RecipeError::HopDuration);
        }
        check_additions("hop", &self.additions)?;
        if last.input_time_ms > self.duration_ms {
            return Err(RecipeError::HopAfterEnd {
                name: last.name.clone(),
            });
        }
        Ok(())
    }
}

impl Recipe {
    pub fn validate(&self, room_temperature: f32) -> Result<(), RecipeError> {
        if let Some(m) = &self.mashing {
            m.validate(room_temperature)?;
        }
        if let Some(h) = &self.hop_cooking {
            h.validate()?;
        }
        Ok(())
    }
}
