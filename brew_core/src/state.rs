//! Brewing state triple and its three-digit wire code.
//!
//! code = phase (hundreds) + position (tens) + type (ones). Decoding never fails:
//! unknown digits fall back to `Phase::NotStarted`, `Position::Ongoing` and
//! `StateType::Normal`.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::recipe::{IngredientAddition, IodineTest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateType {
    /// Nothing pending, the system is working on its own.
    Normal,
    /// An operator confirmation is expected.
    Request,
    /// The process was aborted and waits for acknowledgement.
    Cancel,
    /// Confirmation issued by the system itself, never shown to the operator.
    Intern,
}

impl StateType {
    pub const fn value(self) -> u16 {
        match self {
            Self::Normal => 1,
            Self::Request => 2,
            Self::Cancel => 3,
            Self::Intern => 4,
        }
    }

    pub const fn from_value(v: u16) -> Self {
        match v {
            2 => Self::Request,
            3 => Self::Cancel,
            4 => Self::Intern,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    NotStarted,
    Mashing,
    Lautering,
    HopCooking,
    Whirlpool,
    Finished,
}

impl Phase {
    pub const ALL: [Self; 6] = [
        Self::NotStarted,
        Self::Mashing,
        Self::Lautering,
        Self::HopCooking,
        Self::Whirlpool,
        Self::Finished,
    ];

    pub const fn value(self) -> u16 {
        match self {
            Self::NotStarted => 100,
            Self::Mashing => 200,
            Self::Lautering => 300,
            Self::HopCooking => 400,
            Self::Whirlpool => 500,
            Self::Finished => 600,
        }
    }

    pub const fn from_value(v: u16) -> Self {
        match v {
            200 => Self::Mashing,
            300 => Self::Lautering,
            400 => Self::HopCooking,
            500 => Self::Whirlpool,
            600 => Self::Finished,
            _ => Self::NotStarted,
        }
    }

    /// Phases the operator performs by hand; a single END confirmation completes them.
    pub const fn is_manual(self) -> bool {
        matches!(self, Self::Lautering | Self::Whirlpool)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Start,
    Ongoing,
    End,
    Iodine,
    Adding,
}

impl Position {
    pub const ALL: [Self; 5] = [
        Self::Start,
        Self::Ongoing,
        Self::End,
        Self::Iodine,
        Self::Adding,
    ];

    pub const fn value(self) -> u16 {
        match self {
            Self::Start => 10,
            Self::Ongoing => 20,
            Self::End => 30,
            Self::Iodine => 40,
            Self::Adding => 50,
        }
    }

    pub const fn from_value(v: u16) -> Self {
        match v {
            10 => Self::Start,
            30 => Self::End,
            40 => Self::Iodine,
            50 => Self::Adding,
            _ => Self::Ongoing,
        }
    }
}

impl StateType {
    pub const ALL: [Self; 4] = [Self::Normal, Self::Request, Self::Cancel, Self::Intern];
}

/// Payload attached to a state: the ingredients concerned or an iodine test result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepData {
    Ingredients(Vec<IngredientAddition>),
    Iodine(IodineTest),
}

/// The (type, phase, position) triple plus optional payload.
///
/// Equality compares only the triple; the payload never takes part in the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrewingState {
    pub kind: StateType,
    pub phase: Phase,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StepData>,
}

impl PartialEq for BrewingState {
    fn eq(&self, other: &Self) -> bool {
        self.triple() == other.triple()
    }
}

impl Eq for BrewingState {}

impl Default for BrewingState {
    fn default() -> Self {
        Self::new(StateType::Normal, Phase::NotStarted, Position::Start)
    }
}

impl BrewingState {
    pub const fn new(kind: StateType, phase: Phase, position: Position) -> Self {
        Self {
            kind,
            phase,
            position,
            data: None,
        }
    }

    pub const fn request(phase: Phase, position: Position) -> Self {
        Self::new(StateType::Request, phase, position)
    }

    pub const fn intern(phase: Phase, position: Position) -> Self {
        Self::new(StateType::Intern, phase, position)
    }

    pub fn with_data(mut self, data: StepData) -> Self {
        self.data = Some(data);
        self
    }

    pub const fn triple(&self) -> (StateType, Phase, Position) {
        (self.kind, self.phase, self.position)
    }

    pub const fn code(&self) -> u16 {
        self.phase.value() + self.position.value() + self.kind.value()
    }

    /// Total decoding; never fails.
    pub const fn from_code(code: u16) -> Self {
        let phase = Phase::from_value(code / 100 * 100);
        let position = Position::from_value(code % 100 / 10 * 10);
        let kind = StateType::from_value(code % 10);
        Self::new(kind, phase, position)
    }

    pub const fn request_needed(&self) -> bool {
        matches!(self.kind, StateType::Request)
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, StateType::Cancel)
    }

    pub fn ingredients(&self) -> Option<&[IngredientAddition]> {
        match &self.data {
            Some(StepData::Ingredients(v)) => Some(v),
            _ => None,
        }
    }

    pub fn iodine_test(&self) -> Option<&IodineTest> {
        match &self.data {
            Some(StepData::Iodine(t)) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for BrewingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?}/{:?} ({})",
            self.kind,
            self.phase,
            self.position,
            self.code()
        )
    }
}
