//! Audit-log and notification messages.
use serde::{Deserialize, Serialize};

use crate::recipe::{IngredientAddition, IodineTest, Recipe};
use crate::state::{BrewingState, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    VeryLow,
    Low,
    Medium,
    High,
    Always,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageKind {
    BrewingStart { recipe_id: String },
    /// A confirmation attempt, logged whether or not it was accepted.
    Confirmation {
        current: BrewingState,
        confirmed: BrewingState,
    },
    ConfirmationRequest { state: BrewingState },
    PreNotification { content: String, millis_to_go: u64 },
    MaltAddition { additions: Vec<IngredientAddition> },
    HopAddition { additions: Vec<IngredientAddition> },
    IodineTest { result: IodineTest },
    TemperatureLevel {
        index: usize,
        duration_ms: i64,
        temperature: f32,
    },
    Temperature { celsius: f32 },
    PhaseStarted { phase: Phase },
    PhaseEnded { phase: Phase },
    BrewingAborted { reason: String },
    BrewingComplete,
    Info { text: String },
}

impl MessageKind {
    pub const fn priority(&self) -> Priority {
        match self {
            Self::Temperature { .. } => Priority::VeryLow,
            Self::Confirmation { .. } | Self::Info { .. } => Priority::Low,
            Self::TemperatureLevel { .. }
            | Self::MaltAddition { .. }
            | Self::HopAddition { .. }
            | Self::IodineTest { .. } => Priority::Medium,
            Self::PreNotification { .. }
            | Self::PhaseStarted { .. }
            | Self::PhaseEnded { .. } => Priority::High,
            Self::BrewingStart { .. }
            | Self::ConfirmationRequest { .. }
            | Self::BrewingAborted { .. }
            | Self::BrewingComplete => Priority::Always,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Wall-clock milliseconds since the Unix epoch.
    pub time_ms: u64,
    pub priority: Priority,
    pub kind: MessageKind,
}

impl Message {
    pub fn new(kind: MessageKind, time_ms: u64) -> Self {
        Self {
            time_ms,
            priority: kind.priority(),
            kind,
        }
    }

    pub const fn is_prenotification(&self) -> bool {
        matches!(self.kind, MessageKind::PreNotification { .. })
    }

    pub const fn is_confirmation_request(&self) -> bool {
        matches!(self.kind, MessageKind::ConfirmationRequest { .. })
    }
}

/// Append-only record of one brewing process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrewingLog {
    pub id: u64,
    pub recipe: Recipe,
    pub messages: Vec<Message>,
    /// Wall-clock milliseconds at which the process was removed.
    #[serde(default)]
    pub end_time_ms: Option<u64>,
}

impl BrewingLog {
    pub fn new(id: u64, recipe: Recipe) -> Self {
        Self {
            id,
            recipe,
            messages: Vec::new(),
            end_time_ms: None,
        }
    }

    pub fn start_time_ms(&self) -> Option<u64> {
        self.messages.first().map(|m| m.time_ms)
    }

    pub fn latest_time_ms(&self) -> Option<u64> {
        self.messages.last().map(|m| m.time_ms)
    }

    /// Messages at or above `min`, in log order.
    pub fn messages_by_priority(&self, min: Priority) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.priority >= min).collect()
    }
}
