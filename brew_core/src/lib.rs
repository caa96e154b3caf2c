#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Brewing process orchestration (hardware-agnostic).
//!
//! All hardware goes through the `brew_traits` seams: `Thermometer`,
//! `Actuator` (heater, stirrer) and `Beeper`.
//!
//! ## Architecture
//!
//! - **State codes**: `BrewingState` and its stable 3-digit wire code (`state`)
//! - **Recipes**: plans and their validation (`recipe`)
//! - **Temperature**: control loop with hysteresis and threshold subscriptions (`temperature`)
//! - **Phases**: mashing and hop-cooking drivers behind `PhaseDriver` (`phase`)
//! - **Supervision**: `BrewingController` state machine and response watchdog
//! - **Audit**: `BrewingLogger`, `TemperatureLogger`, notifiers
//!
//! ## Threads
//!
//! One temperature loop, one scheduler thread for the active phase, one watchdog
//! per process, and short-lived alarm threads that are cancelled and joined
//! before being replaced.
pub mod builder;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod log;
pub mod message;
pub mod mocks;
pub mod notify;
pub mod phase;
pub mod process;
pub mod recipe;
pub mod state;
pub mod stirrer;
pub mod temp_logger;
pub mod temperature;
pub mod timer;
pub mod watchdog;

pub use builder::BrewingControllerBuilder;
pub use config::BrewCfg;
pub use controller::BrewingController;
pub use error::{BrewError, BuildError, ProcessError, Result};
pub use log::{BrewingLogger, FileLogStorage, LogStorage, MemoryLogStorage};
pub use message::{BrewingLog, Message, MessageKind, Priority};
pub use notify::{AcousticNotifier, Notifier, TracingNotifier};
pub use process::{ActuatorDetails, BrewingProcess, BrewingSummary, SensorStatus, TemperatureLevelInfo};
pub use recipe::{HopCookingPlan, IngredientAddition, IodineTest, MashingPlan, Recipe, TemperatureLevel, Unit};
pub use state::{BrewingState, Phase, Position, StateType, StepData};
pub use temperature::{SubscribeStatus, TemperatureController};
