//! Quick Start Example
//!
//! Runs a short hop-cooking-only recipe against a simulated kettle and answers
//! every confirmation request as soon as it appears.
//!
//! Run with `cargo run -p brew_core --example quick_start`.

use std::sync::Arc;
use std::time::Duration;

use brew_core::{
    BrewCfg, BrewingController, HopCookingPlan, IngredientAddition, MemoryLogStorage, Recipe, Unit,
};
use brew_hardware::{SimulatedKettle, SimulatedStirrer};
use brew_traits::{Clock, MonotonicClock};

fn main() -> Result<(), eyre::Report> {
    let clock = MonotonicClock::new();

    // Seconds instead of minutes: 40 ms samples, a 3 s boil and a low boil point.
    let mut cfg = BrewCfg::default();
    cfg.temperature.sample_interval = Duration::from_millis(40);
    cfg.timing.prenotify_lead = Duration::from_millis(500);
    cfg.timing.response_timeout = Duration::from_secs(5);
    cfg.hop.temperature = 40.0;
    cfg.hop.end_notice_lead = Duration::from_millis(500);
    cfg.hop.prenotify_lead = Duration::from_millis(500);

    let kettle = SimulatedKettle::new(18.0).with_heating_rate(1.5);
    let storage = Arc::new(MemoryLogStorage::new());
    let controller = BrewingController::builder()
        .with_thermometer(kettle.thermometer())
        .with_heater(kettle.heater())
        .with_stirrer(SimulatedStirrer::new())
        .with_log_storage(storage.clone())
        .with_clock(Arc::new(clock))
        .with_config(cfg)
        .build()?;

    let recipe = Recipe {
        id: "quick".into(),
        name: "Quick boil".into(),
        hop_cooking: Some(HopCookingPlan {
            duration_ms: 3_000,
            additions: vec![
                IngredientAddition::new("Magnum", 20.0, Unit::G, 0),
                IngredientAddition::new("Saaz", 30.0, Unit::G, 2_000),
            ],
        }),
        ..Recipe::default()
    };
    controller.start_brewing(recipe)?;

    let mut last_print = clock.now();
    while let Some(state) = controller.current_state() {
        if state.request_needed() {
            println!("confirming {state}");
            controller.confirm_step(state)?;
        } else if clock.ms_since(last_print) >= 500 {
            let details = controller.actuator_details();
            println!("{state}: {details:?}");
            last_print = clock.now();
        }
        clock.sleep(Duration::from_millis(20));
    }

    for log in storage.logs() {
        println!("process {} finished with {} log entries", log.id, log.messages.len());
    }
    Ok(())
}
