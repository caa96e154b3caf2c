//! Mashing driver through the controller: levels, additions, iodine retest.
mod common;

use brew_core::{
    BrewingState, IngredientAddition, IodineTest, MashingPlan, MessageKind, Phase, Position,
    Recipe, StateType, StepData, TemperatureLevel, Unit,
};
use brew_core::phase::{MashDriver, PhaseDriver, PhaseStart, RunToken};
use common::{driver_rig, fast_cfg, ms, rig, wait_for};
use std::time::Duration;

fn malt(name: &str, t: i64) -> IngredientAddition {
    IngredientAddition::new(name, 1.0, Unit::Kg, t)
}

fn recipe() -> Recipe {
    Recipe {
        id: "r-mash".into(),
        name: "Two step".into(),
        mashing: Some(MashingPlan {
            levels: vec![
                TemperatureLevel::new(0, 300, 50.0),
                TemperatureLevel::new(300, 60, 64.0),
            ],
            malt_additions: vec![malt("pilsner", 0), malt("munich", 0), malt("crystal", 200)],
        }),
        ..Recipe::default()
    }
}

fn adding(items: Vec<IngredientAddition>) -> BrewingState {
    BrewingState::request(Phase::Mashing, Position::Adding).with_data(StepData::Ingredients(items))
}

#[test]
fn full_mashing_with_negative_then_positive_iodine() {
    let r = rig(fast_cfg());
    r.kettle.set_celsius(50.0);
    r.controller.start_brewing(recipe()).unwrap();
    r.confirm(BrewingState::request(Phase::Mashing, Position::Start));

    // Same-time additions are requested together.
    let first = r.wait_state(&BrewingState::request(Phase::Mashing, Position::Adding));
    assert_eq!(
        first.ingredients().unwrap(),
        &[malt("pilsner", 0), malt("munich", 0)]
    );

    // Partial confirmation asks again for the rest.
    r.confirm(adding(vec![malt("munich", 0)]));
    let again = r.state().unwrap();
    assert!(again.request_needed());
    assert_eq!(again.ingredients().unwrap(), &[malt("pilsner", 0)]);
    r.confirm(adding(vec![malt("pilsner", 0)]));
    assert_eq!(
        r.state().unwrap(),
        BrewingState::new(StateType::Normal, Phase::Mashing, Position::Ongoing)
    );

    let second = r.wait_state(&BrewingState::request(Phase::Mashing, Position::Adding));
    assert_eq!(second.ingredients().unwrap(), &[malt("crystal", 200)]);
    r.confirm(adding(vec![malt("crystal", 200)]));

    // Second level, then the final rest and the iodine test.
    assert!(wait_for(Duration::from_secs(2), || {
        r.controller.current_brewing_process_summary().unwrap().levels.len() == 2
    }));
    r.kettle.set_celsius(64.0);
    let iodine = BrewingState::request(Phase::Mashing, Position::Iodine);
    r.wait_state(&iodine);
    r.confirm(iodine.clone().with_data(StepData::Iodine(IodineTest::negative(ms(20)))));
    assert_eq!(r.state().unwrap().kind, StateType::Normal);

    r.wait_state(&iodine);
    r.confirm(iodine.with_data(StepData::Iodine(IodineTest::positive())));
    r.wait_state(&BrewingState::request(Phase::Lautering, Position::End));

    assert!(!r.controller.actuator_details().stirrer_on);
    assert!(!r.kettle.heater_on());
    assert_eq!(r.controller.pending_confirmations(), 0);
    assert_eq!(r.logged(|k| matches!(k, MessageKind::MaltAddition { .. })), 3);
    assert_eq!(r.logged(|k| matches!(k, MessageKind::IodineTest { .. })), 2);
    assert_eq!(r.logged(|k| matches!(k, MessageKind::PhaseEnded { phase: Phase::Mashing })), 1);

    let summary = r.controller.current_brewing_process_summary().unwrap();
    assert!(summary.mashing_start_ms.is_some());
    assert_eq!(summary.levels.len(), 2);
    assert!(summary.levels.iter().all(|l| l.started));

    let pushed = r.controller.pushed_messages().unwrap();
    assert!(pushed.iter().all(|m| m.is_prenotification()));
    assert!(!pushed.is_empty());
    assert!(r.beeper.double_beeps() >= 1);
    assert!(r.beeper.single_beeps() >= 5);
}

#[test]
fn unrequested_malt_is_rejected() {
    let r = rig(fast_cfg());
    r.kettle.set_celsius(50.0);
    r.controller.start_brewing(recipe()).unwrap();
    r.confirm(BrewingState::request(Phase::Mashing, Position::Start));
    let requested = r.wait_state(&BrewingState::request(Phase::Mashing, Position::Adding));

    assert!(r.controller.confirm_step(adding(vec![malt("crystal", 200)])).is_err());
    assert!(r
        .controller
        .confirm_step(BrewingState::request(Phase::Mashing, Position::Adding))
        .is_err());
    let now = r.state().unwrap();
    assert_eq!(now, requested);
    assert_eq!(now.ingredients(), requested.ingredients());
    r.controller.shutdown();
}

#[test]
fn iodine_result_without_request_is_rejected() {
    let r = rig(fast_cfg());
    r.kettle.set_celsius(50.0);
    r.controller.start_brewing(recipe()).unwrap();
    r.confirm(BrewingState::request(Phase::Mashing, Position::Start));
    let iodine = BrewingState::request(Phase::Mashing, Position::Iodine)
        .with_data(StepData::Iodine(IodineTest::positive()));
    assert!(r.controller.confirm_step(iodine).is_err());
    r.controller.shutdown();
}

#[test]
fn finishing_twice_while_heating_releases_everything_once() {
    let r = driver_rig(fast_cfg());
    let driver = MashDriver::new(r.ctx.clone());
    let run = RunToken {
        process_id: 1,
        phase: Phase::Mashing,
    };
    let plan = MashingPlan {
        levels: vec![TemperatureLevel::new(0, 60_000, 60.0)],
        malt_additions: vec![malt("pilsner", 0)],
    };
    assert_eq!(driver.start(run, Some(&plan)).unwrap(), PhaseStart::Started);
    assert!(wait_for(Duration::from_secs(2), || {
        r.ctx.temperature.subscriber_count() == 1
            && r.ctx.temperature.is_running()
            && r.host.calls().iter().any(|c| c == "level 0 started=false")
    }));
    assert!(r.ctx.stirrer.is_running());

    driver.finish();
    driver.finish();

    assert!(!driver.is_active());
    assert_eq!(r.ctx.temperature.subscriber_count(), 0);
    assert!(!r.ctx.temperature.is_running());
    assert!(!r.kettle.heater_on());
    assert!(!r.ctx.stirrer.is_running());
    let calls = r.host.calls();
    std::thread::sleep(ms(200));
    assert_eq!(r.host.calls(), calls);
    assert!(driver.confirm_state(&BrewingState::request(Phase::Mashing, Position::Adding)).is_err());
}
