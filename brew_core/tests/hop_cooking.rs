//! Hop cooking: boil, additions and the end-of-phase behaviour.
mod common;

use brew_core::{
    BrewingState, HopCookingPlan, IngredientAddition, MessageKind, Phase, Position, Recipe,
    StateType, StepData, Unit,
};
use brew_core::phase::{HopCookDriver, PhaseDriver, PhaseStart, RunToken};
use common::{driver_rig, fast_cfg, ms, rig, wait_for, Rig};
use rstest::rstest;
use std::time::Duration;

fn hop(name: &str, t: i64) -> IngredientAddition {
    IngredientAddition::new(name, 30.0, Unit::G, t)
}

fn recipe(additions: Vec<IngredientAddition>, duration_ms: i64) -> Recipe {
    Recipe {
        id: "r-hop".into(),
        name: "Hoppy".into(),
        hop_cooking: Some(HopCookingPlan {
            duration_ms,
            additions,
        }),
        ..Recipe::default()
    }
}

/// Walk to the hop cooking start and confirm it with the kettle already boiling.
fn start_hop_cooking(r: &Rig, recipe: Recipe) {
    r.controller.start_brewing(recipe).unwrap();
    r.confirm(BrewingState::request(Phase::Mashing, Position::Start));
    let lautering = BrewingState::request(Phase::Lautering, Position::End);
    r.wait_state(&lautering);
    r.confirm(lautering);
    r.kettle.set_celsius(100.0);
    r.confirm(BrewingState::request(Phase::HopCooking, Position::Start));
}

#[test]
fn confirmed_addition_holds_phase_until_duration_elapses() {
    let r = rig(fast_cfg());
    start_hop_cooking(&r, recipe(vec![hop("cascade", 0)], 1000));

    let adding = BrewingState::request(Phase::HopCooking, Position::Adding);
    let requested = r.wait_state(&adding);
    assert_eq!(requested.ingredients().unwrap(), &[hop("cascade", 0)]);
    r.confirm(adding.with_data(StepData::Ingredients(vec![hop("cascade", 0)])));

    let held = BrewingState::new(StateType::Normal, Phase::HopCooking, Position::Adding);
    assert_eq!(r.state().unwrap(), held);
    std::thread::sleep(ms(500));
    assert_eq!(r.state().unwrap(), held);

    r.wait_state(&BrewingState::request(Phase::Whirlpool, Position::End));
    assert!(!r.kettle.heater_on());
    let notices: Vec<String> = r
        .controller
        .pushed_messages()
        .unwrap()
        .into_iter()
        .filter_map(|m| match m.kind {
            MessageKind::PreNotification { content, .. } => Some(content),
            _ => None,
        })
        .collect();
    assert!(notices.iter().any(|c| c.contains("will be reached shortly")));
    assert!(notices.iter().any(|c| c.contains("will end shortly")));
    let summary = r.controller.current_brewing_process_summary().unwrap();
    assert!(summary.hop_cooking_start_ms.is_some());
    assert_eq!(summary.levels.len(), 1);
}

#[test]
fn unconfirmed_addition_never_finishes_the_phase() {
    let r = rig(fast_cfg());
    start_hop_cooking(&r, recipe(vec![hop("cascade", 0)], 100));

    let adding = BrewingState::request(Phase::HopCooking, Position::Adding);
    r.wait_state(&adding);
    let cancelled = BrewingState::new(StateType::Cancel, Phase::HopCooking, Position::Adding);
    r.wait_state(&cancelled);

    std::thread::sleep(ms(300));
    assert_eq!(r.state().unwrap(), cancelled);
    assert_eq!(
        r.logged(|k| matches!(k, MessageKind::PhaseStarted { phase: Phase::Whirlpool })),
        0
    );
    assert_eq!(r.notifier.alarms().len(), 1);
    r.confirm(cancelled);
    assert!(r.state().is_none());
}

#[test]
fn empty_hop_plan_is_skipped() {
    let r = rig(fast_cfg());
    start_hop_cooking(&r, recipe(Vec::new(), 0));
    assert_eq!(
        r.state().unwrap(),
        BrewingState::request(Phase::Whirlpool, Position::End)
    );
}

#[test]
fn boil_without_additions_is_skipped() {
    let r = rig(fast_cfg());
    start_hop_cooking(&r, recipe(Vec::new(), 60_000));
    assert_eq!(
        r.state().unwrap(),
        BrewingState::request(Phase::Whirlpool, Position::End)
    );
    std::thread::sleep(ms(50));
    assert!(!r.kettle.heater_on());
    assert_eq!(r.logged(|k| matches!(k, MessageKind::TemperatureLevel { .. })), 0);
    let summary = r.controller.current_brewing_process_summary().unwrap();
    assert!(summary.levels.is_empty());
}

#[rstest]
#[case::heating(20.0)]
#[case::boiling(100.0)]
fn finishing_twice_stops_timers_and_subscriptions(#[case] kettle_celsius: f32) {
    let r = driver_rig(fast_cfg());
    r.kettle.set_celsius(kettle_celsius);
    let driver = HopCookDriver::new(r.ctx.clone());
    let run = RunToken {
        process_id: 1,
        phase: Phase::HopCooking,
    };
    let plan = HopCookingPlan {
        duration_ms: 10_000,
        additions: vec![hop("cascade", 2_000)],
    };
    assert_eq!(driver.start(run, Some(&plan)).unwrap(), PhaseStart::Started);
    if kettle_celsius < 100.0 {
        assert!(wait_for(Duration::from_secs(2), || {
            r.ctx.temperature.subscriber_count() == 2
                && r.ctx.temperature.is_running()
                && r.host.calls().iter().any(|c| c == "level 0 started=false")
        }));
    } else {
        // Boiling: both listeners are gone and the pre-notification timer is armed.
        assert!(wait_for(Duration::from_secs(2), || {
            r.host.calls().iter().any(|c| c == "level 0 started=true")
        }));
        assert_eq!(r.ctx.temperature.subscriber_count(), 0);
    }

    driver.finish();
    driver.finish();

    assert!(!driver.is_active());
    assert!(driver.expected().is_empty());
    assert_eq!(r.ctx.temperature.subscriber_count(), 0);
    assert!(!r.ctx.temperature.is_running());
    assert!(!r.kettle.heater_on());
    assert!(!r.ctx.stirrer.is_running());
    let calls = r.host.calls();
    std::thread::sleep(ms(200));
    assert_eq!(r.host.calls(), calls);
}
