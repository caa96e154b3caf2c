//! End-to-end walks through the brewing state machine on simulated hardware.
mod common;

use brew_core::{
    BrewError, BrewingState, IngredientAddition, MashingPlan, MessageKind, Phase, Position,
    ProcessError, Recipe, StateType, StepData, TemperatureLevel, Unit, HopCookingPlan,
};
use common::{fast_cfg, ms, rig, wait_for};
use rstest::rstest;
use std::time::Duration;

fn plain_recipe() -> Recipe {
    Recipe {
        id: "r-plain".into(),
        name: "Plain".into(),
        ..Recipe::default()
    }
}

fn malt(name: &str, t: i64) -> IngredientAddition {
    IngredientAddition::new(name, 2.5, Unit::Kg, t)
}

fn mash_recipe() -> Recipe {
    Recipe {
        id: "r-mash".into(),
        name: "Mash".into(),
        mashing: Some(MashingPlan {
            levels: vec![
                TemperatureLevel::new(0, 60_000, 50.0),
                TemperatureLevel::new(60_000, 60_000, 64.0),
            ],
            malt_additions: vec![malt("pilsner", 0)],
        }),
        ..Recipe::default()
    }
}

#[test]
fn recipe_without_plans_needs_only_phase_confirmations() {
    let r = rig(fast_cfg());
    r.controller.start_brewing(plain_recipe()).unwrap();

    let steps = [
        (Phase::Mashing, Position::Start),
        (Phase::Lautering, Position::End),
        (Phase::HopCooking, Position::Start),
        (Phase::Whirlpool, Position::End),
        (Phase::Finished, Position::End),
    ];
    for (phase, position) in steps {
        let expected = BrewingState::request(phase, position);
        r.wait_state(&expected);
        r.confirm(expected);
    }
    assert!(r.state().is_none());

    let requests: Vec<_> = r
        .notifier
        .messages()
        .into_iter()
        .filter_map(|m| match m.kind {
            MessageKind::ConfirmationRequest { state } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(requests.len(), 5);
    assert!(requests.iter().all(|s| s.ingredients().is_none()));
    assert!(requests.iter().all(|s| s.position != Position::Adding));
    assert_eq!(r.controller.pending_confirmations(), 0);

    let logs = r.storage.logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0]
        .messages
        .iter()
        .any(|m| m.kind == MessageKind::BrewingComplete));
    let ended = logs[0].end_time_ms.expect("end time recorded");
    assert!(ended >= logs[0].latest_time_ms().unwrap());
}

#[test]
fn second_start_is_rejected_and_first_process_untouched() {
    let r = rig(fast_cfg());
    let id = r.controller.start_brewing(plain_recipe()).unwrap();
    let before = r.controller.current_brewing_process().unwrap();

    let err = r.controller.start_brewing(mash_recipe()).unwrap_err();
    assert_eq!(err, BrewError::Process(ProcessError::AlreadyRunning));

    let after = r.controller.current_brewing_process().unwrap();
    assert_eq!(after.id, id);
    assert_eq!(after.recipe, before.recipe);
    assert_eq!(after.state, before.state);
}

#[test]
fn mismatched_confirmation_is_rejected_without_mutation() {
    let r = rig(fast_cfg());
    r.controller.start_brewing(plain_recipe()).unwrap();
    let current = r.state().unwrap();

    let wrong = BrewingState::request(Phase::Lautering, Position::End);
    let err = r.controller.confirm_step(wrong).unwrap_err();
    assert!(matches!(err, BrewError::InvalidStep(_)));
    assert_eq!(r.state().unwrap(), current);

    // Rejected attempts are still in the audit log.
    assert_eq!(
        r.logged(|k| matches!(k, MessageKind::Confirmation { confirmed, .. } if confirmed.phase == Phase::Lautering)),
        1
    );
    assert_eq!(r.logged(|k| matches!(k, MessageKind::Info { .. })), 1);
}

#[test]
fn confirming_while_nothing_is_requested_fails() {
    let r = rig(fast_cfg());
    assert_eq!(
        r.controller
            .confirm_step(BrewingState::request(Phase::Mashing, Position::Start))
            .unwrap_err(),
        BrewError::ProcessNotFound
    );
    r.controller.start_brewing(mash_recipe()).unwrap();
    r.confirm(BrewingState::request(Phase::Mashing, Position::Start));
    let state = r.state().unwrap();
    assert_eq!(state.kind, StateType::Normal);
    let err = r
        .controller
        .confirm_step(BrewingState::new(StateType::Normal, state.phase, state.position))
        .unwrap_err();
    assert!(matches!(err, BrewError::InvalidStep(_)));
    r.controller.shutdown();
}

#[rstest]
#[case::unordered_hops(Recipe {
    hop_cooking: Some(HopCookingPlan {
        duration_ms: 1000,
        additions: vec![malt("b", 500), malt("a", 100)],
    }),
    ..plain_recipe()
})]
#[case::negative_malt(Recipe {
    mashing: Some(MashingPlan {
        levels: vec![TemperatureLevel::new(0, 1000, 55.0)],
        malt_additions: vec![malt("a", -1)],
    }),
    ..plain_recipe()
})]
#[case::mash_level_below_room(Recipe {
    mashing: Some(MashingPlan {
        levels: vec![TemperatureLevel::new(0, 1000, 19.0)],
        malt_additions: vec![malt("a", 0)],
    }),
    ..plain_recipe()
})]
#[case::hop_after_end(Recipe {
    hop_cooking: Some(HopCookingPlan {
        duration_ms: 100,
        additions: vec![malt("a", 500)],
    }),
    ..plain_recipe()
})]
fn invalid_recipe_has_no_side_effects(#[case] recipe: Recipe) {
    let r = rig(fast_cfg());
    let err = r.controller.start_brewing(recipe).unwrap_err();
    assert!(matches!(
        err,
        BrewError::Process(ProcessError::InvalidRecipe(_))
    ));
    assert!(r.controller.current_brewing_process().is_none());
    assert!(r.controller.brewing_log().is_none());
    assert!(r.notifier.messages().is_empty());
    assert!(r.storage.logs().is_empty());
    assert_eq!(
        r.controller.current_brewing_process_summary().unwrap_err(),
        BrewError::ProcessNotFound
    );
    // The slot is still free.
    r.controller.start_brewing(plain_recipe()).unwrap();
}

#[test]
fn cancel_mid_mashing_waits_for_acknowledgement() {
    let r = rig(fast_cfg());
    r.controller.start_brewing(mash_recipe()).unwrap();
    r.confirm(BrewingState::request(Phase::Mashing, Position::Start));
    assert!(wait_for(Duration::from_secs(2), || {
        r.controller.actuator_details().stirrer_on
    }));

    r.controller.cancel_current_brewing_process().unwrap();
    let cancelled = r.state().unwrap();
    assert_eq!(cancelled.kind, StateType::Cancel);
    assert_eq!(cancelled.phase, Phase::Mashing);
    assert_eq!(r.notifier.alarms().len(), 1);
    assert!(!r.controller.actuator_details().heater_on);
    assert!(!r.controller.actuator_details().stirrer_on);

    // A second cancel is a no-op.
    r.controller.cancel_current_brewing_process().unwrap();
    assert_eq!(r.notifier.alarms().len(), 1);

    let other = BrewingState::new(StateType::Cancel, Phase::Lautering, Position::End);
    assert!(matches!(
        r.controller.confirm_step(other).unwrap_err(),
        BrewError::InvalidStep(_)
    ));
    assert_eq!(r.state().unwrap(), cancelled);

    r.confirm(cancelled);
    assert!(r.state().is_none());
    let logs = r.storage.logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].messages.iter().any(|m| matches!(
        &m.kind,
        MessageKind::BrewingAborted { reason } if reason == "Cancelled"
    )));
    assert!(logs[0].end_time_ms.is_some());
}

#[test]
fn unanswered_addition_times_out_into_cancel() {
    let r = rig(fast_cfg());
    r.kettle.set_celsius(50.0);
    r.controller.start_brewing(mash_recipe()).unwrap();
    r.confirm(BrewingState::request(Phase::Mashing, Position::Start));

    let adding = BrewingState::request(Phase::Mashing, Position::Adding);
    let requested = r.wait_state(&adding);
    assert_eq!(requested.ingredients().unwrap(), &[malt("pilsner", 0)]);
    assert_eq!(r.controller.pending_confirmations(), 1);

    let cancelled = BrewingState::new(StateType::Cancel, Phase::Mashing, Position::Adding);
    r.wait_state(&cancelled);
    assert_eq!(r.controller.pending_confirmations(), 0);
    assert_eq!(r.notifier.alarms().len(), 1);
    assert_eq!(
        r.logged(|k| matches!(k, MessageKind::BrewingAborted { reason } if reason == "RequestResponseTimeout")),
        1
    );
    // Only the cancelled triple itself acknowledges; a late addition does not.
    let late = adding.with_data(StepData::Ingredients(vec![malt("pilsner", 0)]));
    assert!(r.controller.confirm_step(late).is_err());
    r.confirm(cancelled);
    assert!(r.state().is_none());
}

#[test]
fn shutdown_releases_everything() {
    let r = rig(fast_cfg());
    r.controller.start_brewing(mash_recipe()).unwrap();
    r.confirm(BrewingState::request(Phase::Mashing, Position::Start));
    std::thread::sleep(ms(30));

    r.controller.shutdown();
    r.controller.shutdown();
    assert!(r.state().is_none());
    assert!(!r.kettle.heater_on());
    assert!(!r.controller.actuator_details().stirrer_on);
    assert!(r.beeper.is_muted());
    assert_eq!(r.storage.logs().len(), 1);
}
