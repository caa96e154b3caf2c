use brew_core::phase::hop::{HopAction, build_hop_schedule};
use brew_core::phase::mash::{MashAction, build_schedule};
use brew_core::{HopCookingPlan, IngredientAddition, MashingPlan, TemperatureLevel, Unit};
use proptest::prelude::*;

// Ascending input times, with plenty of ties so grouping is exercised.
fn additions(prefix: &'static str) -> impl Strategy<Value = Vec<IngredientAddition>> {
    prop::collection::vec(0i64..20, 1..24).prop_map(move |mut steps| {
        steps.sort_unstable();
        steps
            .into_iter()
            .enumerate()
            .map(|(i, t)| IngredientAddition::new(format!("{prefix}{i}"), 1.0, Unit::G, t * 1_000))
            .collect()
    })
}

fn levels() -> impl Strategy<Value = Vec<TemperatureLevel>> {
    prop::collection::vec((0i64..5, 1i64..10, 40.0f32..78.0), 1..6).prop_map(|raw| {
        let mut start = 0;
        raw.into_iter()
            .map(|(gap, len, temp)| {
                start += gap * 1_000;
                let level = TemperatureLevel::new(start, len * 1_000, temp);
                start = level.end_ms();
                level
            })
            .collect()
    })
}

fn flatten<'a>(groups: impl Iterator<Item = &'a Vec<IngredientAddition>>) -> Vec<String> {
    let mut names: Vec<String> = groups.flatten().map(|a| a.name.clone()).collect();
    names.sort();
    names
}

proptest! {
    #[test]
    fn mash_schedule_is_ordered_and_complete(
        malts in additions("malt"),
        lvls in levels(),
        lead in 0i64..5_000,
    ) {
        let plan = MashingPlan { levels: lvls, malt_additions: malts };
        prop_assert!(plan.validate(20.0).is_ok());
        let schedule = build_schedule(&plan, lead);

        for pair in schedule.windows(2) {
            prop_assert!(pair[0].at_ms <= pair[1].at_ms);
            // Same-time additions of one kind are merged.
            let same_kind = std::mem::discriminant(&pair[0].action) == std::mem::discriminant(&pair[1].action);
            prop_assert!(!(same_kind && pair[0].at_ms == pair[1].at_ms));
        }

        let mut expected: Vec<String> = plan.malt_additions.iter().map(|a| a.name.clone()).collect();
        expected.sort();
        let due = flatten(schedule.iter().filter_map(|s| match &s.action {
            MashAction::AdditionDue(v) => Some(v),
            _ => None,
        }));
        let pre = flatten(schedule.iter().filter_map(|s| match &s.action {
            MashAction::PreNotify(v) => Some(v),
            _ => None,
        }));
        prop_assert_eq!(&due, &expected);
        prop_assert_eq!(&pre, &expected);

        let starts: Vec<usize> = schedule.iter().filter_map(|s| match s.action {
            MashAction::LevelStart(i) => Some(i),
            _ => None,
        }).collect();
        prop_assert_eq!(starts, (1..plan.levels.len()).collect::<Vec<_>>());
    }

    #[test]
    fn hop_prenotify_precedes_its_addition(
        hops in additions("hop"),
        lead in 0i64..5_000,
    ) {
        let plan = HopCookingPlan { duration_ms: 60_000, additions: hops };
        prop_assert!(plan.validate().is_ok());
        let steps = build_hop_schedule(&plan, lead);
        prop_assert_eq!(steps.len() % 2, 0);

        for pair in steps.windows(2) {
            prop_assert!(pair[0].at_ms <= pair[1].at_ms);
        }
        for (i, step) in steps.iter().enumerate() {
            if let HopAction::AdditionDue(items) = &step.action {
                let announced = steps[..i].iter().any(|s| {
                    matches!(&s.action, HopAction::PreNotify(p) if p == items)
                });
                prop_assert!(announced, "{:?} was never announced", items);
                prop_assert!(items.iter().all(|a| a.input_time_ms == step.at_ms));
            }
        }
    }

    #[test]
    fn reversed_additions_are_rejected(hops in additions("hop")) {
        prop_assume!(hops.first().map(|a| a.input_time_ms) != hops.last().map(|a| a.input_time_ms));
        let mut reversed = hops;
        reversed.reverse();
        let plan = HopCookingPlan { duration_ms: 60_000, additions: reversed };
        prop_assert!(plan.validate().is_err());
    }
}
