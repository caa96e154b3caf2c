#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let Ok(file) = brew_config::load_recipe(data) else {
        return;
    };
    if file.validate().is_err() {
        return;
    }
    // Accepted recipes must also survive schedule construction.
    let recipe = brew_core::Recipe::from(&file);
    let room = brew_core::config::TemperatureCfg::default().room_temperature;
    if recipe.validate(room).is_ok() {
        if let Some(m) = &recipe.mashing {
            let _ = brew_core::phase::mash::build_schedule(m, 60_000);
        }
        if let Some(h) = &recipe.hop_cooking {
            let _ = brew_core::phase::hop::build_hop_schedule(h, 60_000);
        }
    }
});
