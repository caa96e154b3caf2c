//! `From` implementations bridging `brew_config` types to `brew_core` types.
use std::time::Duration;

use crate::config::{BrewCfg, HopCfg, NotifierCfg, TemperatureCfg, TemperatureLogCfg, TimingCfg};
use crate::recipe::{HopCookingPlan, IngredientAddition, MashingPlan, Recipe, TemperatureLevel, Unit};

// ── Runtime configuration ────────────────────────────────────────────────────

impl From<&brew_config::TemperatureCfg> for TemperatureCfg {
    fn from(c: &brew_config::TemperatureCfg) -> Self {
        Self {
            heatup_delta: c.heatup_delta,
            sample_interval: Duration::from_millis(c.sample_interval_ms),
            max_read_failures: c.max_read_failures,
            room_temperature: c.room_temperature,
        }
    }
}

impl From<&brew_config::TimingCfg> for TimingCfg {
    fn from(c: &brew_config::TimingCfg) -> Self {
        Self {
            prenotify_lead: Duration::from_millis(c.prenotify_ms),
            response_timeout: Duration::from_millis(c.response_timeout_ms),
            watchdog_poll: Duration::from_millis(c.watchdog_poll_ms),
        }
    }
}

impl From<&brew_config::HopCookingCfg> for HopCfg {
    fn from(c: &brew_config::HopCookingCfg) -> Self {
        let shared = brew_config::TimingCfg::default().prenotify_ms;
        Self {
            temperature: c.temperature,
            prenotify_delta: c.prenotify_delta,
            end_notice_lead: Duration::from_millis(c.prenotify_ms),
            prenotify_lead: Duration::from_millis(c.hop_prenotify_ms.unwrap_or(shared)),
        }
    }
}

impl From<&brew_config::Logging> for TemperatureLogCfg {
    fn from(c: &brew_config::Logging) -> Self {
        Self {
            temperature_delta: c.temperature_delta,
            time_delta: Duration::from_millis(c.time_delta_ms),
        }
    }
}

impl From<&brew_config::NotifierCfg> for NotifierCfg {
    fn from(c: &brew_config::NotifierCfg) -> Self {
        Self {
            beep_on_prenotification: c.beep_on_prenotification,
            beep_on_confirmation_request: c.beep_on_confirmation_request,
        }
    }
}

impl From<&brew_config::Config> for BrewCfg {
    fn from(c: &brew_config::Config) -> Self {
        Self {
            temperature: (&c.temperature).into(),
            timing: (&c.timing).into(),
            hop: HopCfg {
                // Without its own lead, hop cooking follows the shared one.
                prenotify_lead: Duration::from_millis(
                    c.hop_cooking.hop_prenotify_ms.unwrap_or(c.timing.prenotify_ms),
                ),
                ..(&c.hop_cooking).into()
            },
            temperature_log: (&c.logging).into(),
            notifier: (&c.notifier).into(),
        }
    }
}

// ── Recipes ──────────────────────────────────────────────────────────────────

impl From<brew_config::UnitToml> for Unit {
    fn from(u: brew_config::UnitToml) -> Self {
        match u {
            brew_config::UnitToml::Ml => Self::Ml,
            brew_config::UnitToml::L => Self::L,
            brew_config::UnitToml::Kg => Self::Kg,
            brew_config::UnitToml::G => Self::G,
        }
    }
}

impl From<&brew_config::AdditionToml> for IngredientAddition {
    fn from(a: &brew_config::AdditionToml) -> Self {
        Self::new(a.name.clone(), a.amount, a.unit.into(), a.input_ms)
    }
}

impl From<&brew_config::MashingToml> for MashingPlan {
    fn from(m: &brew_config::MashingToml) -> Self {
        Self {
            levels: m
                .levels
                .iter()
                .map(|l| TemperatureLevel::new(l.start_ms, l.duration_ms, l.temperature))
                .collect(),
            malt_additions: m.malt.iter().map(Into::into).collect(),
        }
    }
}

impl From<&brew_config::HopCookingToml> for HopCookingPlan {
    fn from(h: &brew_config::HopCookingToml) -> Self {
        Self {
            duration_ms: h.duration_ms,
            additions: h.hops.iter().map(Into::into).collect(),
        }
    }
}

impl From<&brew_config::RecipeFile> for Recipe {
    fn from(r: &brew_config::RecipeFile) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            description: r.description.clone(),
            mashing: r.mashing.as_ref().map(Into::into),
            hop_cooking: r.hop_cooking.as_ref().map(Into::into),
        }
    }
}
