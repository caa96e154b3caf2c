//! Writes temperature readings into the audit log while a heated phase runs.
use std::sync::{Arc, Mutex};
use std::time::Instant;

use brew_traits::Clock;

use crate::config::TemperatureLogCfg;
use crate::log::BrewingLogger;
use crate::message::MessageKind;
use crate::temperature::{SubscribeStatus, SubscriptionId, TemperatureController};

// Band wide enough to see every plausible reading.
const BAND_CENTER: f32 = 50.0;
const BAND_TOLERANCE: f32 = 100.0;

pub struct TemperatureLogger {
    temperature: Arc<TemperatureController>,
    logger: Arc<BrewingLogger>,
    clock: Arc<dyn Clock>,
    cfg: TemperatureLogCfg,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl TemperatureLogger {
    pub fn new(
        temperature: Arc<TemperatureController>,
        logger: Arc<BrewingLogger>,
        clock: Arc<dyn Clock>,
        cfg: TemperatureLogCfg,
    ) -> Self {
        Self {
            temperature,
            logger,
            clock,
            cfg,
            subscription: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) {
        let Ok(mut sub) = self.subscription.lock() else {
            return;
        };
        // A stopped temperature loop drops its subscribers, so always re-register.
        if let Some(old) = sub.take() {
            self.temperature.unsubscribe(old);
        }
        let logger = Arc::clone(&self.logger);
        let clock = Arc::clone(&self.clock);
        let cfg = self.cfg.clone();
        let mut last: Option<(f32, Instant)> = None;
        let id = self
            .temperature
            .subscribe(BAND_CENTER, BAND_TOLERANCE, move |celsius: f32| {
                let now = clock.now();
                let due = last.is_none_or(|(t, at)| {
                    (celsius - t).abs() >= cfg.temperature_delta
                        || now.saturating_duration_since(at) >= cfg.time_delta
                });
                if due {
                    last = Some((celsius, now));
                    if logger.log(MessageKind::Temperature { celsius }).is_err() {
                        tracing::trace!("temperature reading without active log");
                    }
                }
                SubscribeStatus::Subscribe
            });
        *sub = Some(id);
    }

    pub fn unsubscribe(&self) {
        if let Ok(mut sub) = self.subscription.lock()
            && let Some(id) = sub.take()
        {
            self.temperature.unsubscribe(id);
        }
    }
}
