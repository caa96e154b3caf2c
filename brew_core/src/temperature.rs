//! Background temperature maintenance.
//!
//! One loop thread per controller reads the thermometer every sample interval,
//! drives the heater with simple hysteresis and calls every subscriber whose band
//! contains the reading. Callbacks run on the loop thread while the subscriber
//! lock is held: they must return quickly and must not call back into the
//! controller.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use brew_traits::{Actuator, Thermometer};

use crate::config::TemperatureCfg;
use crate::error::describe_fault;
use crate::process::SensorStatus;
use crate::timer::{Canceller, Sleeper, cancel_pair};

pub type SubscriptionId = u64;

/// Returned by a listener to keep or drop its subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeStatus {
    Subscribe,
    Unsubscribe,
}

pub trait TemperatureListener: Send {
    fn temperature_reached(&mut self, celsius: f32) -> SubscribeStatus;
}

impl<F> TemperatureListener for F
where
    F: FnMut(f32) -> SubscribeStatus + Send,
{
    fn temperature_reached(&mut self, celsius: f32) -> SubscribeStatus {
        self(celsius)
    }
}

struct Subscription {
    id: SubscriptionId,
    target: f32,
    tolerance: f32,
    listener: Box<dyn TemperatureListener>,
}

impl Subscription {
    fn contains(&self, celsius: f32) -> bool {
        (self.target - self.tolerance..=self.target + self.tolerance).contains(&celsius)
    }
}

struct Readings {
    target: f32,
    status: SensorStatus,
    last: Option<f32>,
}

struct Shared {
    subscribers: Mutex<Vec<Subscription>>,
    readings: Mutex<Readings>,
    heater: Mutex<Box<dyn Actuator + Send>>,
    thermometer: Mutex<Box<dyn Thermometer + Send>>,
    cfg: TemperatureCfg,
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Shared {
    fn switch_heater(&self, on: bool) {
        let mut heater = lock(&self.heater);
        if heater.is_on() == on {
            return;
        }
        let res = if on {
            heater.switch_on()
        } else {
            heater.switch_off()
        };
        match res {
            Ok(()) => tracing::debug!(on, "heater switched"),
            Err(e) => tracing::warn!(on, error = %describe_fault(e.as_ref()), "heater switch failed"),
        }
    }

    fn force_heater_off(&self) {
        let mut heater = lock(&self.heater);
        if let Err(e) = heater.switch_off() {
            tracing::error!(error = %describe_fault(e.as_ref()), "heater could not be switched off");
        }
    }

    fn apply_hysteresis(&self, celsius: f32) {
        let target = lock(&self.readings).target;
        let delta = self.cfg.heatup_delta;
        if celsius < target - delta {
            self.switch_heater(true);
        } else if celsius > target + delta {
            self.switch_heater(false);
        }
    }

    fn notify_subscribers(&self, celsius: f32) {
        let mut subs = lock(&self.subscribers);
        subs.retain_mut(|s| {
            if !s.contains(celsius) {
                return true;
            }
            let keep = s.listener.temperature_reached(celsius) == SubscribeStatus::Subscribe;
            if !keep {
                tracing::trace!(id = s.id, target = s.target, "subscriber released");
            }
            keep
        });
    }

    fn run(&self, sleeper: &Sleeper) {
        let mut failures = 0u32;
        loop {
            let reading = lock(&self.thermometer).read_celsius();
            match reading {
                Ok(celsius) => {
                    failures = 0;
                    {
                        let mut r = lock(&self.readings);
                        r.status = SensorStatus::Ok;
                        r.last = Some(celsius);
                    }
                    tracing::trace!(celsius, "temperature sample");
                    if sleeper.is_cancelled() {
                        break;
                    }
                    self.apply_hysteresis(celsius);
                    self.notify_subscribers(celsius);
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        failures,
                        error = %describe_fault(e.as_ref()),
                        "thermometer read failed"
                    );
                    if failures >= self.cfg.max_read_failures {
                        self.force_heater_off();
                        lock(&self.readings).status = SensorStatus::NotFound;
                        tracing::error!(failures, "thermometer lost, temperature control stopped");
                        return;
                    }
                    lock(&self.readings).status = SensorStatus::Error;
                }
            }
            if !sleeper.sleep(self.cfg.sample_interval) {
                break;
            }
        }
        tracing::debug!("temperature loop exiting");
    }
}

struct Worker {
    canceller: Canceller,
    handle: JoinHandle<()>,
}

pub struct TemperatureController {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for TemperatureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemperatureController")
            .field("target", &self.target())
            .field("status", &self.sensor_status())
            .field("running", &self.is_running())
            .finish()
    }
}

impl TemperatureController {
    pub fn new(
        thermometer: Box<dyn Thermometer + Send>,
        heater: Box<dyn Actuator + Send>,
        cfg: TemperatureCfg,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: Mutex::new(Vec::new()),
                readings: Mutex::new(Readings {
                    target: f32::NEG_INFINITY,
                    status: SensorStatus::Ok,
                    last: None,
                }),
                heater: Mutex::new(heater),
                thermometer: Mutex::new(thermometer),
                cfg,
            }),
            worker: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `listener` for readings within `target ± tolerance`.
    pub fn subscribe(
        &self,
        target: f32,
        tolerance: f32,
        listener: impl TemperatureListener + 'static,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.shared.subscribers).push(Subscription {
            id,
            target,
            tolerance,
            listener: Box::new(listener),
        });
        tracing::debug!(id, target, tolerance, "temperature subscription added");
        id
    }

    /// Returns true when the subscription was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = lock(&self.shared.subscribers);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    /// Set the target and make sure the loop is running.
    pub fn heat_up(&self, target: f32) {
        lock(&self.shared.readings).target = target;
        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            tracing::debug!(target, "temperature target updated");
            return;
        }
        let (canceller, sleeper) = cancel_pair();
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("temperature".into())
            .spawn(move || shared.run(&sleeper));
        match spawned {
            Ok(handle) => {
                tracing::info!(target, "temperature loop started");
                *worker = Some(Worker { canceller, handle });
            }
            Err(e) => tracing::error!(error = %e, "failed to spawn temperature loop"),
        }
    }

    /// Stop the loop, drop every subscriber and switch the heater off.
    pub fn stop(&self) {
        let worker = lock(&self.worker).take();
        if let Some(mut w) = worker {
            w.canceller.cancel();
            if w.handle.thread().id() != thread::current().id() && w.handle.join().is_err() {
                tracing::warn!("temperature loop panicked");
            }
        }
        lock(&self.shared.subscribers).clear();
        lock(&self.shared.readings).target = f32::NEG_INFINITY;
        self.shared.force_heater_off();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    pub fn target(&self) -> Option<f32> {
        let t = lock(&self.shared.readings).target;
        t.is_finite().then_some(t)
    }

    pub fn sensor_status(&self) -> SensorStatus {
        lock(&self.shared.readings).status
    }

    pub fn last_temperature(&self) -> Option<f32> {
        lock(&self.shared.readings).last
    }

    pub fn heater_on(&self) -> bool {
        lock(&self.shared.heater).is_on()
    }
}

impl Drop for TemperatureController {
    fn drop(&mut self) {
        self.stop();
    }
}
