//! Cancellable waits shared by the phase drivers and the watchdog.
//!
//! - `Sleeper`/`Canceller`: an interruptible sleep; dropping or firing the
//!   canceller wakes the sleeper immediately.
//! - `DelayedTask`: a one-shot action on its own short-lived thread. Cancelling
//!   joins the thread, so a task may only do non-blocking work (send on a channel).
//! - `TimerSlot`: holds at most one pending task; `replace` cancels and joins the
//!   previous task before installing the new one.
//! - `PausableTimer`: stopwatch that stops counting while paused.
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;

/// Wakes the paired `Sleeper`. Dropping it has the same effect as `cancel`.
#[derive(Debug)]
pub struct Canceller {
    tx: Option<xch::Sender<()>>,
}

impl Canceller {
    pub fn cancel(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.try_send(());
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sleeper {
    rx: xch::Receiver<()>,
}

impl Sleeper {
    /// Sleep for `d`. Returns false when woken by cancellation.
    pub fn sleep(&self, d: Duration) -> bool {
        matches!(self.rx.recv_timeout(d), Err(xch::RecvTimeoutError::Timeout))
    }

    pub fn is_cancelled(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(xch::TryRecvError::Empty))
    }
}

pub fn cancel_pair() -> (Canceller, Sleeper) {
    let (tx, rx) = xch::bounded(1);
    (Canceller { tx: Some(tx) }, Sleeper { rx })
}

/// One-shot action run after a delay unless cancelled first.
#[derive(Debug)]
pub struct DelayedTask {
    canceller: Canceller,
    handle: Option<JoinHandle<()>>,
}

impl DelayedTask {
    pub fn schedule<F>(name: &str, delay: Duration, action: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (canceller, sleeper) = cancel_pair();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                if sleeper.sleep(delay) {
                    action();
                }
            })?;
        Ok(Self {
            canceller,
            handle: Some(handle),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel and wait for the task thread to exit.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.canceller.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!("delayed task panicked");
            }
        }
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Holds the single pending wait of an owner.
#[derive(Debug, Default)]
pub struct TimerSlot {
    task: Option<DelayedTask>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the pending task (joined) and schedule `action` after `delay`.
    pub fn replace<F>(&mut self, name: &str, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        match DelayedTask::schedule(name, delay, action) {
            Ok(task) => self.task = Some(task),
            Err(e) => tracing::error!(error = %e, task = name, "failed to spawn timer thread"),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

/// Stopwatch that can be paused and resumed; starts paused at zero.
#[derive(Debug, Clone, Default)]
pub struct PausableTimer {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl PausableTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume counting. No-op while already running.
    pub fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Stop counting. No-op while already paused.
    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let running = self
            .running_since
            .map_or(Duration::ZERO, |since| now.saturating_duration_since(since));
        self.accumulated + running
    }

    pub fn elapsed_ms(&self, now: Instant) -> i64 {
        i64::try_from(self.elapsed(now).as_millis()).unwrap_or(i64::MAX)
    }
}
