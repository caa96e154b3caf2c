use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source shared by the controller, the phase schedulers and the audit log.
///
/// Schedules and timeouts are computed from `now()`; only log entries and
/// process records carry `wall_ms()`.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds since the Unix epoch.
    fn wall_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    /// Milliseconds elapsed since `epoch`, 0 if `epoch` lies ahead.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let elapsed = self.now().saturating_duration_since(epoch);
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Real time: `Instant::now()` and a blocking sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

/// Clock that only moves when told to. Clones share the same time.
///
/// Wall time starts at the given epoch milliseconds and advances together with
/// the monotonic reading; `sleep` advances both without blocking.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    wall_origin_ms: u64,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn starting_at(wall_origin_ms: u64) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin_ms,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed = elapsed.saturating_add(d);
    }

    fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }

    fn wall_ms(&self) -> u64 {
        let ms = u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.wall_origin_ms.saturating_add(ms)
    }
}
