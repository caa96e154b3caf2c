//! Response-timeout tracking for ingredient confirmation requests.
use std::collections::HashMap;
use std::sync::Weak;
use std::thread;
use std::time::{Duration, Instant};

use crate::recipe::IngredientAddition;
use crate::timer::{Canceller, cancel_pair};

/// Request timestamps of every unconfirmed ingredient addition.
#[derive(Debug, Default, Clone)]
pub struct PendingConfirmations {
    sent_at: HashMap<IngredientAddition, Instant>,
}

impl PendingConfirmations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `items` from `now`. Re-requested items keep their first timestamp.
    pub fn request_sent(&mut self, items: &[IngredientAddition], now: Instant) {
        for item in items {
            self.sent_at.entry(item.clone()).or_insert_with(|| {
                tracing::debug!(item = %item.name, "confirmation pending");
                now
            });
        }
    }

    pub fn response_received(&mut self, items: &[IngredientAddition]) {
        for item in items {
            if self.sent_at.remove(item).is_some() {
                tracing::debug!(item = %item.name, "confirmation received");
            }
        }
    }

    /// First item that has been waiting for `timeout` or longer.
    pub fn expired(&self, now: Instant, timeout: Duration) -> Option<&IngredientAddition> {
        self.sent_at
            .iter()
            .find(|(_, at)| now.saturating_duration_since(**at) >= timeout)
            .map(|(item, _)| item)
    }

    pub fn len(&self) -> usize {
        self.sent_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent_at.is_empty()
    }

    pub fn clear(&mut self) {
        self.sent_at.clear();
    }
}

/// What the watchdog loop does after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    KeepWatching,
    Done,
}

/// Implemented by the owner of the pending set; called once per poll period.
pub(crate) trait ResponseGuard: Send + Sync {
    fn check_responses(&self, process_id: u64) -> Verdict;
}

/// Background loop polling a `ResponseGuard` for one process.
///
/// Stopping only signals the loop; it is never joined, since the loop may be
/// waiting for the same lock its owner holds while stopping it.
#[derive(Debug)]
pub struct Watchdog {
    canceller: Canceller,
    process_id: u64,
}

impl Watchdog {
    pub(crate) fn spawn<G>(guard: Weak<G>, process_id: u64, poll: Duration) -> std::io::Result<Self>
    where
        G: ResponseGuard + 'static,
    {
        let (canceller, sleeper) = cancel_pair();
        thread::Builder::new()
            .name("response-watchdog".into())
            .spawn(move || {
                while sleeper.sleep(poll) {
                    let Some(guard) = guard.upgrade() else {
                        break;
                    };
                    if guard.check_responses(process_id) == Verdict::Done {
                        break;
                    }
                }
                tracing::debug!(process_id, "watchdog exiting");
            })?;
        tracing::debug!(process_id, ?poll, "watchdog started");
        Ok(Self {
            canceller,
            process_id,
        })
    }

    pub fn process_id(&self) -> u64 {
        self.process_id
    }

    pub fn stop(mut self) {
        self.canceller.cancel();
    }
}
