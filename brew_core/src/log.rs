//! Audit log of the running process and its persistence.
//!
//! The logger's lock is a leaf: nothing is called while it is held, so any
//! component may log regardless of which other locks it holds.
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use brew_traits::Clock;

use crate::error::{BrewError, Result};
use crate::message::{BrewingLog, Message, MessageKind, Priority};
use crate::recipe::Recipe;

/// Attempts made to persist a finished log before giving up.
pub const MAX_SAVE_ATTEMPTS: u32 = 5;

pub trait LogStorage: Send + Sync {
    fn save(&self, log: &BrewingLog) -> std::result::Result<(), Box<dyn Error + Send + Sync>>;
}

/// Keeps finished logs in memory.
#[derive(Debug, Default)]
pub struct MemoryLogStorage {
    logs: Mutex<Vec<BrewingLog>>,
}

impl MemoryLogStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<BrewingLog> {
        self.logs.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl LogStorage for MemoryLogStorage {
    fn save(&self, log: &BrewingLog) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
        self.logs
            .lock()
            .map_err(|_| "log storage poisoned")?
            .push(log.clone());
        Ok(())
    }
}

/// Writes each finished log as `<dir>/brew-<id>.json`.
#[derive(Debug, Clone)]
pub struct FileLogStorage {
    dir: PathBuf,
}

impl FileLogStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, id: u64) -> PathBuf {
        self.dir.join(format!("brew-{id}.json"))
    }
}

impl LogStorage for FileLogStorage {
    fn save(&self, log: &BrewingLog) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
        std::fs::create_dir_all(&self.dir)?;
        let file = std::fs::File::create(self.path_for(log.id))?;
        let mut out = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, log)?;
        std::io::Write::flush(&mut out)?;
        Ok(())
    }
}

pub struct BrewingLogger {
    current: Mutex<Option<BrewingLog>>,
    storage: Arc<dyn LogStorage>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BrewingLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrewingLogger")
            .field("active", &self.is_active())
            .finish()
    }
}

impl BrewingLogger {
    pub fn new(storage: Arc<dyn LogStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            current: Mutex::new(None),
            storage,
            clock,
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<BrewingLog>> {
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Begin a new log, discarding any unfinished one.
    pub fn start_log(&self, id: u64, recipe: Recipe) {
        let mut cur = self.current();
        if let Some(old) = cur.as_ref() {
            tracing::warn!(old = old.id, new = id, "unfinished brewing log replaced");
        }
        *cur = Some(BrewingLog::new(id, recipe));
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    pub fn log(&self, kind: MessageKind) -> Result<()> {
        let msg = Message::new(kind, self.clock.wall_ms());
        self.append(msg)
    }

    pub fn append(&self, msg: Message) -> Result<()> {
        let mut cur = self.current();
        let log = cur.as_mut().ok_or(BrewError::ProcessNotFound)?;
        tracing::debug!(log = log.id, kind = ?msg.kind, "brewing log");
        log.messages.push(msg);
        Ok(())
    }

    pub fn snapshot(&self) -> Option<BrewingLog> {
        self.current().clone()
    }

    pub fn messages_by_priority(&self, min: Priority) -> Result<Vec<Message>> {
        let cur = self.current();
        let log = cur.as_ref().ok_or(BrewError::ProcessNotFound)?;
        Ok(log
            .messages_by_priority(min)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Detach the active log without persisting it.
    pub fn take_log(&self) -> Result<BrewingLog> {
        self.current().take().ok_or(BrewError::ProcessNotFound)
    }

    /// Persist `log`, retrying up to `MAX_SAVE_ATTEMPTS` times. Failure is logged
    /// and swallowed; returns whether the log was stored.
    pub fn persist(&self, log: &BrewingLog) -> bool {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            match self.storage.save(log) {
                Ok(()) => {
                    tracing::info!(log = log.id, attempt, "brewing log saved");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(log = log.id, attempt, error = %e, "saving brewing log failed");
                }
            }
        }
        tracing::error!(
            log = log.id,
            attempts = MAX_SAVE_ATTEMPTS,
            "brewing log could not be saved"
        );
        false
    }

    pub fn finish_log(&self) -> Result<BrewingLog> {
        let log = self.take_log()?;
        self.persist(&log);
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brew_traits::MonotonicClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyStorage {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl LogStorage for FlakyStorage {
        fn save(&self, _log: &BrewingLog) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err("disk full".into());
            }
            Ok(())
        }
    }

    fn logger_with(failures: u32) -> (BrewingLogger, Arc<FlakyStorage>) {
        let storage = Arc::new(FlakyStorage {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        });
        let logger = BrewingLogger::new(storage.clone(), Arc::new(MonotonicClock::new()));
        (logger, storage)
    }

    #[test]
    fn log_without_active_log_is_process_not_found() {
        let (logger, _) = logger_with(0);
        assert_eq!(logger.log(MessageKind::BrewingComplete), Err(BrewError::ProcessNotFound));
        assert_eq!(logger.finish_log().map(|_| ()), Err(BrewError::ProcessNotFound));
    }

    #[test]
    fn save_is_retried_until_it_succeeds() {
        let (logger, storage) = logger_with(3);
        logger.start_log(7, Recipe::default());
        logger.log(MessageKind::BrewingComplete).unwrap();
        let log = logger.finish_log().unwrap();
        assert_eq!(log.id, 7);
        assert_eq!(log.messages.len(), 1);
        assert_eq!(storage.calls.load(Ordering::SeqCst), 4);
        assert!(!logger.is_active());
    }

    #[test]
    fn save_gives_up_after_five_attempts() {
        let (logger, storage) = logger_with(100);
        logger.start_log(1, Recipe::default());
        let log = logger.take_log().unwrap();
        assert!(!logger.persist(&log));
        assert_eq!(storage.calls.load(Ordering::SeqCst), MAX_SAVE_ATTEMPTS);
    }

    #[test]
    fn entries_carry_wall_time() {
        let clock = brew_traits::ManualClock::starting_at(5_000);
        let logger = BrewingLogger::new(Arc::new(MemoryLogStorage::default()), Arc::new(clock.clone()));
        logger.start_log(2, Recipe::default());
        clock.advance(std::time::Duration::from_millis(40));
        logger.log(MessageKind::BrewingComplete).unwrap();
        let log = logger.take_log().unwrap();
        assert_eq!(log.messages[0].time_ms, 5_040);
    }

    #[test]
    fn file_storage_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileLogStorage::new(dir.path());
        let logger = BrewingLogger::new(Arc::new(storage.clone()), Arc::new(MonotonicClock::new()));
        logger.start_log(3, Recipe::default());
        logger.log(MessageKind::BrewingComplete).unwrap();
        logger.finish_log().unwrap();
        let text = std::fs::read_to_string(storage.path_for(3)).unwrap();
        let back: BrewingLog = serde_json::from_str(&text).unwrap();
        assert_eq!(back.id, 3);
        assert_eq!(back.messages[0].kind, MessageKind::BrewingComplete);
    }
}
