//! Operator-facing notification seams.
use std::sync::Mutex;

use brew_traits::Beeper;

use crate::config::NotifierCfg;
use crate::message::Message;

/// Push transport towards the operator's client. Delivery is fire-and-forget:
/// implementations must not block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &Message);
    /// Urgent operator alarm, e.g. after a forced cancellation.
    fn alarm(&self, text: &str);
}

/// Notifier that only writes to the diagnostics log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &Message) {
        tracing::info!(priority = ?message.priority, kind = ?message.kind, "notify");
    }

    fn alarm(&self, text: &str) {
        tracing::warn!(text, "ALARM");
    }
}

/// Beeps on pre-notifications and confirmation requests, each gated by config.
pub struct AcousticNotifier {
    beeper: Mutex<Option<Box<dyn Beeper + Send>>>,
    cfg: NotifierCfg,
}

impl std::fmt::Debug for AcousticNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcousticNotifier").field("cfg", &self.cfg).finish()
    }
}

impl AcousticNotifier {
    pub fn new(beeper: Option<Box<dyn Beeper + Send>>, cfg: NotifierCfg) -> Self {
        Self {
            beeper: Mutex::new(beeper),
            cfg,
        }
    }

    pub fn silent() -> Self {
        Self::new(None, NotifierCfg::default())
    }

    fn with_beeper(&self, f: impl FnOnce(&mut dyn Beeper) -> brew_traits::HwResult<()>) {
        let Ok(mut guard) = self.beeper.lock() else {
            return;
        };
        if let Some(beeper) = guard.as_mut()
            && let Err(e) = f(beeper.as_mut())
        {
            tracing::warn!(error = %e, "beeper failed");
        }
    }

    pub fn prenotification(&self) {
        if self.cfg.beep_on_prenotification {
            self.with_beeper(|b| b.double_beep());
        }
    }

    pub fn confirmation_request(&self) {
        if self.cfg.beep_on_confirmation_request {
            self.with_beeper(|b| b.single_beep());
        }
    }

    pub fn switch_off(&self) {
        self.with_beeper(|b| b.switch_off());
    }
}
