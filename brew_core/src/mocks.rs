//! Test and helper mocks for brew_core

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use brew_traits::{HwResult, Thermometer};

use crate::message::Message;
use crate::notify::Notifier;

/// A thermometer that always errors on read and counts the attempts.
#[derive(Debug, Clone, Default)]
pub struct FailingThermometer {
    reads: Arc<AtomicU32>,
}

impl FailingThermometer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Thermometer for FailingThermometer {
    fn read_celsius(&mut self) -> HwResult<f32> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Err(Box::new(std::io::Error::other("no sensor")))
    }
}

/// Notifier that records everything it is handed. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<Message>>>,
    alarms: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn alarms(&self) -> Vec<String> {
        self.alarms.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &Message) {
        if let Ok(mut m) = self.messages.lock() {
            m.push(message.clone());
        }
    }

    fn alarm(&self, text: &str) {
        if let Ok(mut a) = self.alarms.lock() {
            a.push(text.to_owned());
        }
    }
}
