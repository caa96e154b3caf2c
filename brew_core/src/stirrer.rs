//! Stirrer motor wrapper. Hardware faults become `false` return values.
use std::sync::Mutex;

use brew_traits::Actuator;

use crate::error::describe_fault;

pub struct StirrerService {
    motor: Mutex<Box<dyn Actuator + Send>>,
}

impl std::fmt::Debug for StirrerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StirrerService")
            .field("running", &self.is_running())
            .finish()
    }
}

impl StirrerService {
    pub fn new(motor: Box<dyn Actuator + Send>) -> Self {
        Self {
            motor: Mutex::new(motor),
        }
    }

    /// Returns false if the motor could not be switched on.
    pub fn start(&self) -> bool {
        self.switch(true)
    }

    /// Returns false if the motor could not be switched off.
    pub fn stop(&self) -> bool {
        self.switch(false)
    }

    pub fn is_running(&self) -> bool {
        self.motor.lock().map(|m| m.is_on()).unwrap_or(false)
    }

    fn switch(&self, on: bool) -> bool {
        let Ok(mut motor) = self.motor.lock() else {
            tracing::error!("stirrer lock poisoned");
            return false;
        };
        let res = if on {
            motor.switch_on()
        } else {
            motor.switch_off()
        };
        match res {
            Ok(()) => {
                tracing::debug!(on, "stirrer switched");
                true
            }
            Err(e) => {
                tracing::warn!(on, error = %describe_fault(e.as_ref()), "stirrer switch failed");
                false
            }
        }
    }
}
