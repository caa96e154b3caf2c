//! Raspberry Pi GPIO devices (relay board and piezo buzzer).
use std::thread::sleep;
use std::time::Duration;

use brew_traits::{Actuator, Beeper, HwResult};
use rppal::gpio::{Gpio, OutputPin};

use crate::error::{HwError, Result};

fn output_pin(pin: u8) -> Result<OutputPin> {
    let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
    let pin = gpio.get(pin).map_err(|e| HwError::Gpio(e.to_string()))?;
    Ok(pin.into_output())
}

/// One relay channel driving the heater or the stirrer.
pub struct GpioRelay {
    pin: OutputPin,
    active_low: bool,
    on: bool,
}

impl GpioRelay {
    pub fn new(pin: u8, active_low: bool) -> Result<Self> {
        let mut relay = Self {
            pin: output_pin(pin)?,
            active_low,
            on: false,
        };
        relay.drive(false);
        Ok(relay)
    }

    fn drive(&mut self, on: bool) {
        if on != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        self.on = on;
    }
}

impl Actuator for GpioRelay {
    fn switch_on(&mut self) -> HwResult<()> {
        self.drive(true);
        Ok(())
    }
    fn switch_off(&mut self) -> HwResult<()> {
        self.drive(false);
        Ok(())
    }
    fn is_on(&self) -> bool {
        self.on
    }
}

impl Drop for GpioRelay {
    fn drop(&mut self) {
        self.drive(false);
    }
}

/// Active buzzer on a single output pin.
pub struct GpioBuzzer {
    pin: OutputPin,
    muted: bool,
}

impl GpioBuzzer {
    pub fn new(pin: u8) -> Result<Self> {
        let mut pin = output_pin(pin)?;
        pin.set_low();
        Ok(Self { pin, muted: false })
    }

    fn pulse(&mut self, ms: u64) {
        self.pin.set_high();
        sleep(Duration::from_millis(ms));
        self.pin.set_low();
    }
}

impl Beeper for GpioBuzzer {
    fn single_beep(&mut self) -> HwResult<()> {
        if !self.muted {
            self.pulse(300);
        }
        Ok(())
    }
    fn double_beep(&mut self) -> HwResult<()> {
        if !self.muted {
            self.pulse(150);
            sleep(Duration::from_millis(100));
            self.pulse(150);
        }
        Ok(())
    }
    fn switch_off(&mut self) -> HwResult<()> {
        self.muted = true;
        self.pin.set_low();
        Ok(())
    }
}
