pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Error type carried across the hardware seam.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A temperature probe.
pub trait Thermometer {
    /// Read the current temperature in degrees Celsius.
    fn read_celsius(&mut self) -> HwResult<f32>;
}

/// A switched load such as the heater or the stirrer motor.
pub trait Actuator {
    fn switch_on(&mut self) -> HwResult<()>;
    fn switch_off(&mut self) -> HwResult<()>;
    fn is_on(&self) -> bool;
}

/// Acoustic signal device.
pub trait Beeper {
    fn single_beep(&mut self) -> HwResult<()>;
    fn double_beep(&mut self) -> HwResult<()>;
    /// Silence the device; later beeps are ignored until re-enabled.
    fn switch_off(&mut self) -> HwResult<()>;
}

impl<T: Thermometer + ?Sized> Thermometer for Box<T> {
    fn read_celsius(&mut self) -> HwResult<f32> {
        (**self).read_celsius()
    }
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn switch_on(&mut self) -> HwResult<()> {
        (**self).switch_on()
    }
    fn switch_off(&mut self) -> HwResult<()> {
        (**self).switch_off()
    }
    fn is_on(&self) -> bool {
        (**self).is_on()
    }
}

impl<T: Beeper + ?Sized> Beeper for Box<T> {
    fn single_beep(&mut self) -> HwResult<()> {
        (**self).single_beep()
    }
    fn double_beep(&mut self) -> HwResult<()> {
        (**self).double_beep()
    }
    fn switch_off(&mut self) -> HwResult<()> {
        (**self).switch_off()
    }
}
