//! Runtime configuration used by the core, decoupled from the TOML schema.
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureCfg {
    /// Hysteresis half-band around the target (°C).
    pub heatup_delta: f32,
    pub sample_interval: Duration,
    /// Consecutive failed reads that trigger the fail-safe shutdown.
    pub max_read_failures: u32,
    /// Lowest mash temperature a recipe may ask for.
    pub room_temperature: f32,
}

impl Default for TemperatureCfg {
    fn default() -> Self {
        Self {
            heatup_delta: 2.0,
            sample_interval: Duration::from_millis(1500),
            max_read_failures: 10,
            room_temperature: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingCfg {
    /// Lead time of ingredient pre-notifications.
    pub prenotify_lead: Duration,
    pub response_timeout: Duration,
    pub watchdog_poll: Duration,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            prenotify_lead: Duration::from_secs(5 * 60),
            response_timeout: Duration::from_secs(15 * 60),
            watchdog_poll: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HopCfg {
    pub temperature: f32,
    pub prenotify_delta: f32,
    /// Lead of the "ending shortly" notice.
    pub end_notice_lead: Duration,
    /// Lead of hop addition notices.
    pub prenotify_lead: Duration,
}

impl Default for HopCfg {
    fn default() -> Self {
        Self {
            temperature: 100.0,
            prenotify_delta: 5.0,
            end_notice_lead: Duration::from_secs(3 * 60),
            prenotify_lead: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureLogCfg {
    pub temperature_delta: f32,
    pub time_delta: Duration,
}

impl Default for TemperatureLogCfg {
    fn default() -> Self {
        Self {
            temperature_delta: 3.0,
            time_delta: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierCfg {
    pub beep_on_prenotification: bool,
    pub beep_on_confirmation_request: bool,
}

impl Default for NotifierCfg {
    fn default() -> Self {
        Self {
            beep_on_prenotification: true,
            beep_on_confirmation_request: true,
        }
    }
}

/// Everything the controller needs to know about timing and thresholds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrewCfg {
    pub temperature: TemperatureCfg,
    pub timing: TimingCfg,
    pub hop: HopCfg,
    pub temperature_log: TemperatureLogCfg,
    pub notifier: NotifierCfg,
}
