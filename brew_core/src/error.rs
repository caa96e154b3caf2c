use thiserror::Error;

/// Reasons a brewing process cannot be started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("a brewing process is already running")]
    AlreadyRunning,
    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),
    #[error("phase scheduler could not be started: {0}")]
    Scheduler(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrewError {
    #[error("no brewing process is running")]
    ProcessNotFound,
    #[error("invalid brewing step: {0}")]
    InvalidStep(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl BrewError {
    pub(crate) fn invalid_step(msg: impl Into<String>) -> Self {
        Self::InvalidStep(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BrewError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing thermometer")]
    MissingThermometer,
    #[error("missing heater")]
    MissingHeater,
    #[error("missing stirrer")]
    MissingStirrer,
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Render a boxed hardware error for status reporting.
pub(crate) fn describe_fault(e: &(dyn std::error::Error + Send + Sync + 'static)) -> String {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<brew_hardware::HwError>() {
            return match hw {
                brew_hardware::HwError::SensorMissing(_) => format!("sensor missing ({hw})"),
                other => other.to_string(),
            };
        }
    }
    e.to_string()
}
