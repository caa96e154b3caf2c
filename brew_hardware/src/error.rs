use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("sensor not found: {0}")]
    SensorMissing(String),
    #[error("sensor crc check failed")]
    Crc,
    #[error("malformed sensor output: {0}")]
    Parse(String),
    #[error("injected fault: {0}")]
    Injected(&'static str),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
