//! DS18B20-style 1-Wire probe read through the Linux `w1_slave` sysfs file.
use std::path::{Path, PathBuf};
use std::time::Duration;

use brew_traits::{HwResult, Thermometer};

use crate::error::{HwError, Result};
use crate::util::retry_transient;

const DEVICES_DIR: &str = "/sys/bus/w1/devices";

#[derive(Debug, Clone)]
pub struct W1Thermometer {
    path: PathBuf,
    attempts: u32,
}

impl W1Thermometer {
    /// Probe with the given 1-Wire id (e.g. `28-0316a2798aff`).
    pub fn from_id(id: &str) -> Self {
        Self::from_path(Path::new(DEVICES_DIR).join(id).join("w1_slave"))
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            attempts: 3,
        }
    }

    /// First `28-*` device found on the bus.
    pub fn discover() -> Result<Self> {
        let entries = std::fs::read_dir(DEVICES_DIR)?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("28-") {
                tracing::info!(device = %name, "found 1-wire thermometer");
                return Ok(Self::from_id(&name));
            }
        }
        Err(HwError::SensorMissing(DEVICES_DIR.into()))
    }

    fn read_once(&self) -> Result<f32> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                HwError::SensorMissing(self.path.display().to_string())
            }
            _ => HwError::Io(e),
        })?;
        parse_w1_slave(&raw)
    }
}

impl Thermometer for W1Thermometer {
    fn read_celsius(&mut self) -> HwResult<f32> {
        let v = retry_transient(self.attempts, Duration::from_millis(50), || self.read_once())?;
        Ok(v)
    }
}

/// Parse the two-line `w1_slave` format:
///
/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
pub fn parse_w1_slave(raw: &str) -> Result<f32> {
    let mut lines = raw.lines();
    let status = lines
        .next()
        .ok_or_else(|| HwError::Parse("empty sensor output".into()))?;
    if !status.trim_end().ends_with("YES") {
        return Err(HwError::Crc);
    }
    let data = lines
        .next()
        .ok_or_else(|| HwError::Parse("missing temperature line".into()))?;
    let idx = data
        .find("t=")
        .ok_or_else(|| HwError::Parse(format!("no t= field in {data:?}")))?;
    let milli: i32 = data[idx + 2..]
        .trim()
        .parse()
        .map_err(|e| HwError::Parse(format!("bad temperature value: {e}")))?;
    Ok(milli as f32 / 1000.0)
}
