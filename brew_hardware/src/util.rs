use std::time::Duration;

use crate::error::{HwError, Result};

/// Run `read` until it succeeds or `attempts` transient failures were seen.
///
/// Only CRC mismatches count as transient; every other error is returned at once.
/// Sleeps `backoff` between attempts.
pub fn retry_transient<T>(
    attempts: u32,
    backoff: Duration,
    mut read: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut seen = 0u32;
    loop {
        match read() {
            Ok(v) => return Ok(v),
            Err(HwError::Crc) if seen + 1 < attempts.max(1) => {
                seen += 1;
                tracing::warn!(retries = seen, "sensor crc mismatch, retrying");
                if !backoff.is_zero() {
                    std::thread::sleep(backoff);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_crc_then_succeeds() {
        let mut calls = 0;
        let v = retry_transient(3, Duration::ZERO, || {
            calls += 1;
            if calls < 3 { Err(HwError::Crc) } else { Ok(42) }
        })
        .unwrap();
        assert_eq!(v, 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn gives_up_after_attempts() {
        let mut calls = 0;
        let err = retry_transient(2, Duration::ZERO, || -> Result<()> {
            calls += 1;
            Err(HwError::Crc)
        })
        .unwrap_err();
        assert!(matches!(err, HwError::Crc));
        assert_eq!(calls, 2);
    }

    #[test]
    fn non_transient_errors_are_not_retried() {
        let mut calls = 0;
        let err = retry_transient(5, Duration::ZERO, || -> Result<()> {
            calls += 1;
            Err(HwError::SensorMissing("28-000".into()))
        })
        .unwrap_err();
        assert!(matches!(err, HwError::SensorMissing(_)));
        assert_eq!(calls, 1);
    }
}
