//! Telemetry source abstraction
//!
//! The engine never performs I/O itself; a [`TelemetrySource`] hands it the probe
//! records of one observation window before each evaluation.

pub mod error;
pub mod mock;

pub use error::{TelemetryError, TelemetryResult};
pub use mock::MockTelemetrySource;

use crate::processing::telemetry::ProbeRecord;

pub trait TelemetrySource {
    /// Probe records whose sighting interval overlaps `[start_ms, end_ms]`
    fn fetch(&mut self, start_ms: u64, end_ms: u64) -> TelemetryResult<Vec<ProbeRecord>>;

    /// Check if the source is reachable
    fn is_connected(&self) -> bool;
}

/// Validate a requested window before fetching it
pub fn check_window(start_ms: u64, end_ms: u64) -> TelemetryResult<()> {
    if start_ms > end_ms {
        return Err(TelemetryError::InvalidWindow { start_ms, end_ms });
    }
    Ok(())
}
