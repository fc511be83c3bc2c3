//! Telemetry error types

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryError {
    /// The source could not be reached
    #[error("telemetry source {source_id} unavailable")]
    ConnectionLost { source_id: String },
    /// Window start lies after its end
    #[error("invalid window {start_ms}..{end_ms}")]
    InvalidWindow { start_ms: u64, end_ms: u64 },
    /// A record could not be decoded
    #[error("invalid probe record: {details}")]
    InvalidRecord { details: String },
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
