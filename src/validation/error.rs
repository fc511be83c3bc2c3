//! Error classification for the localization engine.
//!
//! None of these conditions is fatal: the public engine operations absorb them and
//! report absence of a result. The checked `try_*` variants surface them so a host
//! can tell why a result is missing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum LocalizationError {
    /// The sensor holds no readings for the device
    #[error("sensor {sensor_id} has no readings for device {device_id}")]
    MissingData { sensor_id: String, device_id: String },

    /// Too few active sensors detected the device to position it
    #[error("device {device_id} detected by {detected} active sensors, {required} required")]
    InsufficientSensors {
        device_id: String,
        detected: usize,
        required: usize,
    },

    /// A parameter is outside its valid domain
    #[error("invalid parameter {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    /// No active sensor reported a usable location fix for the device
    #[error("no location fix for device {device_id}")]
    MissingGeoLocation { device_id: String },

    /// Ground truth with only one coordinate set
    #[error("malformed ground truth for device {device_id}")]
    MalformedGroundTruth { device_id: String },
}

impl LocalizationError {
    /// Whether the condition is part of normal operation rather than a misconfiguration
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            LocalizationError::MissingData { .. }
                | LocalizationError::InsufficientSensors { .. }
                | LocalizationError::MissingGeoLocation { .. }
        )
    }
}

pub type LocalizationResult<T> = Result<T, LocalizationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routine_classification() {
        let missing = LocalizationError::MissingData {
            sensor_id: "s1".to_string(),
            device_id: "d1".to_string(),
        };
        let invalid = LocalizationError::InvalidParameter {
            parameter: "wavelength".to_string(),
            value: "0".to_string(),
        };
        assert!(missing.is_routine());
        assert!(!invalid.is_routine());
    }

    #[test]
    fn test_display() {
        let err = LocalizationError::InsufficientSensors {
            device_id: "aa:bb".to_string(),
            detected: 1,
            required: 2,
        };
        assert_eq!(err.to_string(), "device aa:bb detected by 1 active sensors, 2 required");
    }
}
