//! Accuracy measurement against reference-device ground truth

use crate::algorithms::path_loss::InterferenceModel;
use crate::core::constants::FEET_PER_METER;
use crate::core::device::Device;
use crate::core::types::MapPoint;
use crate::processing::sensor::SensorNode;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Position error of one reference device at one timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionError {
    pub device_id: String,
    pub timestamp_ms: u64,
    pub true_position: MapPoint,
    pub estimated_position: MapPoint,
    /// Estimated minus true position (pixels)
    pub error_vector: Vector2<f64>,
    pub error_m: f64,
    pub error_ft: f64,
}

/// Distance error of one sensor's estimate for one reference device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDistanceError {
    pub sensor_id: String,
    pub device_id: String,
    pub timestamp_ms: u64,
    pub estimated_m: f64,
    pub actual_m: f64,
    /// Signed error, `estimated_m - actual_m`
    pub error_m: f64,
}

/// Accuracy statistics over multiple measurements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyStatistics {
    /// Mean position error (meters)
    pub mean_error: f64,
    /// Standard deviation of position error (meters)
    pub std_dev_error: f64,
    /// 95th percentile error (meters)
    pub error_95_percentile: f64,
    /// Root Mean Square Error (meters)
    pub rmse: f64,
    pub max_error: f64,
    pub min_error: f64,
    pub sample_count: usize,
}

impl Default for AccuracyStatistics {
    fn default() -> Self {
        Self {
            mean_error: 0.0,
            std_dev_error: 0.0,
            error_95_percentile: 0.0,
            rmse: 0.0,
            max_error: 0.0,
            min_error: 0.0,
            sample_count: 0,
        }
    }
}

/// Rolling history of reference-device position errors
pub struct AccuracyValidator {
    pub position_error_history: VecDeque<PositionError>,
    max_history_size: usize,
    pixels_to_meters: f64,
}

impl AccuracyValidator {
    pub fn new(pixels_to_meters: f64) -> Self {
        Self::with_history(pixels_to_meters, 1000)
    }

    pub fn with_history(pixels_to_meters: f64, max_history_size: usize) -> Self {
        Self {
            position_error_history: VecDeque::new(),
            max_history_size,
            pixels_to_meters,
        }
    }

    /// Error between a device's estimate and its applicable ground truth, if both exist
    pub fn calculate_position_error(&self, device: &Device, timestamp_ms: u64) -> Option<PositionError> {
        let estimated_position = device.position_at(timestamp_ms)?;
        let true_position = device.expected_at(timestamp_ms)?.position;
        let error_vector = estimated_position - true_position;
        let error_m = error_vector.norm() * self.pixels_to_meters;

        Some(PositionError {
            device_id: device.id.clone(),
            timestamp_ms,
            true_position,
            estimated_position,
            error_vector,
            error_m,
            error_ft: error_m * FEET_PER_METER,
        })
    }

    /// One row per (sensor, reference device) pair the sensor hears and that has ground truth
    pub fn sensor_distance_errors(
        &self,
        sensors: &[SensorNode],
        devices: &[Device],
        timestamp_ms: u64,
        model: &InterferenceModel,
    ) -> Vec<SensorDistanceError> {
        let mut rows = Vec::new();
        for sensor in sensors {
            for device in devices.iter().filter(|d| d.is_reference) {
                let Some(expected) = device.expected_at(timestamp_ms) else {
                    continue;
                };
                let Some(estimate) = sensor.distance_estimate(&device.id, model) else {
                    continue;
                };
                let actual_m = sensor.actual_distance_m(&expected.position, self.pixels_to_meters);
                rows.push(SensorDistanceError {
                    sensor_id: sensor.id.clone(),
                    device_id: device.id.clone(),
                    timestamp_ms,
                    estimated_m: estimate.mean_distance_m,
                    actual_m,
                    error_m: estimate.mean_distance_m - actual_m,
                });
            }
        }
        rows
    }

    pub fn add_error_to_history(&mut self, error: PositionError) {
        self.position_error_history.push_back(error);
        while self.position_error_history.len() > self.max_history_size {
            self.position_error_history.pop_front();
        }
    }

    /// Record the position error of every reference device estimated at `timestamp_ms`
    pub fn record(&mut self, devices: &[Device], timestamp_ms: u64) -> Vec<PositionError> {
        let errors: Vec<PositionError> = devices
            .iter()
            .filter(|d| d.is_reference)
            .filter_map(|d| self.calculate_position_error(d, timestamp_ms))
            .collect();
        for error in &errors {
            self.add_error_to_history(error.clone());
        }
        errors
    }

    pub fn calculate_statistics(&self) -> AccuracyStatistics {
        let n = self.position_error_history.len();
        if n == 0 {
            return AccuracyStatistics::default();
        }

        let errors: Vec<f64> = self.position_error_history.iter().map(|e| e.error_m).collect();
        let mean_error = errors.iter().sum::<f64>() / n as f64;
        let rmse = (errors.iter().map(|e| e.powi(2)).sum::<f64>() / n as f64).sqrt();
        let variance = errors.iter().map(|e| (e - mean_error).powi(2)).sum::<f64>() / n as f64;

        let max_error = errors.iter().copied().fold(0.0, f64::max);
        let min_error = errors.iter().copied().fold(f64::INFINITY, f64::min);

        let mut sorted = errors;
        sorted.sort_by(|a, b| a.total_cmp(b));
        let index_95 = ((n as f64 * 0.95).ceil() as usize).saturating_sub(1);
        let error_95_percentile = sorted.get(index_95.min(n - 1)).copied().unwrap_or(0.0);

        AccuracyStatistics {
            mean_error,
            std_dev_error: variance.sqrt(),
            error_95_percentile,
            rmse,
            max_error,
            min_error,
            sample_count: n,
        }
    }

    /// Share of recorded errors below `threshold_m`
    pub fn within_rate(&self, threshold_m: f64) -> f64 {
        if self.position_error_history.is_empty() {
            return 0.0;
        }
        let within = self
            .position_error_history
            .iter()
            .filter(|e| e.error_m < threshold_m)
            .count();
        within as f64 / self.position_error_history.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExpectedInterval, PositionEstimate, Reading};
    use approx::assert_abs_diff_eq;

    fn reference_at(id: &str, truth: MapPoint, t: u64, estimate: MapPoint) -> Device {
        let mut device = Device::reference(id, vec![ExpectedInterval::always(truth)]);
        device.set_estimate(PositionEstimate {
            timestamp_ms: t,
            position: estimate,
            confidence_area: 1.0,
            within_any_zone: false,
        });
        device
    }

    #[test]
    fn test_position_error_in_meters_and_feet() {
        let validator = AccuracyValidator::new(0.1);
        let device = reference_at("r", MapPoint::new(0.0, 0.0), 5, MapPoint::new(6.0, 8.0));
        let error = validator.calculate_position_error(&device, 5).unwrap();

        assert_abs_diff_eq!(error.error_m, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(error.error_ft, 3.28084, epsilon = 1e-12);
        assert_eq!(error.error_vector, Vector2::new(6.0, 8.0));
        assert!(validator.calculate_position_error(&device, 6).is_none());
    }

    #[test]
    fn test_statistics_calculation() {
        let mut validator = AccuracyValidator::new(1.0);
        let devices = vec![
            reference_at("a", MapPoint::new(0.0, 0.0), 1, MapPoint::new(0.5, 0.0)),
            reference_at("b", MapPoint::new(0.0, 0.0), 1, MapPoint::new(0.0, 1.0)),
            reference_at("c", MapPoint::new(0.0, 0.0), 1, MapPoint::new(1.5, 0.0)),
        ];
        assert_eq!(validator.record(&devices, 1).len(), 3);

        let stats = validator.calculate_statistics();
        assert_abs_diff_eq!(stats.mean_error, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.rmse, (3.5f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_eq!(stats.max_error, 1.5);
        assert_eq!(stats.min_error, 0.5);
        assert_eq!(stats.error_95_percentile, 1.5);
        assert_eq!(stats.sample_count, 3);
        assert_abs_diff_eq!(validator.within_rate(1.0), 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut validator = AccuracyValidator::with_history(1.0, 2);
        let device = reference_at("a", MapPoint::new(0.0, 0.0), 1, MapPoint::new(1.0, 0.0));
        for _ in 0..5 {
            validator.record(std::slice::from_ref(&device), 1);
        }
        assert_eq!(validator.position_error_history.len(), 2);
    }

    #[test]
    fn test_sensor_distance_error_rows() {
        let validator = AccuracyValidator::new(0.1);
        let mut sensor = SensorNode::new("s1", MapPoint::new(0.0, 0.0));
        sensor.set_readings(vec![Reading::new("r", -40.0, 0), Reading::new("x", -40.0, 0)]);
        let reference = Device::reference("r", vec![ExpectedInterval::always(MapPoint::new(30.0, 40.0))]);
        let stranger = Device::new("x");

        let rows = validator.sensor_distance_errors(&[sensor], &[reference, stranger], 0, &InterferenceModel::default());
        assert_eq!(rows.len(), 1);
        assert_abs_diff_eq!(rows[0].actual_m, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[0].error_m, 3.9083059409359 - 5.0, epsilon = 1e-9);
    }
}
