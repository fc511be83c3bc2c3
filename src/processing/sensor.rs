//! Fixed sensors and their reading store

use crate::algorithms::path_loss::{InterferenceModel, PathLossParams};
use crate::core::constants::SIGNAL_GRID_SPACING_PX;
use crate::core::types::{DistanceEstimate, MapPoint, Reading};
use crate::validation::error::{LocalizationError, LocalizationResult};
use nalgebra::distance;
use serde::{Deserialize, Serialize};

/// A fixed receiver at a known map position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorNode {
    pub id: String,
    /// Telemetry identifier of the access point backing this sensor
    pub access_point_id: Option<u32>,
    pub position: MapPoint,
    pub params: PathLossParams,
    pub active: bool,
    /// Readings for the current observation window
    readings: Vec<Reading>,
}

/// Predicted received power at one point of the debug grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSample {
    pub position: MapPoint,
    pub prx_dbm: f64,
}

impl SensorNode {
    pub fn new(id: impl Into<String>, position: MapPoint) -> Self {
        Self {
            id: id.into(),
            access_point_id: None,
            position,
            params: PathLossParams::default(),
            active: true,
            readings: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: PathLossParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_access_point(mut self, access_point_id: u32) -> Self {
        self.access_point_id = Some(access_point_id);
        self
    }

    /// Replace the observation window
    pub fn set_readings(&mut self, readings: Vec<Reading>) {
        self.readings = readings;
    }

    pub fn clear_readings(&mut self) {
        self.readings.clear();
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn readings_for<'a>(&'a self, device_id: &'a str) -> impl Iterator<Item = &'a Reading> + 'a {
        self.readings
            .iter()
            .filter(move |r| r.device_id.eq_ignore_ascii_case(device_id))
    }

    pub fn has_readings_for(&self, device_id: &str) -> bool {
        self.readings_for(device_id).next().is_some()
    }

    /// Distinct device identifiers in first-seen order
    pub fn seen_devices(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for reading in &self.readings {
            if !seen.iter().any(|id| id == &reading.device_id) {
                seen.push(reading.device_id.clone());
            }
        }
        seen
    }

    /// Aggregate distance estimate of a device using this sensor's current calibration
    pub fn distance_estimate(&self, device_id: &str, model: &InterferenceModel) -> Option<DistanceEstimate> {
        self.distance_estimate_with(&self.params, device_id, model)
    }

    /// Distance estimate under an alternative calibration, leaving the sensor untouched
    pub fn distance_estimate_with(
        &self,
        params: &PathLossParams,
        device_id: &str,
        model: &InterferenceModel,
    ) -> Option<DistanceEstimate> {
        let signals: Vec<f64> = self.readings_for(device_id).map(|r| r.signal_dbm).collect();
        if signals.is_empty() {
            return None;
        }

        let distances: Vec<f64> = signals
            .iter()
            .map(|&prx| params.distance_from_power(prx, model.interference_exponent(prx)))
            .collect();

        Some(DistanceEstimate {
            mean_distance_m: mean(&distances),
            stddev_distance_m: population_stddev(&distances),
            mean_signal_dbm: mean(&signals),
            sample_count: signals.len(),
        })
    }

    /// Checked variant of [`SensorNode::distance_estimate`]
    pub fn try_distance_estimate(&self, device_id: &str, model: &InterferenceModel) -> LocalizationResult<DistanceEstimate> {
        self.params.validate()?;
        self.distance_estimate(device_id, model)
            .ok_or_else(|| LocalizationError::MissingData {
                sensor_id: self.id.clone(),
                device_id: device_id.to_string(),
            })
    }

    /// Straight-line distance in meters from the sensor to a map point
    pub fn actual_distance_m(&self, point: &MapPoint, pixels_to_meters: f64) -> f64 {
        distance(&self.position, point) * pixels_to_meters
    }

    /// Received power this sensor should observe from a device `distance_m` away
    pub fn predicted_signal_at(&self, distance_m: f64, model: &InterferenceModel) -> Option<f64> {
        model.predicted_power(&self.params, distance_m)
    }

    /// Predicted received power sampled every `spacing` pixels over the map
    pub fn signal_grid(
        &self,
        width: f64,
        height: f64,
        spacing: Option<f64>,
        pixels_to_meters: f64,
        model: &InterferenceModel,
    ) -> Vec<SignalSample> {
        let spacing = spacing.unwrap_or(SIGNAL_GRID_SPACING_PX);
        if !(spacing > 0.0) {
            return Vec::new();
        }

        let mut samples = Vec::new();
        let mut x = 0.0;
        while x < width {
            let mut y = 0.0;
            while y < height {
                let position = MapPoint::new(x, y);
                let d = self.actual_distance_m(&position, pixels_to_meters);
                if let Some(prx_dbm) = self.predicted_signal_at(d, model) {
                    samples.push(SignalSample { position, prx_dbm });
                }
                y += spacing;
            }
            x += spacing;
        }
        samples
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_stddev(values: &[f64]) -> f64 {
    let m = mean(values);
    let squared: Vec<f64> = values.iter().map(|v| (v - m).powi(2)).collect();
    mean(&squared).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sensor_with(readings: &[(&str, f64)]) -> SensorNode {
        let mut sensor = SensorNode::new("s1", MapPoint::new(0.0, 0.0));
        sensor.set_readings(
            readings
                .iter()
                .enumerate()
                .map(|(i, (id, dbm))| Reading::new(*id, *dbm, i as u64))
                .collect(),
        );
        sensor
    }

    #[test]
    fn test_no_readings_yields_none() {
        let sensor = sensor_with(&[("aa:aa:aa:aa:aa:aa", -50.0)]);
        let model = InterferenceModel::default();
        assert!(sensor.distance_estimate("bb:bb:bb:bb:bb:bb", &model).is_none());
        assert!(matches!(
            sensor.try_distance_estimate("bb:bb:bb:bb:bb:bb", &model),
            Err(LocalizationError::MissingData { .. })
        ));
    }

    #[test]
    fn test_single_reading_has_zero_stddev() {
        let sensor = sensor_with(&[("aa:aa:aa:aa:aa:aa", -40.0)]);
        let model = InterferenceModel::default();
        let estimate = sensor.distance_estimate("AA:AA:AA:AA:AA:AA", &model).unwrap();

        assert_eq!(estimate.sample_count, 1);
        assert_eq!(estimate.stddev_distance_m, 0.0);
        assert_eq!(estimate.mean_signal_dbm, -40.0);
        assert_abs_diff_eq!(estimate.mean_distance_m, 3.9083059409359, epsilon = 1e-9);
    }

    #[test]
    fn test_each_reading_uses_its_own_exponent() {
        let sensor = sensor_with(&[("d", -30.0), ("d", -60.0)]);
        let model = InterferenceModel::default();
        let params = PathLossParams::default();

        let near = params.distance_from_power(-30.0, 8.0);
        let far = params.distance_from_power(-60.0, 3.5);
        let estimate = sensor.distance_estimate("d", &model).unwrap();

        assert_abs_diff_eq!(estimate.mean_distance_m, (near + far) / 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(estimate.stddev_distance_m, (far - near).abs() / 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(estimate.mean_signal_dbm, -45.0, epsilon = 1e-12);
        assert_eq!(estimate.sample_count, 2);
    }

    #[test]
    fn test_alternate_calibration_leaves_sensor_untouched() {
        let sensor = sensor_with(&[("d", -50.0)]);
        let model = InterferenceModel::default();
        let shifted = sensor.params.with_xa(10.0);

        let base = sensor.distance_estimate("d", &model).unwrap();
        let alt = sensor.distance_estimate_with(&shifted, "d", &model).unwrap();

        assert!(alt.mean_distance_m < base.mean_distance_m);
        assert_eq!(sensor.params.xa, -5.0);
    }

    #[test]
    fn test_set_readings_replaces_window() {
        let mut sensor = sensor_with(&[("a", -50.0), ("b", -60.0), ("a", -55.0)]);
        assert_eq!(sensor.seen_devices(), vec!["a".to_string(), "b".to_string()]);

        sensor.set_readings(vec![Reading::new("c", -70.0, 0)]);
        assert!(!sensor.has_readings_for("a"));
        assert!(sensor.has_readings_for("c"));
        assert_eq!(sensor.readings().len(), 1);
    }

    #[test]
    fn test_signal_grid_sampling() {
        let sensor = SensorNode::new("s1", MapPoint::new(25.0, 25.0));
        let model = InterferenceModel::default();
        let grid = sensor.signal_grid(100.0, 100.0, None, 0.1, &model);

        assert_eq!(grid.len(), 4);
        assert_eq!(grid[0].position, MapPoint::new(0.0, 0.0));
        assert!(grid.iter().all(|s| s.prx_dbm.is_finite()));
    }
}
