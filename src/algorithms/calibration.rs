//! Calibration tuner for the per-sensor bias term Xa.
//!
//! Brute-force 1-D scan over `[-range, +range)` minimizing the total absolute
//! distance error of every visible device against its ground truth.

use crate::algorithms::path_loss::{InterferenceModel, PathLossParams};
use crate::core::constants::{XA_SCAN_RANGE_DB, XA_SCAN_STEP_DB};
use crate::core::device::Device;
use crate::core::types::{MapPoint, TuningMode};
use crate::processing::sensor::SensorNode;
use crate::validation::error::{LocalizationError, LocalizationResult};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Extent and resolution of the Xa scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    /// Half-width of the scan interval (dB)
    pub range: f64,
    /// Candidate spacing (dB)
    pub step: f64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            range: XA_SCAN_RANGE_DB,
            step: XA_SCAN_STEP_DB,
        }
    }
}

impl TunerConfig {
    pub fn candidate_count(&self) -> usize {
        if !(self.step > 0.0) || !(self.range > 0.0) {
            return 0;
        }
        (2.0 * self.range / self.step + 1e-9).floor() as usize
    }

    /// Candidates in ascending order
    pub fn candidates(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.candidate_count()).map(move |i| -self.range + self.step * i as f64)
    }
}

/// A device the sensor hears together with where it actually is
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTarget {
    pub device_id: String,
    pub ground_truth: MapPoint,
}

/// Result of one committed tuning pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningOutcome {
    pub sensor_id: String,
    pub previous_xa: f64,
    pub xa: f64,
    /// Total absolute distance error at `xa` over the devices used (meters)
    pub total_error_m: f64,
    pub devices_used: Vec<String>,
    /// Devices discarded by outlier rejection
    pub dropped: Vec<String>,
}

pub struct BiasTuner<'a> {
    model: &'a InterferenceModel,
    config: TunerConfig,
    pixels_to_meters: f64,
}

impl<'a> BiasTuner<'a> {
    pub fn new(model: &'a InterferenceModel, config: TunerConfig, pixels_to_meters: f64) -> Self {
        Self {
            model,
            config,
            pixels_to_meters,
        }
    }

    /// Devices with readings on `sensor` and a ground truth under `mode` at `time_ms`
    pub fn visible_targets(
        &self,
        sensor: &SensorNode,
        devices: &[Device],
        time_ms: u64,
        mode: TuningMode,
    ) -> Vec<CalibrationTarget> {
        devices
            .iter()
            .filter(|d| !d.is_hidden)
            .filter(|d| sensor.has_readings_for(&d.id))
            .filter_map(|d| {
                d.ground_truth(time_ms, mode).map(|ground_truth| CalibrationTarget {
                    device_id: d.id.clone(),
                    ground_truth,
                })
            })
            .collect()
    }

    /// Absolute distance error per target under `params`
    pub fn device_errors(
        &self,
        sensor: &SensorNode,
        params: &PathLossParams,
        targets: &[CalibrationTarget],
    ) -> Vec<f64> {
        targets
            .iter()
            .map(|target| {
                let actual = sensor.actual_distance_m(&target.ground_truth, self.pixels_to_meters);
                sensor
                    .distance_estimate_with(params, &target.device_id, self.model)
                    .map_or(0.0, |e| (e.mean_distance_m - actual).abs())
            })
            .collect()
    }

    pub fn total_error(&self, sensor: &SensorNode, params: &PathLossParams, targets: &[CalibrationTarget]) -> f64 {
        self.device_errors(sensor, params, targets).iter().sum()
    }

    /// Candidate with the smallest finite total error; the first candidate wins ties.
    ///
    /// Returns `None` when no candidate yields a finite error.
    pub fn scan(&self, sensor: &SensorNode, targets: &[CalibrationTarget]) -> Option<(f64, f64)> {
        let mut best: Option<(f64, f64)> = None;
        for xa in self.config.candidates() {
            let error = self.total_error(sensor, &sensor.params.with_xa(xa), targets);
            if !error.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, e)| error < e) {
                best = Some((xa, error));
            }
        }
        best
    }

    /// Tune the sensor's Xa and commit it, or explain why nothing was done
    pub fn try_tune(
        &self,
        sensor: &mut SensorNode,
        devices: &[Device],
        time_ms: u64,
        mode: TuningMode,
        drop_worst: bool,
    ) -> LocalizationResult<TuningOutcome> {
        sensor.params.validate()?;
        if !(self.config.step > 0.0) {
            return Err(LocalizationError::InvalidParameter {
                parameter: "tuner.step".to_string(),
                value: self.config.step.to_string(),
            });
        }

        let mut targets = self.visible_targets(sensor, devices, time_ms, mode);
        if targets.is_empty() {
            return Err(LocalizationError::InvalidParameter {
                parameter: "visible_devices".to_string(),
                value: "0".to_string(),
            });
        }

        let (mut xa, mut total_error_m) = self.scan(sensor, &targets).ok_or_else(|| {
            LocalizationError::InvalidParameter {
                parameter: "xa_candidates".to_string(),
                value: format!("{} candidates, none with a finite error", self.config.candidate_count()),
            }
        })?;

        let mut dropped = Vec::new();
        if drop_worst {
            let errors = self.device_errors(sensor, &sensor.params.with_xa(xa), &targets);
            let mean = errors.iter().sum::<f64>() / errors.len() as f64;
            let (kept, rejected): (Vec<_>, Vec<_>) = targets
                .iter()
                .cloned()
                .zip(errors)
                .partition(|(_, error)| *error <= 2.0 * mean);

            if !rejected.is_empty() && kept.len() >= 2 {
                let kept: Vec<CalibrationTarget> = kept.into_iter().map(|(t, _)| t).collect();
                if let Some((refined_xa, refined_error)) = self.scan(sensor, &kept) {
                    dropped = rejected.into_iter().map(|(t, _)| t.device_id).collect();
                    debug!("sensor {}: dropped outliers {:?}", sensor.id, dropped);
                    xa = refined_xa;
                    total_error_m = refined_error;
                    targets = kept;
                }
            }
        }

        let previous_xa = sensor.params.xa;
        sensor.params.xa = xa;
        info!(
            "sensor {}: Xa {:.2} -> {:.2} over {} devices (error {:.3} m)",
            sensor.id,
            previous_xa,
            xa,
            targets.len(),
            total_error_m
        );

        Ok(TuningOutcome {
            sensor_id: sensor.id.clone(),
            previous_xa,
            xa,
            total_error_m,
            devices_used: targets.into_iter().map(|t| t.device_id).collect(),
            dropped,
        })
    }

    /// Tune and return the sensor's Xa; conditions that prevent tuning leave it unchanged
    pub fn tune(
        &self,
        sensor: &mut SensorNode,
        devices: &[Device],
        time_ms: u64,
        mode: TuningMode,
        drop_worst: bool,
    ) -> f64 {
        match self.try_tune(sensor, devices, time_ms, mode, drop_worst) {
            Ok(outcome) => outcome.xa,
            Err(e) => {
                warn!("sensor {}: bias not tuned: {}", sensor.id, e);
                sensor.params.xa
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExpectedInterval, Reading};
    use approx::assert_abs_diff_eq;

    const P2M: f64 = 0.1;

    /// Readings a sensor at the origin would see from devices at the given map points
    /// under calibration `truth`. Points are chosen so every reading lands in the
    /// (-49, -40] dBm band, where the forward table gives n = 5.
    fn calibrated_sensor(truth: &PathLossParams, devices: &[(&str, MapPoint)]) -> SensorNode {
        let mut sensor = SensorNode::new("s1", MapPoint::new(0.0, 0.0));
        let readings = devices
            .iter()
            .map(|(id, point)| {
                let d = sensor.actual_distance_m(point, P2M);
                Reading::new(*id, truth.power_from_distance(d, 5.0), 0)
            })
            .collect();
        sensor.set_readings(readings);
        sensor
    }

    fn reference(id: &str, point: MapPoint) -> Device {
        Device::reference(id, vec![ExpectedInterval::always(point)])
    }

    #[test]
    fn test_candidate_grid() {
        let config = TunerConfig::default();
        assert_eq!(config.candidate_count(), 4000);
        let candidates: Vec<f64> = config.candidates().collect();
        assert_eq!(candidates[0], -100.0);
        assert_abs_diff_eq!(candidates[3999], 99.95, epsilon = 1e-9);
    }

    #[test]
    fn test_no_visible_devices_is_noop() {
        let model = InterferenceModel::default();
        let tuner = BiasTuner::new(&model, TunerConfig::default(), P2M);
        let mut sensor = SensorNode::new("s1", MapPoint::new(0.0, 0.0));
        let devices = vec![reference("aa", MapPoint::new(30.0, 0.0))];

        let xa = tuner.tune(&mut sensor, &devices, 0, TuningMode::Automatic, false);
        assert_eq!(xa, -5.0);
        assert_eq!(sensor.params.xa, -5.0);
        assert!(tuner
            .try_tune(&mut sensor, &devices, 0, TuningMode::Automatic, false)
            .is_err());
    }

    #[test]
    fn test_invalid_wavelength_is_noop() {
        let model = InterferenceModel::default();
        let tuner = BiasTuner::new(&model, TunerConfig::default(), P2M);
        let truth = PathLossParams::default();
        let mut sensor = calibrated_sensor(&truth, &[("aa", MapPoint::new(30.0, 0.0))]);
        sensor.params.wavelength = 0.0;
        let devices = vec![reference("aa", MapPoint::new(30.0, 0.0))];

        assert_eq!(tuner.tune(&mut sensor, &devices, 0, TuningMode::Automatic, false), -5.0);
    }

    #[test]
    fn test_recovers_known_bias() {
        let model = InterferenceModel::default();
        let tuner = BiasTuner::new(&model, TunerConfig::default(), P2M);
        let truth = PathLossParams::default().with_xa(4.0);
        let points = [("aa", MapPoint::new(30.0, 0.0)), ("bb", MapPoint::new(0.0, 35.0))];
        let mut sensor = calibrated_sensor(&truth, &points);
        let devices: Vec<Device> = points.iter().map(|(id, p)| reference(id, *p)).collect();

        let outcome = tuner
            .try_tune(&mut sensor, &devices, 0, TuningMode::Automatic, false)
            .unwrap();
        assert_abs_diff_eq!(outcome.xa, 4.0, epsilon = 1e-6);
        assert_abs_diff_eq!(sensor.params.xa, 4.0, epsilon = 1e-6);
        assert_eq!(outcome.previous_xa, -5.0);
        assert_eq!(outcome.devices_used.len(), 2);
    }

    #[test]
    fn test_manual_mode_uses_calibration_point() {
        let model = InterferenceModel::default();
        let tuner = BiasTuner::new(&model, TunerConfig::default(), P2M);
        let truth = PathLossParams::default().with_xa(0.0);
        let mut sensor = calibrated_sensor(&truth, &[("cc", MapPoint::new(0.0, 40.0))]);

        let mut device = Device::new("cc");
        assert_eq!(tuner.tune(&mut sensor, &[device.clone()], 0, TuningMode::Manual, false), -5.0);

        device.calibration_point = Some(MapPoint::new(0.0, 40.0));
        let xa = tuner.tune(&mut sensor, &[device], 0, TuningMode::Manual, false);
        assert_abs_diff_eq!(xa, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_hidden_devices_are_not_visible() {
        let model = InterferenceModel::default();
        let tuner = BiasTuner::new(&model, TunerConfig::default(), P2M);
        let truth = PathLossParams::default();
        let sensor = calibrated_sensor(&truth, &[("aa", MapPoint::new(30.0, 0.0))]);
        let mut device = reference("aa", MapPoint::new(30.0, 0.0));
        device.is_hidden = true;

        assert!(tuner
            .visible_targets(&sensor, &[device], 0, TuningMode::Automatic)
            .is_empty());
    }

    #[test]
    fn test_drop_worst_discards_outlier() {
        let model = InterferenceModel::default();
        let tuner = BiasTuner::new(&model, TunerConfig::default(), P2M);
        let truth = PathLossParams::default().with_xa(2.0);
        let points = [
            ("aa", MapPoint::new(30.0, 0.0)),
            ("bb", MapPoint::new(0.0, 35.0)),
            ("cc", MapPoint::new(40.0, 0.0)),
        ];
        let mut sensor = calibrated_sensor(&truth, &points);
        // "dd" is heard as if 3 m away but placed 30 m away
        let mut readings = sensor.readings().to_vec();
        readings.push(Reading::new("dd", truth.power_from_distance(3.0, 5.0), 0));
        sensor.set_readings(readings);

        let mut devices: Vec<Device> = points.iter().map(|(id, p)| reference(id, *p)).collect();
        devices.push(reference("dd", MapPoint::new(300.0, 0.0)));

        let outcome = tuner
            .try_tune(&mut sensor, &devices, 0, TuningMode::Automatic, true)
            .unwrap();
        assert_eq!(outcome.dropped, vec!["dd".to_string()]);
        assert_eq!(outcome.devices_used.len(), 3);
        assert_abs_diff_eq!(outcome.xa, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_flat_error_keeps_first_candidate() {
        let model = InterferenceModel::default();
        let tuner = BiasTuner::new(&model, TunerConfig::default(), P2M);
        let sensor = calibrated_sensor(&PathLossParams::default(), &[("aa", MapPoint::new(30.0, 0.0))]);
        // no readings for "zz", so every candidate scores zero error
        let targets = vec![CalibrationTarget {
            device_id: "zz".to_string(),
            ground_truth: MapPoint::new(30.0, 0.0),
        }];

        assert_eq!(tuner.scan(&sensor, &targets), Some((-100.0, 0.0)));
    }

    #[test]
    fn test_non_finite_error_is_noop() {
        let model = InterferenceModel {
            multiplier: 0.0,
            ..InterferenceModel::default()
        };
        let tuner = BiasTuner::new(&model, TunerConfig::default(), P2M);
        let truth = PathLossParams::default();
        let points = [("aa", MapPoint::new(30.0, 0.0))];
        let mut sensor = calibrated_sensor(&truth, &points);
        let devices: Vec<Device> = points.iter().map(|(id, p)| reference(id, *p)).collect();

        let targets = tuner.visible_targets(&sensor, &devices, 0, TuningMode::Automatic);
        assert!(tuner.scan(&sensor, &targets).is_none());
        assert!(matches!(
            tuner.try_tune(&mut sensor, &devices, 0, TuningMode::Automatic, false),
            Err(LocalizationError::InvalidParameter { .. })
        ));
        assert_eq!(tuner.tune(&mut sensor, &devices, 0, TuningMode::Automatic, true), -5.0);
        assert_eq!(sensor.params.xa, -5.0);
    }

    #[test]
    fn test_other_sensors_untouched() {
        let model = InterferenceModel::default();
        let tuner = BiasTuner::new(&model, TunerConfig::default(), P2M);
        let truth = PathLossParams::default().with_xa(4.0);
        let points = [("aa", MapPoint::new(30.0, 0.0))];
        let mut tuned = calibrated_sensor(&truth, &points);
        let other = calibrated_sensor(&truth, &points);
        let devices: Vec<Device> = points.iter().map(|(id, p)| reference(id, *p)).collect();

        tuner.tune(&mut tuned, &devices, 0, TuningMode::Automatic, false);
        assert_eq!(other.params.xa, -5.0);
    }
}
