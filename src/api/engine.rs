//! Localization engine.
//!
//! Owns the sensors, zones and device registry of one site and exposes the public
//! operations: distance and position estimation, bias tuning, identity
//! consolidation and zone aggregation. Every operation runs to completion
//! synchronously; [`LocalizationEngine::evaluate`] is one independent, idempotent
//! per-timestamp pass, so a host can yield between timestamps.

use crate::algorithms::calibration::{BiasTuner, TuningOutcome};
use crate::algorithms::consolidation;
use crate::algorithms::geo::{self, GeoTransform, PositionSource};
use crate::algorithms::raster::{self, AccumulationGrid};
use crate::core::constants::DEFAULT_XA_DB;
use crate::core::device::Device;
use crate::core::types::{DistanceEstimate, PositionEstimate, TuningMode, ZoneHeadcount};
use crate::core::zone::Zone;
use crate::processing::sensor::{SensorNode, SignalSample};
use crate::processing::telemetry::{self, IngestFilter, ProbeRecord};
use crate::processing::zones;
use crate::telemetry::{TelemetryResult, TelemetrySource};
use crate::utils::config::SiteConfig;
use crate::validation::accuracy::{AccuracyStatistics, AccuracyValidator, PositionError, SensorDistanceError};
use crate::validation::error::{LocalizationError, LocalizationResult};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;

/// Outcome of one per-timestamp evaluation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSummary {
    pub timestamp_ms: u64,
    /// Devices that received an estimate
    pub positioned: usize,
    /// Devices left without an estimate at this timestamp
    pub unpositioned: usize,
    /// Occupants after consolidation
    pub occupants: usize,
    pub headcounts: Vec<ZoneHeadcount>,
}

impl PassSummary {
    pub fn total_headcount(&self) -> u32 {
        self.headcounts.iter().map(|h| h.headcount).sum()
    }
}

/// One step of a headcount scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadcountSample {
    pub timestamp_ms: u64,
    pub total_headcount: u32,
    pub zones: Vec<ZoneHeadcount>,
}

/// One step of an error scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorScanStep {
    pub timestamp_ms: u64,
    pub occupants: usize,
    pub position_errors: Vec<PositionError>,
    pub distance_errors: Vec<SensorDistanceError>,
    pub zones: Vec<ZoneHeadcount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorScanReport {
    pub steps: Vec<ErrorScanStep>,
    pub statistics: AccuracyStatistics,
}

pub struct LocalizationEngine {
    config: SiteConfig,
    sensors: Vec<SensorNode>,
    zones: Vec<Zone>,
    /// Reference devices from configuration plus every device discovered in telemetry
    devices: Vec<Device>,
    /// Post-consolidation occupants of the last pass
    occupants: Vec<Device>,
    filter: IngestFilter,
    position_source: PositionSource,
    geo_transform: Option<GeoTransform>,
}

impl LocalizationEngine {
    pub fn new(config: SiteConfig) -> Self {
        let sensors = config.build_sensors();
        let zones = config.build_zones();
        let devices = config.build_reference_devices();
        let filter = config.ingest_filter();
        let position_source = config.position_source;
        let geo_transform = config.build_geo_transform();
        info!(
            "site '{}': {} sensors, {} zones, {} reference devices",
            config.name,
            sensors.len(),
            zones.len(),
            devices.len()
        );
        Self {
            config,
            sensors,
            zones,
            devices,
            occupants: Vec::new(),
            filter,
            position_source,
            geo_transform,
        }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn pixels_to_meters(&self) -> f64 {
        self.config.pixels_to_meters()
    }

    pub fn sensors(&self) -> &[SensorNode] {
        &self.sensors
    }

    pub fn sensor(&self, sensor_id: &str) -> Option<&SensorNode> {
        self.sensors.iter().find(|s| s.id == sensor_id)
    }

    pub fn sensor_mut(&mut self, sensor_id: &str) -> Option<&mut SensorNode> {
        self.sensors.iter_mut().find(|s| s.id == sensor_id)
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id.eq_ignore_ascii_case(device_id))
    }

    pub fn device_mut(&mut self, device_id: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id.eq_ignore_ascii_case(device_id))
    }

    /// Add a device to the registry, replacing any device with the same id
    pub fn register_device(&mut self, device: Device) {
        match self.devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => *existing = device,
            None => self.devices.push(device),
        }
    }

    pub fn position_source(&self) -> PositionSource {
        self.position_source
    }

    pub fn set_position_source(&mut self, source: PositionSource) {
        self.position_source = source;
    }

    pub fn occupants(&self) -> &[Device] {
        &self.occupants
    }

    /// Empty accumulation buffer covering the map
    pub fn new_grid(&self) -> AccumulationGrid {
        AccumulationGrid::new(self.config.map_width as usize, self.config.map_height as usize)
    }

    /// Replace every sensor's readings with a new observation window and register
    /// devices seen by enough sensors. Returns the number of readings stored.
    pub fn load_window(&mut self, records: &[ProbeRecord]) -> usize {
        let stored = telemetry::route_records(&mut self.sensors, records, &self.filter);
        self.discover_devices();
        stored
    }

    fn discover_devices(&mut self) {
        let mut seen: Vec<String> = Vec::new();
        for sensor in self.sensors.iter().filter(|s| s.active) {
            for id in sensor.seen_devices() {
                if !seen.contains(&id) {
                    seen.push(id);
                }
            }
        }

        for id in seen {
            if self.device(&id).is_some() {
                continue;
            }
            let detections = self
                .sensors
                .iter()
                .filter(|s| s.active && s.has_readings_for(&id))
                .count();
            if detections < self.config.heatmap.min_sensors {
                continue;
            }

            let mut device = Device::new(id.as_str());
            device.is_randomized = telemetry::is_possibly_randomized(&id, &self.config.known_vendor_prefixes);
            debug!("discovered device {} (randomized: {})", device.id, device.is_randomized);
            self.devices.push(device);
        }
    }

    /// Distance estimate of a device on one sensor
    pub fn estimate_distance(&self, sensor_id: &str, device_id: &str) -> Option<DistanceEstimate> {
        self.sensor(sensor_id)?
            .distance_estimate(device_id, &self.config.interference)
    }

    /// Position of a device from the configured source, using `grid` as the heatmap buffer
    pub fn try_estimate_position_with(
        &self,
        grid: &mut AccumulationGrid,
        device_id: &str,
        timestamp_ms: u64,
    ) -> LocalizationResult<PositionEstimate> {
        match self.position_source {
            PositionSource::Heatmap => raster::try_estimate_position(
                &self.sensors,
                device_id,
                timestamp_ms,
                &self.zones,
                &self.config.interference,
                &self.config.heatmap,
                self.config.meters_to_pixels,
                grid,
            ),
            PositionSource::Geo => {
                let transform = self.geo_transform.as_ref().ok_or_else(|| LocalizationError::InvalidParameter {
                    parameter: "geo_transform".to_string(),
                    value: "none".to_string(),
                })?;
                geo::try_estimate_from_geo(&self.sensors, device_id, timestamp_ms, &self.zones, transform)
            }
        }
    }

    /// Position of a device, or `None` when the configured source cannot place it
    pub fn estimate_position(&self, device_id: &str, timestamp_ms: u64) -> Option<PositionEstimate> {
        let mut grid = self.new_grid();
        match self.try_estimate_position_with(&mut grid, device_id, timestamp_ms) {
            Ok(estimate) => Some(estimate),
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    /// Estimate a registered device and record the result on it. A failed estimate
    /// removes any estimate the device already held at `timestamp_ms`.
    pub fn update_position(&mut self, device_id: &str, timestamp_ms: u64) -> Option<PositionEstimate> {
        let estimate = self.estimate_position(device_id, timestamp_ms);
        let device = self.device_mut(device_id)?;
        match estimate {
            Some(estimate) => device.set_estimate(estimate),
            None => {
                device.remove_estimate(timestamp_ms);
            }
        }
        estimate
    }

    pub fn try_tune_bias(
        &mut self,
        sensor_id: &str,
        timestamp_ms: u64,
        mode: TuningMode,
        drop_worst: bool,
    ) -> LocalizationResult<TuningOutcome> {
        let tuner = BiasTuner::new(&self.config.interference, self.config.tuner, self.config.pixels_to_meters());
        let sensor = self
            .sensors
            .iter_mut()
            .find(|s| s.id == sensor_id)
            .ok_or_else(|| LocalizationError::InvalidParameter {
                parameter: "sensor_id".to_string(),
                value: sensor_id.to_string(),
            })?;
        tuner.try_tune(sensor, &self.devices, timestamp_ms, mode, drop_worst)
    }

    /// Tune one sensor's Xa against the registry's ground truth and return its new value.
    ///
    /// Returns `None` only for an unknown sensor; a sensor that cannot be tuned keeps
    /// its current Xa.
    pub fn tune_bias(&mut self, sensor_id: &str, timestamp_ms: u64, mode: TuningMode, drop_worst: bool) -> Option<f64> {
        match self.try_tune_bias(sensor_id, timestamp_ms, mode, drop_worst) {
            Ok(outcome) => Some(outcome.xa),
            Err(e) => {
                warn!("bias not tuned: {}", e);
                self.sensor(sensor_id).map(|s| s.params.xa)
            }
        }
    }

    /// Tune every active sensor in turn
    pub fn tune_all(&mut self, timestamp_ms: u64, mode: TuningMode, drop_worst: bool) -> Vec<TuningOutcome> {
        let ids: Vec<String> = self.sensors.iter().filter(|s| s.active).map(|s| s.id.clone()).collect();
        ids.iter()
            .filter_map(|id| match self.try_tune_bias(id, timestamp_ms, mode, drop_worst) {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!("bias not tuned: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Set every sensor's Xa
    pub fn reset_bias(&mut self, xa: Option<f64>) {
        let xa = xa.unwrap_or(DEFAULT_XA_DB);
        for sensor in &mut self.sensors {
            sensor.params.xa = xa;
        }
        info!("reset Xa of {} sensors to {}", self.sensors.len(), xa);
    }

    /// Consolidated occupants standing in for the randomized devices at `timestamp_ms`
    pub fn consolidate_identities(&self, timestamp_ms: u64) -> Vec<Device> {
        consolidation::consolidate_identities(
            &self.devices,
            timestamp_ms,
            self.config.pixels_to_meters(),
            self.config.consolidation_radius_m,
        )
    }

    /// Countable devices plus consolidated occupants, all estimated at `timestamp_ms`
    fn collect_occupants(&self, timestamp_ms: u64) -> Vec<Device> {
        let mut occupants: Vec<Device> = self
            .devices
            .iter()
            .filter(|d| d.is_countable() && !d.is_randomized && d.has_estimate(timestamp_ms))
            .cloned()
            .collect();
        occupants.extend(self.consolidate_identities(timestamp_ms));
        occupants
    }

    /// Recount the zones from the current occupants
    pub fn aggregate_zones(&mut self, timestamp_ms: u64) -> Vec<ZoneHeadcount> {
        zones::aggregate_zones(&mut self.zones, &self.occupants, timestamp_ms)
    }

    pub fn total_headcount(&self) -> u32 {
        zones::total_headcount(&self.zones)
    }

    /// Full pass at one timestamp over the currently loaded window: position every
    /// visible device, consolidate randomized identities and recount the zones.
    pub fn evaluate(&mut self, timestamp_ms: u64) -> PassSummary {
        let mut grid = self.new_grid();
        let mut positioned = 0;
        let mut unpositioned = 0;

        for index in 0..self.devices.len() {
            if self.devices[index].is_hidden {
                self.devices[index].remove_estimate(timestamp_ms);
                continue;
            }

            let result = self.try_estimate_position_with(&mut grid, &self.devices[index].id, timestamp_ms);
            let device = &mut self.devices[index];
            match result {
                Ok(estimate) => {
                    device.set_estimate(estimate);
                    positioned += 1;
                }
                Err(e) => {
                    if !e.is_routine() {
                        warn!("{}", e);
                    }
                    device.remove_estimate(timestamp_ms);
                    unpositioned += 1;
                }
            }
        }

        self.occupants = self.collect_occupants(timestamp_ms);
        let headcounts = self.aggregate_zones(timestamp_ms);

        let summary = PassSummary {
            timestamp_ms,
            positioned,
            unpositioned,
            occupants: self.occupants.len(),
            headcounts,
        };
        info!(
            "t={}: {} positioned, {} occupants, headcount {}",
            timestamp_ms,
            positioned,
            summary.occupants,
            summary.total_headcount()
        );
        summary
    }

    /// Load the window `[timestamp_ms - period, timestamp_ms]` and evaluate it
    pub fn evaluate_window(
        &mut self,
        source: &mut dyn TelemetrySource,
        timestamp_ms: u64,
        period_ms: NonZeroU64,
    ) -> TelemetryResult<PassSummary> {
        let records = source.fetch(timestamp_ms.saturating_sub(period_ms.get()), timestamp_ms)?;
        self.load_window(&records);
        Ok(self.evaluate(timestamp_ms))
    }

    fn scan_times(start_ms: u64, end_ms: u64, period_ms: NonZeroU64) -> impl Iterator<Item = u64> {
        let step = period_ms.get();
        (0..)
            .map(move |i: u64| i.checked_mul(step).and_then(|offset| start_ms.checked_add(offset)))
            .take_while(move |t| t.map_or(false, |t| t <= end_ms))
            .flatten()
    }

    /// Total headcount every `period_ms` from `start_ms` through `end_ms`
    pub fn headcount_scan(
        &mut self,
        source: &mut dyn TelemetrySource,
        start_ms: u64,
        end_ms: u64,
        period_ms: NonZeroU64,
    ) -> TelemetryResult<Vec<HeadcountSample>> {
        let mut samples = Vec::new();
        for t in Self::scan_times(start_ms, end_ms, period_ms) {
            let summary = self.evaluate_window(source, t, period_ms)?;
            samples.push(HeadcountSample {
                timestamp_ms: t,
                total_headcount: summary.total_headcount(),
                zones: summary.headcounts,
            });
        }
        Ok(samples)
    }

    /// Reference-device position errors, per-sensor distance errors and zone headcounts
    /// every `period_ms` from `start_ms` through `end_ms`
    pub fn error_scan(
        &mut self,
        source: &mut dyn TelemetrySource,
        start_ms: u64,
        end_ms: u64,
        period_ms: NonZeroU64,
    ) -> TelemetryResult<ErrorScanReport> {
        let mut validator = AccuracyValidator::with_history(self.pixels_to_meters(), usize::MAX);
        let mut steps = Vec::new();

        for t in Self::scan_times(start_ms, end_ms, period_ms) {
            let summary = self.evaluate_window(source, t, period_ms)?;
            let position_errors = validator.record(&self.devices, t);
            let distance_errors =
                validator.sensor_distance_errors(&self.sensors, &self.devices, t, &self.config.interference);
            steps.push(ErrorScanStep {
                timestamp_ms: t,
                occupants: summary.occupants,
                position_errors,
                distance_errors,
                zones: summary.headcounts,
            });
        }

        Ok(ErrorScanReport {
            steps,
            statistics: validator.calculate_statistics(),
        })
    }

    /// Predicted received-power samples for one sensor over the map
    pub fn signal_grid(&self, sensor_id: &str, spacing_px: Option<f64>) -> Option<Vec<SignalSample>> {
        let sensor = self.sensor(sensor_id)?;
        Some(sensor.signal_grid(
            self.config.map_width as f64,
            self.config.map_height as f64,
            spacing_px,
            self.config.pixels_to_meters(),
            &self.config.interference,
        ))
    }
}
