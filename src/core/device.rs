//! Tracked wireless device (occupant)

use crate::core::types::{ExpectedInterval, MapPoint, PositionEstimate, TuningMode};
use nalgebra::distance;
use serde::{Deserialize, Serialize};

/// A device observed by the sensors, or a consolidated pseudo-occupant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Lower-cased device identifier (MAC address)
    pub id: String,
    pub name: String,
    /// Position estimates ordered by timestamp, at most one per timestamp
    estimates: Vec<PositionEstimate>,
    /// Ground-truth intervals ordered by start time
    expected: Vec<ExpectedInterval>,
    /// Manually placed ground truth used by manual bias tuning
    pub calibration_point: Option<MapPoint>,
    pub is_reference: bool,
    pub is_randomized: bool,
    pub is_pseudo: bool,
    pub is_hidden: bool,
    /// Identifiers merged into this pseudo-occupant
    pub member_ids: Vec<String>,
}

impl Device {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into().to_lowercase();
        Self {
            name: id.clone(),
            id,
            estimates: Vec::new(),
            expected: Vec::new(),
            calibration_point: None,
            is_reference: false,
            is_randomized: false,
            is_pseudo: false,
            is_hidden: false,
            member_ids: Vec::new(),
        }
    }

    /// Reference device with known ground truth
    pub fn reference(id: impl Into<String>, expected: Vec<ExpectedInterval>) -> Self {
        let mut device = Self::new(id);
        device.is_reference = true;
        for interval in expected {
            device.add_expected(interval);
        }
        device
    }

    pub fn randomized(id: impl Into<String>) -> Self {
        let mut device = Self::new(id);
        device.is_randomized = true;
        device
    }

    /// Insert an estimate, replacing any estimate already held at the same timestamp
    pub fn set_estimate(&mut self, estimate: PositionEstimate) {
        self.remove_estimate(estimate.timestamp_ms);
        let idx = self
            .estimates
            .partition_point(|e| e.timestamp_ms < estimate.timestamp_ms);
        self.estimates.insert(idx, estimate);
    }

    pub fn remove_estimate(&mut self, timestamp_ms: u64) -> Option<PositionEstimate> {
        let idx = self
            .estimates
            .iter()
            .position(|e| e.timestamp_ms == timestamp_ms)?;
        Some(self.estimates.remove(idx))
    }

    pub fn estimate_at(&self, timestamp_ms: u64) -> Option<&PositionEstimate> {
        self.estimates.iter().find(|e| e.timestamp_ms == timestamp_ms)
    }

    pub fn position_at(&self, timestamp_ms: u64) -> Option<MapPoint> {
        self.estimate_at(timestamp_ms).map(|e| e.position)
    }

    pub fn has_estimate(&self, timestamp_ms: u64) -> bool {
        self.estimate_at(timestamp_ms).is_some()
    }

    pub fn estimates(&self) -> &[PositionEstimate] {
        &self.estimates
    }

    pub fn add_expected(&mut self, interval: ExpectedInterval) {
        let idx = self
            .expected
            .partition_point(|e| e.start_ms <= interval.start_ms);
        self.expected.insert(idx, interval);
    }

    pub fn expected_intervals(&self) -> &[ExpectedInterval] {
        &self.expected
    }

    /// Ground truth applicable at `time_ms`: the first bounded interval covering it,
    /// falling back to the first default interval.
    pub fn expected_at(&self, time_ms: u64) -> Option<&ExpectedInterval> {
        self.expected
            .iter()
            .find(|e| e.covers(time_ms))
            .or_else(|| self.expected.iter().find(|e| e.is_default()))
    }

    pub fn has_expected(&self, time_ms: u64) -> bool {
        self.expected_at(time_ms).is_some()
    }

    /// Ground truth for bias tuning under the given mode
    pub fn ground_truth(&self, time_ms: u64, mode: TuningMode) -> Option<MapPoint> {
        match mode {
            TuningMode::Automatic => self.expected_at(time_ms).map(|e| e.position),
            TuningMode::Manual => self.calibration_point,
        }
    }

    /// Distance in meters between this device's and another's estimates at `time_ms`
    pub fn distance_to(&self, other: &Device, time_ms: u64, pixels_to_meters: f64) -> Option<f64> {
        let a = self.position_at(time_ms)?;
        let b = other.position_at(time_ms)?;
        Some(distance(&a, &b) * pixels_to_meters)
    }

    /// Distance in meters between the estimate and the ground truth at `time_ms`
    pub fn position_error_m(&self, time_ms: u64, pixels_to_meters: f64) -> Option<f64> {
        let estimate = self.position_at(time_ms)?;
        let expected = self.expected_at(time_ms)?;
        Some(distance(&estimate, &expected.position) * pixels_to_meters)
    }

    /// Counted and displayed directly: not a reference and not hidden
    pub fn is_countable(&self) -> bool {
        !self.is_reference && !self.is_hidden
    }
}
