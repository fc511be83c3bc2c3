//! Core data types for the localization engine

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A point on the floor plan, in map pixels
pub type MapPoint = Point2<f64>;

/// Geographic coordinate reported alongside a probe, when the access point knows one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub lat: f64,
    pub lng: f64,
}

/// One raw received-signal sample captured by a sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    /// Received power in dBm
    pub signal_dbm: f64,
    pub timestamp_ms: u64,
    pub geo: Option<GeoCoordinate>,
}

impl Reading {
    pub fn new(device_id: impl Into<String>, signal_dbm: f64, timestamp_ms: u64) -> Self {
        Self {
            device_id: device_id.into().to_lowercase(),
            signal_dbm,
            timestamp_ms,
            geo: None,
        }
    }

    pub fn with_geo(mut self, lat: f64, lng: f64) -> Self {
        self.geo = Some(GeoCoordinate { lat, lng });
        self
    }
}

/// Aggregate distance estimate of one device as seen by one sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceEstimate {
    /// Mean of the per-reading distances (meters)
    pub mean_distance_m: f64,
    /// Population standard deviation of the per-reading distances (meters)
    pub stddev_distance_m: f64,
    /// Mean received power (dBm)
    pub mean_signal_dbm: f64,
    pub sample_count: usize,
}

/// Estimated position of a device at one evaluated timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    pub timestamp_ms: u64,
    pub position: MapPoint,
    pub confidence_area: f64,
    pub within_any_zone: bool,
}

/// Ground-truth position of a reference device over a time interval.
///
/// An interval without an end time is the device's default location and applies
/// whenever no bounded interval matches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedInterval {
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
    pub position: MapPoint,
}

impl ExpectedInterval {
    pub fn new(start_ms: Option<u64>, end_ms: Option<u64>, position: MapPoint) -> Self {
        Self { start_ms, end_ms, position }
    }

    /// Interval that applies at any time
    pub fn always(position: MapPoint) -> Self {
        Self::new(None, None, position)
    }

    /// Build an interval from optional coordinates; a half-specified point yields `None`
    pub fn from_parts(
        start_ms: Option<u64>,
        end_ms: Option<u64>,
        x: Option<f64>,
        y: Option<f64>,
    ) -> Option<Self> {
        match (x, y) {
            (Some(x), Some(y)) => Some(Self::new(start_ms, end_ms, MapPoint::new(x, y))),
            _ => None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.end_ms.is_none()
    }

    /// Whether this bounded interval covers `time_ms`
    pub fn covers(&self, time_ms: u64) -> bool {
        match (self.start_ms, self.end_ms) {
            (Some(start), Some(end)) => start <= time_ms && time_ms <= end,
            (None, Some(end)) => time_ms <= end,
            _ => false,
        }
    }
}

/// Source of ground truth used by the bias tuner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TuningMode {
    /// Ground truth comes from the device's expected intervals at the query time
    Automatic,
    /// Ground truth comes from a manually placed calibration point
    Manual,
}

/// Headcount of one zone after an aggregation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneHeadcount {
    pub headcount: u32,
    #[serde(rename = "zoneId")]
    pub zone_id: u32,
}
