//! Indoor occupancy estimation
//!
//! Estimates the positions of wireless devices inside a building from RSSI samples
//! collected by fixed sensors, and aggregates them into per-zone headcounts.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod telemetry;
pub mod api;

// Re-export commonly used types
pub use crate::core::{Device, DistanceEstimate, MapPoint, PositionEstimate, Reading, TuningMode, Zone, ZoneHeadcount};
pub use algorithms::{
    AccumulationGrid, BiasTuner, GeoTransform, HeatmapConfig, InterferenceModel, InterferenceTable, PathLossParams,
    PositionSource, TunerConfig,
};
pub use processing::{ProbeRecord, SensorNode};
pub use validation::{AccuracyValidator, LocalizationError, LocalizationResult};
pub use utils::{ConfigError, SiteConfig};
pub use telemetry::{MockTelemetrySource, TelemetryError, TelemetrySource};
pub use api::{HeadcountStore, LocalizationEngine, PassSummary};
