//! Localization algorithms

pub mod path_loss;
pub mod raster;
pub mod calibration;
pub mod consolidation;
pub mod geo;

pub use path_loss::{InterferenceModel, InterferenceTable, PathLossParams};
pub use raster::{AccumulationGrid, HeatmapConfig, RadialProfile};
pub use calibration::{BiasTuner, TunerConfig, TuningOutcome};
pub use consolidation::consolidate_identities;
pub use geo::{GeoTransform, PositionSource};
