//! Physical constants and engine defaults

/// Feet per meter
pub const FEET_PER_METER: f64 = 3.28084;

/// Default sensor calibration
pub const DEFAULT_PTX_DBM: f64 = 20.0;
pub const DEFAULT_GTX_DBI: f64 = 2.5;
pub const DEFAULT_GRX_DBI: f64 = 2.5;
pub const DEFAULT_XA_DB: f64 = -5.0;
/// 2.4 GHz carrier wavelength (meters)
pub const DEFAULT_WAVELENGTH_M: f64 = 0.12;

/// Distance at which a sensor's heatmap carries full weight (10 ft)
pub const FULL_STRENGTH_DISTANCE_M: f64 = 3.048;
/// Distance at which a sensor's heatmap carries half weight (50 ft)
pub const HALF_STRENGTH_DISTANCE_M: f64 = 15.24;
/// |dBm| at which a sensor's heatmap carries full weight
pub const FULL_STRENGTH_SIGNAL: f64 = 60.0;
/// |dBm| at which a sensor's heatmap carries half weight
pub const HALF_STRENGTH_SIGNAL: f64 = 90.0;
/// Opacity at the inner and outer band edges, relative to the peak
pub const BAND_OPACITY: f64 = 0.90;
/// Radial heatmap extent as a multiple of the estimated distance
pub const RENDER_MULTIPLIER: f64 = 4.0;
/// Smallest half-width of the uncertainty band (meters)
pub const MIN_BAND_M: f64 = 0.1;
/// Sensors that must detect a device before it is positioned
pub const MIN_SENSORS: usize = 2;

pub const XA_SCAN_RANGE_DB: f64 = 100.0;
pub const XA_SCAN_STEP_DB: f64 = 0.05;

/// Devices closer than this are consolidated into one occupant (meters)
pub const CONSOLIDATION_RADIUS_M: f64 = 3.0;

/// Spacing of the predicted-signal debug grid (pixels)
pub const SIGNAL_GRID_SPACING_PX: f64 = 50.0;
