use crate::algorithms::calibration::TunerConfig;
use crate::algorithms::geo::{GeoTransform, PositionSource};
use crate::algorithms::path_loss::{InterferenceModel, PathLossParams};
use crate::algorithms::raster::HeatmapConfig;
use crate::core::constants::*;
use crate::core::device::Device;
use crate::core::types::{ExpectedInterval, GeoCoordinate, MapPoint};
use crate::core::zone::Zone;
use crate::processing::sensor::SensorNode;
use crate::processing::telemetry::IngestFilter;
use crate::validation::error::LocalizationError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Site-wide configuration: map scale, sensors, zones and reference devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub name: String,
    /// Pixels per meter
    pub meters_to_pixels: f64,
    /// Map extent in pixels
    pub map_width: u32,
    pub map_height: u32,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    /// Ground truth per reference device id
    #[serde(default)]
    pub reference_devices: BTreeMap<String, Vec<ExpectedIntervalConfig>>,
    #[serde(default)]
    pub ignored_devices: Vec<String>,
    /// OUI prefixes of vendors whose addresses are never treated as randomized
    #[serde(default)]
    pub known_vendor_prefixes: Vec<String>,
    #[serde(default)]
    pub interference: InterferenceModel,
    #[serde(default)]
    pub heatmap: HeatmapConfig,
    #[serde(default)]
    pub tuner: TunerConfig,
    #[serde(default = "default_consolidation_radius")]
    pub consolidation_radius_m: f64,
    #[serde(default)]
    pub position_source: PositionSource,
    /// Mapping of reported location fixes onto the map, required by the geo position source
    #[serde(default)]
    pub geo_transform: Option<GeoTransformConfig>,
}

fn default_consolidation_radius() -> f64 {
    CONSOLIDATION_RADIUS_M
}

fn default_true() -> bool {
    true
}

fn default_ptx() -> f64 {
    DEFAULT_PTX_DBM
}

fn default_gtx() -> f64 {
    DEFAULT_GTX_DBI
}

fn default_grx() -> f64 {
    DEFAULT_GRX_DBI
}

fn default_xa() -> f64 {
    DEFAULT_XA_DB
}

fn default_wavelength() -> f64 {
    DEFAULT_WAVELENGTH_M
}

/// Individual sensor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub id: String,
    /// Telemetry identifier of the backing access point
    #[serde(default)]
    pub access_point_id: Option<u32>,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_ptx")]
    pub ptx: f64,
    #[serde(default = "default_gtx")]
    pub gtx: f64,
    #[serde(default = "default_grx")]
    pub grx: f64,
    #[serde(default = "default_xa")]
    pub xa: f64,
    #[serde(default = "default_wavelength")]
    pub wavelength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    pub x: f64,
    pub y: f64,
}

impl PointConfig {
    fn offset(&self, origin: &PointConfig) -> MapPoint {
        MapPoint::new(origin.x + self.x, origin.y + self.y)
    }
}

/// Zone corners are relative to `origin`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub id: u32,
    #[serde(default = "PointConfig::zero")]
    pub origin: PointConfig,
    pub top_left: PointConfig,
    pub top_right: PointConfig,
    pub bottom_right: PointConfig,
    pub bottom_left: PointConfig,
}

impl PointConfig {
    fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCornersConfig {
    pub tl: GeoCoordinate,
    pub br: GeoCoordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelCornersConfig {
    pub tl: PointConfig,
    pub br: PointConfig,
}

/// Top-left and bottom-right map corners in both geographic and pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransformConfig {
    pub geo: GeoCornersConfig,
    pub pixels: PixelCornersConfig,
}

impl GeoTransformConfig {
    pub fn to_transform(&self) -> GeoTransform {
        GeoTransform::new(
            self.geo.tl,
            self.geo.br,
            MapPoint::new(self.pixels.tl.x, self.pixels.tl.y),
            MapPoint::new(self.pixels.br.x, self.pixels.br.y),
        )
    }
}

/// Ground-truth interval as written in the configuration; `x`/`y` must come together
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedIntervalConfig {
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(default)]
    pub end: Option<u64>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: String, id: String },
    #[error("{message}")]
    IoError { message: String },
    #[error("{message}")]
    SerializationError { message: String },
}

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            meters_to_pixels: 10.0,
            map_width: 1000,
            map_height: 1000,
            sensors: Vec::new(),
            zones: Vec::new(),
            reference_devices: BTreeMap::new(),
            ignored_devices: Vec::new(),
            known_vendor_prefixes: Vec::new(),
            interference: InterferenceModel::default(),
            heatmap: HeatmapConfig::default(),
            tuner: TunerConfig::default(),
            consolidation_radius_m: CONSOLIDATION_RADIUS_M,
            position_source: PositionSource::default(),
            geo_transform: None,
        }
    }
}

impl SiteConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SiteConfig = serde_json::from_str(json).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to parse site config: {}", e),
        })?;

        let validation = config.validate();
        for warning in &validation.warnings {
            warn!("{}", warning);
        }
        if let Some(error) = validation.errors.into_iter().next() {
            return Err(error);
        }
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to serialize site config: {}", e),
        })
    }

    pub fn pixels_to_meters(&self) -> f64 {
        1.0 / self.meters_to_pixels
    }

    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !(self.meters_to_pixels > 0.0) {
            errors.push(ConfigError::InvalidParameter {
                parameter: "meters_to_pixels".to_string(),
                value: self.meters_to_pixels.to_string(),
                reason: "Map scale must be positive".to_string(),
            });
        }

        if self.map_width == 0 || self.map_height == 0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "map_size".to_string(),
                value: format!("{}x{}", self.map_width, self.map_height),
                reason: "Map extent must be non-empty".to_string(),
            });
        }

        if !(self.tuner.step > 0.0) {
            errors.push(ConfigError::InvalidParameter {
                parameter: "tuner.step".to_string(),
                value: self.tuner.step.to_string(),
                reason: "Scan step must be positive".to_string(),
            });
        }

        if !(self.consolidation_radius_m >= 0.0) {
            errors.push(ConfigError::InvalidParameter {
                parameter: "consolidation_radius_m".to_string(),
                value: self.consolidation_radius_m.to_string(),
                reason: "Radius cannot be negative".to_string(),
            });
        }

        let multiplier = self.interference.multiplier;
        if !(multiplier > 0.0) || !multiplier.is_finite() {
            errors.push(ConfigError::InvalidParameter {
                parameter: "interference.multiplier".to_string(),
                value: multiplier.to_string(),
                reason: "Exponent multiplier must be positive and finite".to_string(),
            });
        }

        match (&self.geo_transform, self.position_source) {
            (Some(geo), _) if !geo.to_transform().is_well_formed() => {
                errors.push(ConfigError::InvalidParameter {
                    parameter: "geo_transform".to_string(),
                    value: format!("{:?}", geo.geo),
                    reason: "Geographic corners must span a non-empty range".to_string(),
                });
            }
            (None, PositionSource::Geo) => {
                errors.push(ConfigError::InvalidParameter {
                    parameter: "position_source".to_string(),
                    value: "geo".to_string(),
                    reason: "The geo position source needs a geo_transform".to_string(),
                });
            }
            _ => {}
        }

        for (name, table) in [("forward", &self.interference.forward), ("reverse", &self.interference.reverse)] {
            if table.steps.is_empty() || !table.is_well_formed() {
                errors.push(ConfigError::InvalidParameter {
                    parameter: format!("interference.{}", name),
                    value: format!("{} steps", table.steps.len()),
                    reason: "Thresholds must be non-empty and strictly descending with positive exponents"
                        .to_string(),
                });
            }
        }

        let mut sensor_ids = HashSet::new();
        for sensor in &self.sensors {
            if !sensor_ids.insert(sensor.id.as_str()) {
                errors.push(ConfigError::DuplicateId {
                    kind: "sensor".to_string(),
                    id: sensor.id.clone(),
                });
            }
            if !(sensor.wavelength > 0.0) {
                errors.push(ConfigError::InvalidParameter {
                    parameter: format!("sensors[{}].wavelength", sensor.id),
                    value: sensor.wavelength.to_string(),
                    reason: "Wavelength must be positive".to_string(),
                });
            }
            if !sensor.active {
                warnings.push(format!("Sensor {} is inactive", sensor.id));
            }
            if sensor.access_point_id.is_none() {
                warnings.push(format!("Sensor {} has no access point and will receive no readings", sensor.id));
            }
        }

        let mut zone_ids = HashSet::new();
        for zone in &self.zones {
            if !zone_ids.insert(zone.id) {
                errors.push(ConfigError::DuplicateId {
                    kind: "zone".to_string(),
                    id: zone.id.to_string(),
                });
            }
        }

        if self.active_sensor_count() < self.heatmap.min_sensors {
            warnings.push(format!(
                "Only {} active sensors; {} are needed to position a device",
                self.active_sensor_count(),
                self.heatmap.min_sensors
            ));
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn active_sensor_count(&self) -> usize {
        self.sensors.iter().filter(|s| s.active).count()
    }

    pub fn build_sensors(&self) -> Vec<SensorNode> {
        self.sensors
            .iter()
            .map(|s| {
                let mut node = SensorNode::new(s.id.clone(), MapPoint::new(s.x, s.y)).with_params(PathLossParams {
                    ptx: s.ptx,
                    gtx: s.gtx,
                    grx: s.grx,
                    xa: s.xa,
                    wavelength: s.wavelength,
                });
                node.access_point_id = s.access_point_id;
                node.active = s.active;
                node
            })
            .collect()
    }

    /// Zones with corners resolved to absolute map coordinates
    pub fn build_zones(&self) -> Vec<Zone> {
        self.zones
            .iter()
            .map(|z| {
                Zone::new(
                    z.id,
                    z.top_left.offset(&z.origin),
                    z.top_right.offset(&z.origin),
                    z.bottom_right.offset(&z.origin),
                    z.bottom_left.offset(&z.origin),
                )
            })
            .collect()
    }

    /// Reference devices with their ground truth; half-specified points are dropped
    pub fn build_reference_devices(&self) -> Vec<Device> {
        self.reference_devices
            .iter()
            .map(|(id, intervals)| {
                let expected = intervals
                    .iter()
                    .filter_map(|i| {
                        let interval = ExpectedInterval::from_parts(i.start, i.end, i.x, i.y);
                        if interval.is_none() && (i.x.is_some() || i.y.is_some()) {
                            let error = LocalizationError::MalformedGroundTruth { device_id: id.to_lowercase() };
                            warn!("{}: {:?}", error, i);
                        }
                        interval
                    })
                    .collect();
                Device::reference(id.as_str(), expected)
            })
            .collect()
    }

    pub fn build_geo_transform(&self) -> Option<GeoTransform> {
        self.geo_transform.as_ref().map(GeoTransformConfig::to_transform)
    }

    pub fn ingest_filter(&self) -> IngestFilter {
        IngestFilter::new(self.reference_devices.keys(), &self.ignored_devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = r#"{
        "name": "Lab",
        "meters_to_pixels": 10.0,
        "map_width": 200,
        "map_height": 100,
        "sensors": [
            { "id": "s1", "access_point_id": 1, "x": 10, "y": 10 },
            { "id": "s2", "access_point_id": 2, "x": 190, "y": 10, "xa": 3.5 }
        ],
        "zones": [
            { "id": 7, "origin": { "x": 100, "y": 50 },
              "top_left": { "x": 0, "y": 0 }, "top_right": { "x": 20, "y": 0 },
              "bottom_right": { "x": 20, "y": 20 }, "bottom_left": { "x": 0, "y": 20 } }
        ],
        "reference_devices": {
            "AA:BB:CC:DD:EE:01": [
                { "x": 50, "y": 50 },
                { "start": 1000, "end": 2000, "x": 60, "y": 60 },
                { "start": 3000, "end": 4000, "x": 70 }
            ]
        },
        "ignored_devices": ["11:22:33:44:55:66"]
    }"#;

    #[test]
    fn test_load_with_defaults() {
        let config = SiteConfig::from_json_str(SITE).unwrap();
        assert_eq!(config.name, "Lab");
        assert_eq!(config.pixels_to_meters(), 0.1);
        assert_eq!(config.tuner, TunerConfig::default());
        assert_eq!(config.heatmap, HeatmapConfig::default());
        assert_eq!(config.consolidation_radius_m, 3.0);

        let sensors = config.build_sensors();
        assert_eq!(sensors[0].params, PathLossParams::default());
        assert_eq!(sensors[1].params.xa, 3.5);
        assert_eq!(sensors[1].access_point_id, Some(2));
        assert!(sensors[0].active);
    }

    #[test]
    fn test_zone_corners_offset_by_origin() {
        let config = SiteConfig::from_json_str(SITE).unwrap();
        let zones = config.build_zones();
        assert_eq!(zones[0].top_left, MapPoint::new(100.0, 50.0));
        assert_eq!(zones[0].bottom_right, MapPoint::new(120.0, 70.0));
    }

    #[test]
    fn test_malformed_ground_truth_dropped() {
        let config = SiteConfig::from_json_str(SITE).unwrap();
        let devices = config.build_reference_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "aa:bb:cc:dd:ee:01");
        assert_eq!(devices[0].expected_intervals().len(), 2);
        assert!(devices[0].is_reference);
        assert_eq!(devices[0].expected_at(3500).map(|e| e.position), Some(MapPoint::new(50.0, 50.0)));
    }

    #[test]
    fn test_ingest_filter_from_config() {
        let config = SiteConfig::from_json_str(SITE).unwrap();
        let filter = config.ingest_filter();
        assert!(!filter.accepts("11:22:33:44:55:66"));
        assert!(filter.is_reference("aa:bb:cc:dd:ee:01"));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = SiteConfig::from_json_str(SITE).unwrap();
        config.meters_to_pixels = 0.0;
        config.sensors[1].id = "s1".to_string();
        config.sensors[0].wavelength = -1.0;

        let result = config.validate();
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 3);
        assert!(result
            .errors
            .contains(&ConfigError::DuplicateId { kind: "sensor".to_string(), id: "s1".to_string() }));
    }

    #[test]
    fn test_rejects_non_positive_multiplier() {
        let mut config = SiteConfig::from_json_str(SITE).unwrap();
        for multiplier in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            config.interference.multiplier = multiplier;
            let result = config.validate();
            assert!(!result.is_valid);
            assert!(matches!(
                &result.errors[0],
                ConfigError::InvalidParameter { parameter, .. } if parameter == "interference.multiplier"
            ));
        }

        let json = SITE.replacen(
            r#""ignored_devices""#,
            r#""interference": { "forward": { "steps": [ { "above_dbm": -50.0, "exponent": 5.0 } ], "fallback": 4.0 },
                                 "reverse": { "steps": [ { "above_dbm": -37.0, "exponent": 5.0 } ], "fallback": 4.0 },
                                 "multiplier": 0.0 },
               "ignored_devices""#,
            1,
        );
        assert!(matches!(
            SiteConfig::from_json_str(&json),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_geo_transform_from_config() {
        let json = SITE.replacen(
            r#""ignored_devices""#,
            r#""position_source": "geo",
               "geo_transform": {
                   "geo": { "tl": { "lat": 40.0, "lng": -75.0 }, "br": { "lat": 39.9, "lng": -74.9 } },
                   "pixels": { "tl": { "x": 0, "y": 0 }, "br": { "x": 200, "y": 100 } }
               },
               "ignored_devices""#,
            1,
        );
        let config = SiteConfig::from_json_str(&json).unwrap();
        assert_eq!(config.position_source, PositionSource::Geo);

        let transform = config.build_geo_transform().unwrap();
        assert_eq!(transform.pixel_bottom_right, MapPoint::new(200.0, 100.0));
        assert_eq!(SiteConfig::from_json_str(SITE).unwrap().build_geo_transform(), None);
    }

    #[test]
    fn test_geo_source_requires_transform() {
        let mut config = SiteConfig::from_json_str(SITE).unwrap();
        assert_eq!(config.position_source, PositionSource::Heatmap);
        config.position_source = PositionSource::Geo;
        assert!(!config.validate().is_valid);
    }

    #[test]
    fn test_rejects_unsorted_interference_table() {
        let mut config = SiteConfig::default();
        config.interference.forward = crate::algorithms::path_loss::InterferenceTable::new(vec![(-50.0, 4.0), (-40.0, 5.0)], 3.0);
        assert!(!config.validate().is_valid);
    }

    #[test]
    fn test_json_round_trip_preserves_config() {
        let config = SiteConfig::from_json_str(SITE).unwrap();
        let json = config.to_json_string().unwrap();
        assert_eq!(SiteConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_parse_error_reported() {
        assert!(matches!(
            SiteConfig::from_json_str("{ not json"),
            Err(ConfigError::SerializationError { .. })
        ));
    }
}
