//! Geographic positioning.
//!
//! Access points may report their own location fix for a device as latitude and
//! longitude. [`GeoTransform`] maps such a fix onto the floor plan by linear
//! interpolation between two reference corners known in both spaces.

use crate::core::types::{GeoCoordinate, MapPoint, PositionEstimate};
use crate::core::zone::Zone;
use crate::processing::sensor::SensorNode;
use crate::validation::error::{LocalizationError, LocalizationResult};
use log::debug;
use serde::{Deserialize, Serialize};

/// Where device positions come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSource {
    /// Fused from the sensors' distance estimates
    #[default]
    Heatmap,
    /// Taken from the location fix reported alongside the readings
    Geo,
}

/// Linear mapping from geographic coordinates to map pixels.
///
/// Fixes outside the north-western hemisphere quadrant (`lat > 0`, `lng < 0`) are
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub geo_top_left: GeoCoordinate,
    pub geo_bottom_right: GeoCoordinate,
    pub pixel_top_left: MapPoint,
    pub pixel_bottom_right: MapPoint,
}

impl GeoTransform {
    pub fn new(
        geo_top_left: GeoCoordinate,
        geo_bottom_right: GeoCoordinate,
        pixel_top_left: MapPoint,
        pixel_bottom_right: MapPoint,
    ) -> Self {
        Self {
            geo_top_left,
            geo_bottom_right,
            pixel_top_left,
            pixel_bottom_right,
        }
    }

    /// Both geographic ranges must be finite and non-zero
    pub fn is_well_formed(&self) -> bool {
        let lat_range = self.geo_top_left.lat - self.geo_bottom_right.lat;
        let lng_range = self.geo_top_left.lng - self.geo_bottom_right.lng;
        lat_range.is_finite() && lng_range.is_finite() && lat_range != 0.0 && lng_range != 0.0
    }

    pub fn to_pixels(&self, fix: &GeoCoordinate) -> Option<MapPoint> {
        if !(fix.lat > 0.0 && fix.lng < 0.0) || !self.is_well_formed() {
            return None;
        }

        let (tl, br) = (&self.geo_top_left, &self.geo_bottom_right);
        let x_coeff = 1.0 - (fix.lng - br.lng) / (tl.lng - br.lng);
        let y_coeff = 1.0 - (fix.lat - br.lat) / (tl.lat - br.lat);

        let pixel_range_x = self.pixel_top_left.x - self.pixel_bottom_right.x;
        let pixel_range_y = self.pixel_top_left.y - self.pixel_bottom_right.y;

        Some(MapPoint::new(
            (x_coeff * pixel_range_x).abs() + self.pixel_top_left.x,
            (y_coeff * pixel_range_y).abs() + self.pixel_top_left.y,
        ))
    }
}

/// Position a device from the first active sensor whose first reading of it carries a
/// usable location fix
pub fn try_estimate_from_geo(
    sensors: &[SensorNode],
    device_id: &str,
    timestamp_ms: u64,
    zones: &[Zone],
    transform: &GeoTransform,
) -> LocalizationResult<PositionEstimate> {
    for sensor in sensors.iter().filter(|s| s.active) {
        let Some(reading) = sensor.readings_for(device_id).next() else {
            continue;
        };
        let Some(position) = reading.geo.as_ref().and_then(|fix| transform.to_pixels(fix)) else {
            continue;
        };

        debug!("device {} placed at {} from sensor {}", device_id, position, sensor.id);
        return Ok(PositionEstimate {
            timestamp_ms,
            position,
            confidence_area: 1.0,
            within_any_zone: zones.iter().any(|z| z.contains(&position)),
        });
    }

    Err(LocalizationError::MissingGeoLocation {
        device_id: device_id.to_string(),
    })
}
