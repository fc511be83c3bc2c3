//! Raster trilateration.
//!
//! Every active sensor that hears a device contributes a ring of opacity centred on
//! the sensor, peaking at the estimated distance. The rings are composited onto one
//! accumulation grid and the cell with the densest 3×3 neighbourhood is taken as the
//! device position.

use crate::algorithms::path_loss::InterferenceModel;
use crate::core::constants::*;
use crate::core::types::{DistanceEstimate, MapPoint, PositionEstimate};
use crate::core::zone::Zone;
use crate::processing::sensor::SensorNode;
use crate::validation::error::{LocalizationError, LocalizationResult};
use serde::{Deserialize, Serialize};

/// Weighting and shape of the per-sensor heatmaps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapConfig {
    /// Distance with full weight (meters)
    pub full_strength_distance_m: f64,
    /// Additional distance over which weight halves (meters)
    pub half_strength_distance_m: f64,
    /// |dBm| with full weight
    pub full_strength_signal: f64,
    /// Additional |dBm| over which weight halves
    pub half_strength_signal: f64,
    /// Opacity at the band edges relative to the peak
    pub band_opacity: f64,
    /// Heatmap radius as a multiple of the estimated distance
    pub render_multiplier: f64,
    /// Minimum band half-width (meters)
    pub min_band_m: f64,
    /// Active sensors required to position a device
    pub min_sensors: usize,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            full_strength_distance_m: FULL_STRENGTH_DISTANCE_M,
            half_strength_distance_m: HALF_STRENGTH_DISTANCE_M,
            full_strength_signal: FULL_STRENGTH_SIGNAL,
            half_strength_signal: HALF_STRENGTH_SIGNAL,
            band_opacity: BAND_OPACITY,
            render_multiplier: RENDER_MULTIPLIER,
            min_band_m: MIN_BAND_M,
            min_sensors: MIN_SENSORS,
        }
    }
}

/// One-sided logistic decay: 1 up to `full`, halving every `half` beyond it
fn decay(value: f64, full: f64, half: f64) -> f64 {
    (0.5f64.ln() / half * (value - full)).exp().min(1.0)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Confidence weight in [0, 1] of one sensor's distance estimate.
///
/// Distant sensors, inconsistent readings and weak signals are each discounted.
pub fn guess_strength(estimate: &DistanceEstimate, config: &HeatmapConfig) -> f64 {
    let distance_factor = round_to(
        decay(
            estimate.mean_distance_m,
            config.full_strength_distance_m,
            config.half_strength_distance_m,
        ),
        4,
    );
    let variability_factor = (1.0 / (estimate.stddev_distance_m + 1.0)).min(1.0);
    let signal_factor = round_to(
        decay(
            estimate.mean_signal_dbm.abs(),
            config.full_strength_signal,
            config.half_strength_signal,
        ),
        2,
    );

    distance_factor * variability_factor * signal_factor
}

/// Piecewise-linear opacity profile over the radius from a sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialProfile {
    pub center: MapPoint,
    /// (radius in pixels, alpha) control points with non-decreasing radius
    stops: [(f64, f64); 5],
}

impl RadialProfile {
    /// Profile for one sensor's estimate, or `None` when it would draw nothing
    pub fn from_estimate(
        center: MapPoint,
        estimate: &DistanceEstimate,
        meters_to_pixels: f64,
        config: &HeatmapConfig,
    ) -> Option<Self> {
        let d = estimate.mean_distance_m;
        if !d.is_finite() || d <= 0.0 {
            return None;
        }

        let strength = guess_strength(estimate, config);
        let band = d.min(config.min_band_m.max(estimate.stddev_distance_m));
        let radius = d * meters_to_pixels;
        let inner = (d - band) * meters_to_pixels;
        let outer = (d + band) * meters_to_pixels;
        let extent = radius * config.render_multiplier;

        if !(extent > 0.0) || !(strength > 0.0) {
            return None;
        }

        Some(Self {
            center,
            stops: [
                (0.0, 0.0),
                (inner, strength * config.band_opacity),
                (radius, strength),
                (outer, strength * config.band_opacity),
                (extent, 0.0),
            ],
        })
    }

    /// Outer radius beyond which the profile is zero
    pub fn extent(&self) -> f64 {
        self.stops[4].0
    }

    pub fn peak_alpha(&self) -> f64 {
        self.stops[2].1
    }

    pub fn alpha_at(&self, r: f64) -> f64 {
        if r <= self.stops[0].0 || r >= self.extent() {
            return 0.0;
        }
        for pair in self.stops.windows(2) {
            let (r0, a0) = pair[0];
            let (r1, a1) = pair[1];
            if r <= r1 {
                let width = r1 - r0;
                if width <= 0.0 {
                    return a1;
                }
                return a0 + (a1 - a0) * (r - r0) / width;
            }
        }
        0.0
    }
}

/// Alpha accumulation buffer covering the map, one cell per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationGrid {
    width: usize,
    height: usize,
    cells: Vec<f64>,
}

impl AccumulationGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0.0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = 0.0);
    }

    pub fn alpha(&self, x: usize, y: usize) -> f64 {
        self.cells[y * self.width + x]
    }

    /// Source-over composite a radial profile onto the grid, sampling at cell centres
    pub fn composite(&mut self, profile: &RadialProfile) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let extent = profile.extent();
        let (cx, cy) = (profile.center.x, profile.center.y);

        let x_min = (cx - extent).floor().max(0.0) as usize;
        let y_min = (cy - extent).floor().max(0.0) as usize;
        let x_max = ((cx + extent).ceil().max(0.0) as usize).min(self.width - 1);
        let y_max = ((cy + extent).ceil().max(0.0) as usize).min(self.height - 1);
        if x_min > x_max || y_min > y_max {
            return;
        }

        for y in y_min..=y_max {
            let dy = y as f64 + 0.5 - cy;
            let row = y * self.width;
            for x in x_min..=x_max {
                let dx = x as f64 + 0.5 - cx;
                let src = profile.alpha_at(dx.hypot(dy));
                if src > 0.0 {
                    let dst = &mut self.cells[row + x];
                    *dst = src + *dst * (1.0 - src);
                }
            }
        }
    }

    fn neighbourhood_sum(&self, x: usize, y: usize) -> f64 {
        let mut sum = 0.0;
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                sum += self.alpha(nx, ny);
            }
        }
        sum
    }

    /// Interior cell with the largest 3×3 alpha sum; ties keep the first in row-major order
    pub fn peak(&self) -> Option<(usize, usize, f64)> {
        if self.width < 3 || self.height < 3 {
            return None;
        }
        let mut best: Option<(usize, usize, f64)> = None;
        let mut best_sum = 0.0;
        for y in 1..self.height - 1 {
            for x in 1..self.width - 1 {
                let sum = self.neighbourhood_sum(x, y);
                if sum > best_sum {
                    best_sum = sum;
                    best = Some((x, y, sum));
                }
            }
        }
        best
    }
}

/// Fuse the distance estimates of every active sensor into one position.
///
/// `grid` is cleared before use and holds this evaluation's heatmap afterwards.
pub fn try_estimate_position(
    sensors: &[SensorNode],
    device_id: &str,
    timestamp_ms: u64,
    zones: &[Zone],
    model: &InterferenceModel,
    config: &HeatmapConfig,
    meters_to_pixels: f64,
    grid: &mut AccumulationGrid,
) -> LocalizationResult<PositionEstimate> {
    let detections: Vec<(MapPoint, DistanceEstimate)> = sensors
        .iter()
        .filter(|s| s.active)
        .filter_map(|s| s.distance_estimate(device_id, model).map(|e| (s.position, e)))
        .collect();

    if detections.len() < config.min_sensors {
        return Err(LocalizationError::InsufficientSensors {
            device_id: device_id.to_string(),
            detected: detections.len(),
            required: config.min_sensors,
        });
    }

    let profiles: Vec<RadialProfile> = detections
        .iter()
        .filter_map(|(center, estimate)| RadialProfile::from_estimate(*center, estimate, meters_to_pixels, config))
        .collect();

    grid.clear();
    for profile in &profiles {
        grid.composite(profile);
    }

    let (x, y, _) = grid.peak().ok_or_else(|| LocalizationError::InsufficientSensors {
        device_id: device_id.to_string(),
        detected: profiles.len(),
        required: config.min_sensors,
    })?;

    let position = MapPoint::new(x as f64, y as f64);
    Ok(PositionEstimate {
        timestamp_ms,
        position,
        confidence_area: 1.0,
        within_any_zone: zones.iter().any(|z| z.contains(&position)),
    })
}
