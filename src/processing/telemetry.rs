//! Probe-record ingestion.
//!
//! Access points report aggregated probe requests per device. Each record becomes one
//! [`Reading`] on the sensor backed by that access point.

use crate::core::types::{GeoCoordinate, Reading};
use crate::processing::sensor::SensorNode;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Probe-request summary for one device as reported by one access point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub access_points_id: u32,
    pub mac: String,
    #[serde(default)]
    pub count: u32,
    pub min_signal: f64,
    pub max_signal: f64,
    pub avg_signal: f64,
    /// Milliseconds since the epoch
    pub first_seen: u64,
    pub last_seen: u64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    /// Location uncertainty reported with `lat`/`lng`
    #[serde(default)]
    pub unc: Option<f64>,
}

impl ProbeRecord {
    /// Reading carrying the strongest signal of the record
    pub fn to_reading(&self) -> Reading {
        let reading = Reading::new(self.mac.as_str(), self.max_signal, self.last_seen);
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => reading.with_geo(lat, lng),
            _ => reading,
        }
    }

    pub fn geo(&self) -> Option<GeoCoordinate> {
        Some(GeoCoordinate {
            lat: self.lat?,
            lng: self.lng?,
        })
    }
}

/// Which devices a sensor keeps readings for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestFilter {
    reference_ids: HashSet<String>,
    ignored_ids: HashSet<String>,
}

impl IngestFilter {
    pub fn new<R, I>(reference_ids: R, ignored_ids: I) -> Self
    where
        R: IntoIterator,
        R::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            reference_ids: reference_ids.into_iter().map(|id| id.as_ref().to_lowercase()).collect(),
            ignored_ids: ignored_ids.into_iter().map(|id| id.as_ref().to_lowercase()).collect(),
        }
    }

    /// Reference devices are always kept; anything else unless ignored
    pub fn accepts(&self, device_id: &str) -> bool {
        let id = device_id.to_lowercase();
        self.reference_ids.contains(&id) || !self.ignored_ids.contains(&id)
    }

    pub fn is_reference(&self, device_id: &str) -> bool {
        self.reference_ids.contains(&device_id.to_lowercase())
    }
}

/// Replace every sensor's readings with the records of its access point.
///
/// Sensors without an access point end up with an empty window. Returns the number
/// of readings stored.
pub fn route_records(sensors: &mut [SensorNode], records: &[ProbeRecord], filter: &IngestFilter) -> usize {
    let mut stored = 0;
    for sensor in sensors.iter_mut() {
        let readings: Vec<Reading> = match sensor.access_point_id {
            Some(ap) => records
                .iter()
                .filter(|r| r.access_points_id == ap)
                .filter(|r| filter.accepts(&r.mac))
                .map(ProbeRecord::to_reading)
                .collect(),
            None => Vec::new(),
        };
        debug!("sensor {}: {} readings in window", sensor.id, readings.len());
        stored += readings.len();
        sensor.set_readings(readings);
    }
    stored
}

/// Lower-cased hex octets of a MAC address, tolerating `:`, `-` and `.` separators
fn octets(mac: &str) -> Option<Vec<u8>> {
    let hex: String = mac.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if hex.len() != 12 || mac.chars().any(|c| !(c.is_ascii_hexdigit() || matches!(c, ':' | '-' | '.'))) {
        return None;
    }
    (0..6)
        .map(|i| u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok())
        .collect()
}

/// Organizationally unique identifier of a MAC address as `aa:bb:cc`
pub fn oui(mac: &str) -> Option<String> {
    let bytes = octets(mac)?;
    Some(format!("{:02x}:{:02x}:{:02x}", bytes[0], bytes[1], bytes[2]))
}

fn normalize_prefix(prefix: &str) -> String {
    let hex: String = prefix
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    hex.as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

/// Whether a MAC address looks locally administered (randomized) rather than vendor-assigned.
///
/// The locally-administered bit of the first octet must be set and the OUI must not
/// belong to a known vendor.
pub fn is_possibly_randomized<S: AsRef<str>>(mac: &str, known_vendor_prefixes: &[S]) -> bool {
    let Some(bytes) = octets(mac) else {
        return false;
    };
    if bytes[0] & 0x02 == 0 {
        return false;
    }
    let Some(prefix) = oui(mac) else {
        return false;
    };
    !known_vendor_prefixes
        .iter()
        .any(|known| normalize_prefix(known.as_ref()) == prefix)
}
