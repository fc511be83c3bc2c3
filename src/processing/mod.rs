//! Reading storage, telemetry ingestion and zone aggregation

pub mod sensor;
pub mod telemetry;
pub mod zones;

pub use sensor::{SensorNode, SignalSample};
pub use telemetry::{is_possibly_randomized, route_records, IngestFilter, ProbeRecord};
pub use zones::{aggregate_zones, total_headcount};
