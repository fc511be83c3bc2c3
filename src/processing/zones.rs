//! Zone occupancy aggregation

use crate::core::device::Device;
use crate::core::types::ZoneHeadcount;
use crate::core::zone::Zone;
use log::debug;

/// Recount every zone from the occupants' estimates at `timestamp_ms`.
///
/// Reference devices and hidden devices are never counted. An occupant inside
/// overlapping zones counts toward each of them.
pub fn aggregate_zones(zones: &mut [Zone], occupants: &[Device], timestamp_ms: u64) -> Vec<ZoneHeadcount> {
    zones.iter_mut().for_each(Zone::reset);

    for occupant in occupants.iter().filter(|o| o.is_countable()) {
        let Some(position) = occupant.position_at(timestamp_ms) else {
            continue;
        };
        for zone in zones.iter_mut() {
            zone.add_headcount(&position);
        }
    }

    let summary: Vec<ZoneHeadcount> = zones.iter().map(Zone::summary).collect();
    debug!("zone headcounts at {}: {:?}", timestamp_ms, summary);
    summary
}

pub fn total_headcount(zones: &[Zone]) -> u32 {
    zones.iter().map(Zone::headcount).sum()
}
