//! Identity consolidation.
//!
//! Devices that randomize their MAC address show up as many short-lived identifiers.
//! Those estimated close together at one timestamp are merged into a single
//! pseudo-occupant. Grouping is single-pass and greedy: a candidate joins the first
//! group holding any member within the radius, so membership depends on input order
//! and two members of one group may be further apart than the radius.

use crate::core::device::Device;
use log::debug;

/// Group the visible randomized devices estimated at `timestamp_ms`, returning indices into `devices`
pub fn group_randomized(
    devices: &[Device],
    timestamp_ms: u64,
    pixels_to_meters: f64,
    radius_m: f64,
) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();

    let candidates = devices
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_randomized && !d.is_hidden && d.has_estimate(timestamp_ms));

    for (index, candidate) in candidates {
        let joined = groups.iter_mut().find(|group| {
            group.iter().any(|&member| {
                devices[member]
                    .distance_to(candidate, timestamp_ms, pixels_to_meters)
                    .map_or(false, |d| d < radius_m)
            })
        });

        match joined {
            Some(group) => group.push(index),
            None => groups.push(vec![index]),
        }
    }

    groups
}

/// Pseudo-occupant standing in for a group of two or more devices
fn pseudo_occupant(members: &[&Device], timestamp_ms: u64) -> Option<Device> {
    let first = members.first()?;
    let estimate = first.estimate_at(timestamp_ms)?;

    let mut pseudo = Device::new(first.id.clone());
    pseudo.name = format!("PSEUDO ({})", members.len());
    pseudo.is_pseudo = true;
    pseudo.member_ids = members.iter().map(|m| m.id.clone()).collect();
    pseudo.set_estimate(*estimate);
    Some(pseudo)
}

/// Replace the randomized devices estimated at `timestamp_ms` by consolidated occupants.
///
/// Singleton groups pass through unchanged; larger groups become a pseudo-occupant
/// positioned at its first member.
pub fn consolidate_identities(
    devices: &[Device],
    timestamp_ms: u64,
    pixels_to_meters: f64,
    radius_m: f64,
) -> Vec<Device> {
    let groups = group_randomized(devices, timestamp_ms, pixels_to_meters, radius_m);
    let mut occupants = Vec::with_capacity(groups.len());

    for group in &groups {
        let members: Vec<&Device> = group.iter().map(|&i| &devices[i]).collect();
        if members.len() == 1 {
            occupants.push(members[0].clone());
        } else if let Some(pseudo) = pseudo_occupant(&members, timestamp_ms) {
            debug!("consolidated {:?} into {}", pseudo.member_ids, pseudo.name);
            occupants.push(pseudo);
        }
    }

    occupants
}
