//! Occupancy zones

use crate::core::types::{MapPoint, ZoneHeadcount};
use serde::{Deserialize, Serialize};

/// Four-cornered region of the floor plan with an occupancy counter.
///
/// The region test compares the point against each corner independently, so it is
/// only exact for axis-aligned, unrotated rectangles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: u32,
    pub top_left: MapPoint,
    pub top_right: MapPoint,
    pub bottom_right: MapPoint,
    pub bottom_left: MapPoint,
    headcount: u32,
}

impl Zone {
    pub fn new(
        id: u32,
        top_left: MapPoint,
        top_right: MapPoint,
        bottom_right: MapPoint,
        bottom_left: MapPoint,
    ) -> Self {
        Self {
            id,
            top_left,
            top_right,
            bottom_right,
            bottom_left,
            headcount: 0,
        }
    }

    /// Axis-aligned rectangle spanning two opposite corners
    pub fn rectangle(id: u32, top_left: MapPoint, bottom_right: MapPoint) -> Self {
        Self::new(
            id,
            top_left,
            MapPoint::new(bottom_right.x, top_left.y),
            bottom_right,
            MapPoint::new(top_left.x, bottom_right.y),
        )
    }

    pub fn contains(&self, point: &MapPoint) -> bool {
        let (x, y) = (point.x, point.y);

        if x < self.top_left.x || y < self.top_left.y {
            return false;
        }
        if x > self.top_right.x || y < self.top_right.y {
            return false;
        }
        if x > self.bottom_right.x || y > self.bottom_right.y {
            return false;
        }
        if x < self.bottom_left.x || y > self.bottom_left.y {
            return false;
        }

        true
    }

    pub fn reset(&mut self) {
        self.headcount = 0;
    }

    /// Count an occupant at `point` if it lies inside the zone
    pub fn add_headcount(&mut self, point: &MapPoint) -> bool {
        if !self.contains(point) {
            return false;
        }
        self.headcount += 1;
        true
    }

    pub fn headcount(&self) -> u32 {
        self.headcount
    }

    pub fn summary(&self) -> ZoneHeadcount {
        ZoneHeadcount {
            headcount: self.headcount,
            zone_id: self.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Zone {
        Zone::new(
            1,
            MapPoint::new(0.0, 0.0),
            MapPoint::new(10.0, 0.0),
            MapPoint::new(10.0, 10.0),
            MapPoint::new(0.0, 10.0),
        )
    }

    #[test]
    fn test_contains_inside_and_edges() {
        let zone = square();
        assert!(zone.contains(&MapPoint::new(5.0, 5.0)));
        assert!(zone.contains(&MapPoint::new(0.0, 0.0)));
        assert!(zone.contains(&MapPoint::new(10.0, 10.0)));
        assert!(!zone.contains(&MapPoint::new(15.0, 5.0)));
        assert!(!zone.contains(&MapPoint::new(5.0, -0.5)));
    }

    #[test]
    fn test_headcount_increment_and_reset() {
        let mut zone = square();
        assert!(zone.add_headcount(&MapPoint::new(5.0, 5.0)));
        assert!(!zone.add_headcount(&MapPoint::new(15.0, 5.0)));
        assert_eq!(zone.headcount(), 1);

        zone.reset();
        assert_eq!(zone.headcount(), 0);
    }

    #[test]
    fn test_skewed_corners_use_independent_comparisons() {
        // Top edge slopes down to the right; the test does not interpolate along it.
        let zone = Zone::new(
            2,
            MapPoint::new(0.0, 0.0),
            MapPoint::new(10.0, 4.0),
            MapPoint::new(10.0, 10.0),
            MapPoint::new(0.0, 10.0),
        );
        assert!(!zone.contains(&MapPoint::new(1.0, 1.0)));
        assert!(zone.contains(&MapPoint::new(1.0, 5.0)));
    }

    #[test]
    fn test_rectangle_constructor() {
        let zone = Zone::rectangle(3, MapPoint::new(2.0, 2.0), MapPoint::new(4.0, 6.0));
        assert_eq!(zone.top_right, MapPoint::new(4.0, 2.0));
        assert_eq!(zone.bottom_left, MapPoint::new(2.0, 6.0));
        assert_eq!(zone.summary().zone_id, 3);
    }
}
