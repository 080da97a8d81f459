//! Zone containment queries over admin-provided boundary polygons.

use crate::geometry::{polygon_contains_point, ring_is_valid, GeoPoint, MIN_RING_VERTICES};
use crate::models::{Hunt, Zone};

use super::error::HuntError;

/// Zones are fetched and parsed once at construction; every containment test
/// after that runs in process over the vertex arrays.
#[derive(Debug, Clone)]
pub struct ZoneDirectory {
    zones: Vec<Zone>,
}

impl ZoneDirectory {
    pub fn new(zones: Vec<Zone>) -> Result<Self, HuntError> {
        for zone in &zones {
            if !ring_is_valid(&zone.boundary) {
                return Err(HuntError::Validation {
                    field: "boundary".to_string(),
                    reason: format!(
                        "zone {} boundary needs at least {} vertices, got {}",
                        zone.zone_id,
                        MIN_RING_VERTICES,
                        zone.boundary.len()
                    ),
                });
            }
        }
        Ok(Self { zones })
    }

    pub fn zone(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.zone_id == zone_id)
    }

    /// First zone whose boundary contains the point. Zones are not expected
    /// to overlap; if they do, directory order decides.
    pub fn locate(&self, point: GeoPoint) -> Option<&Zone> {
        self.zones
            .iter()
            .find(|zone| polygon_contains_point(&zone.boundary, point))
    }

    /// Whether the hunt's own location sits inside its configured zone. A
    /// mismatch means the reference data is corrupt, not that the caller did
    /// anything wrong.
    pub fn hunt_in_zone(&self, hunt: &Hunt) -> bool {
        self.zone(&hunt.zone_id)
            .map(|zone| polygon_contains_point(&zone.boundary, hunt.location))
            .unwrap_or(false)
    }
}
