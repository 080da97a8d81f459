use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon_deg: f64,
    pub lat_deg: f64,
}

impl GeoPoint {
    pub fn new(lon_deg: f64, lat_deg: f64) -> Self {
        Self { lon_deg, lat_deg }
    }
}

pub const MIN_RING_VERTICES: usize = 3;

/// A boundary ring is an ordered vertex list, implicitly closed (first vertex
/// is not repeated at the end).
pub fn ring_is_valid(ring: &[GeoPoint]) -> bool {
    ring.len() >= MIN_RING_VERTICES
}

/// Ray-casting parity test: cast a horizontal ray east from the point and
/// count edge crossings; odd means inside. Degenerate rings (< 3 vertices)
/// cannot contain anything. Points exactly on the boundary follow the parity
/// artifact (left/bottom edges of an axis-aligned square test inside, right/top
/// outside); callers must not rely on boundary points either way.
pub fn polygon_contains_point(ring: &[GeoPoint], point: GeoPoint) -> bool {
    if !ring_is_valid(ring) {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[j];
        let straddles = (a.lat_deg > point.lat_deg) != (b.lat_deg > point.lat_deg);
        if straddles {
            let crossing_lon = (b.lon_deg - a.lon_deg) * (point.lat_deg - a.lat_deg)
                / (b.lat_deg - a.lat_deg)
                + a.lon_deg;
            if point.lon_deg < crossing_lon {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
