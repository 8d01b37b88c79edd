use serde::{Deserialize, Serialize};

/// Geographic bounding box in degrees, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl GeoBounds {
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Self {
        debug_assert!(south <= north, "south above north");
        debug_assert!(west <= east, "west beyond east");
        Self { south, north, west, east }
    }

    /// Bounding box centered on (lat, lon) spanning the given extent in km,
    /// using the local meters-per-degree at the center latitude.
    pub fn around(lat: f64, lon: f64, width_km: f64, height_km: f64) -> Self {
        let dlat = height_km / 2.0 / 111.32;
        let dlon = width_km / 2.0 / (111.32 * lat.to_radians().cos().max(1e-6));
        Self::new(lat - dlat, lat + dlat, lon - dlon, lon + dlon)
    }

    #[inline] pub fn lat_span(&self) -> f64 { self.north - self.south }
    #[inline] pub fn lon_span(&self) -> f64 { self.east - self.west }

    #[inline]
    pub fn center(&self) -> (f64, f64) {
        ((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }

    #[inline]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }

    pub fn intersects(&self, other: &GeoBounds) -> bool {
        self.south <= other.north
            && self.north >= other.south
            && self.west <= other.east
            && self.east >= other.west
    }

    /// Grow by `dlat`/`dlon` degrees on each side (clamped to valid ranges).
    pub fn expanded(&self, dlat: f64, dlon: f64) -> Self {
        Self {
            south: (self.south - dlat).max(-90.0),
            north: (self.north + dlat).min(90.0),
            west: (self.west - dlon).max(-180.0),
            east: (self.east + dlon).min(180.0),
        }
    }

    /// Approximate width at the center latitude, in km.
    pub fn width_km(&self) -> f64 {
        let (lat, _) = self.center();
        self.lon_span() * 111.32 * lat.to_radians().cos().abs()
    }

    pub fn height_km(&self) -> f64 {
        self.lat_span() * 111.32
    }
}
