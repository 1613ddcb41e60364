//! Geographic coordinates and the small amount of math the fleet needs.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geographic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
}

impl Coordinate {
    /// Create a coordinate
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Linear interpolation towards `to`.
    ///
    /// `progress` is clamped to `[0, 1]`; the endpoints are returned exactly.
    pub fn lerp(self, to: Coordinate, progress: f64) -> Coordinate {
        if progress <= 0.0 {
            return self;
        }
        if progress >= 1.0 {
            return to;
        }
        Coordinate {
            lat: self.lat + (to.lat - self.lat) * progress,
            lon: self.lon + (to.lon - self.lon) * progress,
        }
    }

    /// Great-circle distance in meters (haversine)
    pub fn distance_m(self, other: Coordinate) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}
