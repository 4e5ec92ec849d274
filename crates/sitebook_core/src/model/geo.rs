//! Geographic coordinates and great-circle distance.
//!
//! # Invariants
//! - Valid latitude is within `[-90, 90]`, valid longitude within `[-180, 180]`.
//! - Distances are computed on a spherical earth (mean radius).

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// IUGG mean earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Scale used to round coordinates to 4 decimals (~11 m at the equator).
const ROUNDING_SCALE: f64 = 10_000.0;

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Coordinate validation failure.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateError {
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
}

impl Display for CoordinateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LatitudeOutOfRange(value) => {
                write!(f, "latitude {value} is outside [-90, 90]")
            }
            Self::LongitudeOutOfRange(value) => {
                write!(f, "longitude {value} is outside [-180, 180]")
            }
        }
    }
}

impl Error for CoordinateError {}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Checks both axes; NaN is rejected as out of range.
    pub fn validate(&self) -> Result<(), CoordinateError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }

    /// Integer key of the pair rounded to 4 decimals.
    pub fn rounded_key(&self) -> (i64, i64) {
        (
            (self.latitude * ROUNDING_SCALE).round() as i64,
            (self.longitude * ROUNDING_SCALE).round() as i64,
        )
    }

    /// Haversine distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}
