use crate::{ProximityError, Result, utils};
use geo::Point;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A WGS84 position in degrees
///
/// Latitude lies in [-90, 90] and longitude in [-180, 180]. Use [`Coordinate::new`] for
/// untrusted input; [`Coordinate::new_unchecked`] skips validation and callers that accept
/// such values should run [`Coordinate::validate`] before computing distances.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite values
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let coordinate = Self::new_unchecked(latitude, longitude);
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Create a coordinate without range checks (for trusted input)
    #[inline]
    pub const fn new_unchecked(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Re-check the WGS84 invariant
    pub fn validate(&self) -> Result<()> {
        if utils::is_valid_wgs84(self.latitude, self.longitude) {
            Ok(())
        } else {
            Err(ProximityError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Distance in meters to another coordinate
    #[inline]
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        utils::haversine_distance(*self, *other)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

impl From<Coordinate> for Point<f64> {
    fn from(coordinate: Coordinate) -> Self {
        Point::new(coordinate.longitude, coordinate.latitude)
    }
}

impl TryFrom<Point<f64>> for Coordinate {
    type Error = ProximityError;

    fn try_from(point: Point<f64>) -> Result<Self> {
        Coordinate::new(point.y(), point.x())
    }
}
