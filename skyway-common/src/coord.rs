//! Fixed-point coordinates and great-circle distances

use std::fmt;
use std::num::ParseFloatError;
use std::str::FromStr;

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed-point scale: 1e-7 degrees per unit
pub const SCALE: f64 = 10_000_000.0;

/// Mean earth radius used by the haversine formula, in meters
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordError {
    #[error("coordinate must be in format 'lat,lon', got '{0}'")]
    Format(String),

    #[error("invalid number '{input}' in coordinate")]
    InvalidNumber {
        input: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("coordinate out of range: lat={lat}, lon={lon}")]
    OutOfRange { lat: f64, lon: f64 },
}

/// A WGS84 position stored as 1e-7 degree integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat_fxp: i32,
    pub lon_fxp: i32,
}

impl Coordinate {
    pub const fn from_fixed(lat_fxp: i32, lon_fxp: i32) -> Self {
        Self { lat_fxp, lon_fxp }
    }

    /// Convert from degrees, rejecting non-finite and out-of-range values.
    pub fn from_degrees(lat: f64, lon: f64) -> Result<Self, CoordError> {
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return Err(CoordError::OutOfRange { lat, lon });
        }
        Ok(Self {
            lat_fxp: (lat * SCALE).round() as i32,
            lon_fxp: (lon * SCALE).round() as i32,
        })
    }

    pub fn lat(&self) -> f64 {
        self.lat_fxp as f64 / SCALE
    }

    pub fn lon(&self) -> f64 {
        self.lon_fxp as f64 / SCALE
    }

    /// geo point with x = longitude, y = latitude
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.lon(), self.lat())
    }

    /// Great-circle distance in meters
    pub fn distance_m(&self, other: &Coordinate) -> f64 {
        haversine_m(self.to_point(), other.to_point())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.7},{:.7}", self.lat(), self.lon())
    }
}

impl FromStr for Coordinate {
    type Err = CoordError;

    /// Parse "lat,lon" in degrees
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 2 {
            return Err(CoordError::Format(s.to_string()));
        }
        let parse = |part: &str| {
            part.trim()
                .parse::<f64>()
                .map_err(|source| CoordError::InvalidNumber {
                    input: part.trim().to_string(),
                    source,
                })
        };
        Coordinate::from_degrees(parse(parts[0])?, parse(parts[1])?)
    }
}

/// Haversine distance in meters between two (lon, lat) points
pub fn haversine_m(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine::distance(a, b)
}

/// Axis-aligned box in fixed-point degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: i32,
    pub min_lon: i32,
    pub max_lat: i32,
    pub max_lon: i32,
}

impl BoundingBox {
    /// An inverted box that any `extend` call replaces
    pub const fn empty() -> Self {
        Self {
            min_lat: i32::MAX,
            min_lon: i32::MAX,
            max_lat: i32::MIN,
            max_lon: i32::MIN,
        }
    }

    pub fn from_coords<'a, I>(coords: I) -> Self
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        let mut bbox = Self::empty();
        for c in coords {
            bbox.extend(c);
        }
        bbox
    }

    pub fn is_empty(&self) -> bool {
        self.min_lat > self.max_lat || self.min_lon > self.max_lon
    }

    pub fn extend(&mut self, c: &Coordinate) {
        self.min_lat = self.min_lat.min(c.lat_fxp);
        self.min_lon = self.min_lon.min(c.lon_fxp);
        self.max_lat = self.max_lat.max(c.lat_fxp);
        self.max_lon = self.max_lon.max(c.lon_fxp);
    }

    pub fn contains(&self, c: &Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&c.lat_fxp)
            && (self.min_lon..=self.max_lon).contains(&c.lon_fxp)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_roundtrip() {
        let c = Coordinate::from_degrees(50.8503, 4.3517).unwrap();
        assert_eq!(c.lat_fxp, 508_503_000);
        assert_eq!(c.lon_fxp, 43_517_000);
        assert!((c.lat() - 50.8503).abs() < 1e-9);
        assert!((c.lon() - 4.3517).abs() < 1e-9);
    }

    #[test]
    fn test_parse_coordinate() {
        let c: Coordinate = "43.7384, 7.4246".parse().unwrap();
        assert_eq!(c, Coordinate::from_degrees(43.7384, 7.4246).unwrap());

        assert!(matches!(
            "43.7".parse::<Coordinate>(),
            Err(CoordError::Format(_))
        ));
        assert!(matches!(
            "abc,7.4".parse::<Coordinate>(),
            Err(CoordError::InvalidNumber { .. })
        ));
        assert!(matches!(
            "91.0,7.4".parse::<Coordinate>(),
            Err(CoordError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = Coordinate::from_degrees(0.0, 0.0).unwrap();
        let b = Coordinate::from_degrees(1.0, 0.0).unwrap();
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert!((a.distance_m(&b) - expected).abs() < 1.0);
        assert_eq!(a.distance_m(&a), 0.0);
    }

    #[test]
    fn test_bbox_extend_and_contains() {
        let coords = [
            Coordinate::from_fixed(10, 20),
            Coordinate::from_fixed(-5, 40),
            Coordinate::from_fixed(7, -3),
        ];
        let bbox = BoundingBox::from_coords(&coords);
        assert_eq!(bbox.min_lat, -5);
        assert_eq!(bbox.max_lon, 40);
        assert!(coords.iter().all(|c| bbox.contains(c)));
        assert!(!bbox.contains(&Coordinate::from_fixed(11, 0)));
        assert!(BoundingBox::empty().is_empty());
    }
}
