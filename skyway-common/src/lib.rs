//! Common utilities for the skyway routing toolkit

pub mod coord;

pub use coord::{haversine_m, BoundingBox, CoordError, Coordinate, EARTH_RADIUS_M, SCALE};
