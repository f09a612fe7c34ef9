//! JSON road-network input for the hierarchy builder
//!
//! ```json
//! {
//!   "vertices": [{ "lat": 50.85, "lon": 4.35 }, { "lat": 50.86, "lon": 4.36 }],
//!   "edges": [
//!     { "source": 0, "target": 1, "weight": 120, "name": "Rue Neuve",
//!       "oneway": false, "waypoints": [[50.855, 4.354]] }
//!   ]
//! }
//! ```
//!
//! A missing `weight` is derived from the haversine length of the polyline
//! in meters. Two-way edges (`oneway: false`, the default) are added in both
//! directions.

use std::path::Path;

use serde::{Deserialize, Serialize};
use skyway_common::Coordinate;

use crate::error::ImportError;
use crate::graph::{HierarchyBuilder, InputEdge, Level};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexInput {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeInput {
    pub source: u32,
    pub target: u32,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
    #[serde(default)]
    pub roundabout: bool,
    #[serde(default)]
    pub motorway_link: bool,
    #[serde(default)]
    pub oneway: bool,
    /// Intermediate `[lat, lon]` points, source and target excluded
    #[serde(default)]
    pub waypoints: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphInput {
    pub vertices: Vec<VertexInput>,
    #[serde(default)]
    pub edges: Vec<EdgeInput>,
    /// Explicit per-vertex levels; omitted means contraction picks them
    #[serde(default)]
    pub levels: Option<Vec<Level>>,
}

impl GraphInput {
    pub fn from_json_str(s: &str) -> Result<Self, ImportError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Load every vertex and edge into a fresh builder
    pub fn into_builder(self) -> Result<HierarchyBuilder, ImportError> {
        let mut builder = HierarchyBuilder::new();
        let mut coords = Vec::with_capacity(self.vertices.len());

        for (index, v) in self.vertices.iter().enumerate() {
            let c = Coordinate::from_degrees(v.lat, v.lon).map_err(|source| {
                ImportError::Coordinate {
                    what: "vertex",
                    index,
                    source,
                }
            })?;
            builder.add_vertex(c);
            coords.push(c);
        }

        for (index, e) in self.edges.into_iter().enumerate() {
            let waypoints = e
                .waypoints
                .iter()
                .map(|&[lat, lon]| Coordinate::from_degrees(lat, lon))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| ImportError::Coordinate {
                    what: "edge",
                    index,
                    source,
                })?;

            // Unknown endpoints are reported by the builder
            let weight = match e.weight {
                Some(w) => w,
                None => match (coords.get(e.source as usize), coords.get(e.target as usize)) {
                    (Some(&s), Some(&t)) => polyline_weight(s, &waypoints, t),
                    _ => 0,
                },
            };

            let mut edge = InputEdge::new(e.source, e.target, weight).with_waypoints(waypoints);
            if let Some(name) = e.name {
                edge = edge.named(name);
            }
            if let Some(reference) = e.reference {
                edge = edge.with_ref(reference);
            }
            if e.roundabout {
                edge = edge.roundabout();
            }
            if e.motorway_link {
                edge = edge.motorway_link();
            }

            if e.oneway {
                builder.add_edge(edge);
            } else {
                builder.add_two_way(edge);
            }
        }

        Ok(match self.levels {
            Some(levels) => builder.with_levels(levels),
            None => builder,
        })
    }
}

/// Length of `source -> waypoints -> target` in whole meters, at least 1
fn polyline_weight(source: Coordinate, waypoints: &[Coordinate], target: Coordinate) -> u32 {
    let mut length = 0.0;
    let mut prev = source;
    for &point in waypoints.iter().chain(std::iter::once(&target)) {
        length += prev.distance_m(&point);
        prev = point;
    }
    (length.round() as u32).max(1)
}
