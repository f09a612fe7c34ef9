//! Spatial index for snapping coordinates to vertices and edges

use std::cmp::Ordering;
use std::f64::consts::FRAC_PI_2;

use geo::{Closest, ClosestPoint, LineString, Point};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use skyway_common::{haversine_m, BoundingBox, Coordinate, EARTH_RADIUS_M};

use crate::graph::{EdgeId, HighwayHierarchyGraph, VertexId};

/// Vertex position in the R-tree
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexedVertex {
    pub coords: [f64; 2], // [lon, lat]
    pub id: VertexId,
}

impl RTreeObject for IndexedVertex {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedVertex {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.coords[0] - point[0];
        let dy = self.coords[1] - point[1];
        dx * dx + dy * dy
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.coords == *point
    }
}

/// Bounding box of one base edge's polyline
#[derive(Clone, Debug, PartialEq)]
pub struct IndexedEdge {
    envelope: AABB<[f64; 2]>,
    pub id: EdgeId,
}

impl RTreeObject for IndexedEdge {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Closest point on a road segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSnap {
    pub edge: EdgeId,
    pub point: Coordinate,
    pub distance_m: f64,
}

pub struct SpatialIndex {
    vertices: RTree<IndexedVertex>,
    edges: RTree<IndexedEdge>,
}

impl SpatialIndex {
    /// Build from every vertex (the level-0 set) and every base edge that
    /// carries intermediate geometry
    pub fn build(graph: &HighwayHierarchyGraph) -> Self {
        let points: Vec<IndexedVertex> = graph
            .vertices()
            .map(|v| IndexedVertex {
                coords: [v.coordinate.lon(), v.coordinate.lat()],
                id: v.id,
            })
            .collect();

        let segments: Vec<IndexedEdge> = graph
            .edges()
            .filter(|e| !e.is_shortcut() && !e.waypoints.is_empty())
            .filter_map(|e| {
                let line = polyline(graph, e.id)?;
                let coords: Vec<[f64; 2]> = line.points().map(|p| [p.x(), p.y()]).collect();
                Some(IndexedEdge {
                    envelope: AABB::from_points(coords.iter()),
                    id: e.id,
                })
            })
            .collect();

        tracing::debug!(
            vertices = points.len(),
            edges = segments.len(),
            "built spatial index"
        );
        Self {
            vertices: RTree::bulk_load(points),
            edges: RTree::bulk_load(segments),
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.size()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.size() == 0
    }

    /// Closest vertex by great-circle distance within `max_radius_m`.
    /// Equidistant candidates resolve to the lowest id.
    pub fn nearest(&self, coordinate: Coordinate, max_radius_m: f64) -> Option<VertexId> {
        self.nearest_with_distance(coordinate, max_radius_m)
            .map(|(id, _)| id)
    }

    pub fn nearest_with_distance(
        &self,
        coordinate: Coordinate,
        max_radius_m: f64,
    ) -> Option<(VertexId, f64)> {
        let envelope = search_envelope(&coordinate, max_radius_m)?;
        let query = coordinate.to_point();
        self.vertices
            .locate_in_envelope(&envelope)
            .map(|v| (v.id, haversine_m(query, Point::new(v.coords[0], v.coords[1]))))
            .filter(|&(_, d)| d <= max_radius_m)
            .min_by(closest_then_lowest_id)
    }

    /// Vertices inside `bbox`, edges inclusive, in id order
    pub fn vertices_within(&self, bbox: &BoundingBox) -> Vec<VertexId> {
        if bbox.is_empty() {
            return Vec::new();
        }
        let lower = Coordinate::from_fixed(bbox.min_lat, bbox.min_lon);
        let upper = Coordinate::from_fixed(bbox.max_lat, bbox.max_lon);
        let envelope = AABB::from_corners([lower.lon(), lower.lat()], [upper.lon(), upper.lat()]);
        let mut ids: Vec<VertexId> = self
            .vertices
            .locate_in_envelope(&envelope)
            .map(|v| v.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Closest point on a base edge with intermediate waypoints within
    /// `max_radius_m`. Straight edges without geometry are never returned.
    ///
    /// Projection happens in degree space, the reported distance is haversine.
    pub fn nearest_edge(
        &self,
        graph: &HighwayHierarchyGraph,
        coordinate: Coordinate,
        max_radius_m: f64,
    ) -> Option<EdgeSnap> {
        let envelope = search_envelope(&coordinate, max_radius_m)?;
        let query = coordinate.to_point();

        self.edges
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| {
                let line = polyline(graph, candidate.id)?;
                let p = match line.closest_point(&query) {
                    Closest::Intersection(p) | Closest::SinglePoint(p) => p,
                    Closest::Indeterminate => return None,
                };
                Some((candidate.id, p, haversine_m(query, p)))
            })
            .filter(|&(_, _, d)| d <= max_radius_m)
            .min_by(|a, b| closest_then_lowest_id(&(a.0, a.2), &(b.0, b.2)))
            .and_then(|(edge, p, distance_m)| {
                Some(EdgeSnap {
                    edge,
                    point: Coordinate::from_degrees(p.y(), p.x()).ok()?,
                    distance_m,
                })
            })
    }
}

fn closest_then_lowest_id(a: &(u32, f64), b: &(u32, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

/// Full polyline of a base edge: source, waypoints, target (lon/lat degrees)
fn polyline(graph: &HighwayHierarchyGraph, id: EdgeId) -> Option<LineString<f64>> {
    let edge = graph.edge(id).ok()?;
    let source = graph.vertex(edge.source).ok()?.coordinate;
    let target = graph.vertex(edge.target).ok()?.coordinate;
    let coords: Vec<(f64, f64)> = std::iter::once(&source)
        .chain(graph.waypoints(&edge))
        .chain(std::iter::once(&target))
        .map(|c| (c.lon(), c.lat()))
        .collect();
    Some(LineString::from(coords))
}

/// Degree box guaranteed to contain every point within `radius_m`.
///
/// Haversine distance is at least R * |dlat| and, for |dlon| <= pi, at least
/// (2/pi) * R * cos(lat) * |dlon| with lat the latitude closest to a pole.
fn search_envelope(c: &Coordinate, radius_m: f64) -> Option<AABB<[f64; 2]>> {
    if !radius_m.is_finite() || radius_m < 0.0 {
        return None;
    }
    let dlat = (radius_m / EARTH_RADIUS_M).to_degrees() * 1.001;
    let extreme = (c.lat().abs() + dlat).min(90.0);
    let dlon = if extreme >= 90.0 {
        180.0
    } else {
        (FRAC_PI_2 * dlat / extreme.to_radians().cos()).min(180.0)
    };
    Some(AABB::from_corners(
        [c.lon() - dlon, c.lat() - dlat],
        [c.lon() + dlon, c.lat() + dlat],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{HierarchyBuilder, InputEdge};
    use rstar::Envelope;

    fn deg(lat: f64, lon: f64) -> Coordinate {
        Coordinate::from_degrees(lat, lon).unwrap()
    }

    /// Four vertices on a square around the origin plus one far away
    fn square() -> HighwayHierarchyGraph {
        let mut b = HierarchyBuilder::new();
        b.add_vertex(deg(0.001, 0.0));
        b.add_vertex(deg(0.0, 0.001));
        b.add_vertex(deg(-0.001, 0.0));
        b.add_vertex(deg(0.0, -0.001));
        b.add_vertex(deg(10.0, 10.0));
        b.add_two_way(InputEdge::new(0, 1, 10).with_waypoints(vec![deg(0.001, 0.001)]));
        b.add_two_way(InputEdge::new(2, 3, 10));
        b.with_levels(vec![0; 5]).build().unwrap().graph
    }

    #[test]
    fn test_nearest_vertex_within_radius() {
        let g = square();
        let idx = SpatialIndex::build(&g);
        assert_eq!(idx.len(), 5);

        assert_eq!(idx.nearest(deg(0.0009, 0.0), 50.0), Some(0));
        assert_eq!(idx.nearest(deg(9.9999, 10.0), 50.0), Some(4));
        // 0.001 deg is ~111 m away
        assert_eq!(idx.nearest(deg(0.0, 0.0), 100.0), None);
        assert_eq!(idx.nearest(deg(0.0, 0.0), -1.0), None);
        assert_eq!(idx.nearest(deg(0.0, 0.0), f64::NAN), None);
    }

    #[test]
    fn test_equidistant_tie_picks_lowest_id() {
        let g = square();
        let idx = SpatialIndex::build(&g);
        // The origin is equidistant from vertices 0..4
        for _ in 0..3 {
            assert_eq!(idx.nearest(deg(0.0, 0.0), 200.0), Some(0));
        }
    }

    #[test]
    fn test_nearest_edge_projects_onto_polyline() {
        let g = square();
        let idx = SpatialIndex::build(&g);

        // Just outside the corner waypoint of the 0 <-> 1 polyline
        let snap = idx.nearest_edge(&g, deg(0.0011, 0.0005), 50.0).unwrap();
        let edge = g.edge(snap.edge).unwrap();
        assert_eq!((edge.source.min(edge.target), edge.source.max(edge.target)), (0, 1));
        assert!((snap.point.lat() - 0.001).abs() < 1e-6);
        assert!(snap.distance_m < 15.0);

        assert!(idx.nearest_edge(&g, deg(5.0, 5.0), 1000.0).is_none());
    }

    #[test]
    fn test_nearest_edge_skips_edges_without_geometry() {
        let mut b = HierarchyBuilder::new();
        b.add_vertex(deg(0.0, -0.001));
        b.add_vertex(deg(0.0, 0.001));
        b.add_vertex(deg(0.002, -0.001));
        b.add_vertex(deg(0.002, 0.001));
        b.add_edge(InputEdge::new(0, 1, 10));
        b.add_edge(InputEdge::new(2, 3, 10).with_waypoints(vec![deg(0.002, 0.0)]));
        let g = b.with_levels(vec![0; 4]).build().unwrap().graph;
        let idx = SpatialIndex::build(&g);

        // The straight 0 -> 1 edge passes right under the query point
        let snap = idx.nearest_edge(&g, deg(0.0001, 0.0), 1000.0).unwrap();
        let edge = g.edge(snap.edge).unwrap();
        assert_eq!((edge.source, edge.target), (2, 3));
        assert!(!edge.waypoints.is_empty());
        assert!(snap.distance_m > 200.0);

        assert!(idx.nearest_edge(&g, deg(0.0001, 0.0), 100.0).is_none());
    }

    #[test]
    fn test_vertices_within_box() {
        let g = square();
        let idx = SpatialIndex::build(&g);

        let around_origin = BoundingBox::from_coords(&[deg(-0.001, -0.001), deg(0.001, 0.001)]);
        assert_eq!(idx.vertices_within(&around_origin), vec![0, 1, 2, 3]);

        // Edges of the box are inclusive
        let north_east = BoundingBox::from_coords(&[deg(0.0, 0.0), deg(0.001, 0.001)]);
        assert_eq!(idx.vertices_within(&north_east), vec![0, 1]);

        assert_eq!(idx.vertices_within(&g.bounding_box()), vec![0, 1, 2, 3, 4]);
        assert!(idx.vertices_within(&BoundingBox::empty()).is_empty());
    }

    #[test]
    fn test_envelope_contains_radius_at_high_latitude() {
        let c = deg(80.0, 0.0);
        let env = search_envelope(&c, 10_000.0).unwrap();
        // A point 9.9 km due east must fall inside
        let lon_step = (9_900.0 / (EARTH_RADIUS_M * 80f64.to_radians().cos())).to_degrees();
        assert!(env.contains_point(&[lon_step, 80.0]));
    }
}
