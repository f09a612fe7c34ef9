//! Query entry point: owns the resident graph, the spatial index and the
//! handle pool.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use parking_lot::Mutex;
use serde::Serialize;
use skyway_common::{BoundingBox, Coordinate};

use crate::config::RouterConfig;
use crate::error::{OpenError, RouterError};
use crate::formats::GraphFile;
use crate::graph::{Edge, EdgeId, HighwayHierarchyGraph, Vertex, VertexId};
use crate::pool::{EdgeHandle, ObjectPool, PoolStats, PooledHandle, VertexHandle};
use crate::search::{SearchEngine, SearchResult};
use crate::spatial::{EdgeSnap, SpatialIndex};

/// A route as pooled base-edge handles. Release with [`Router::release_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResult {
    pub edges: Vec<EdgeHandle>,
    pub cost: u32,
}

impl PathResult {
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Renderable view of one base edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSegment {
    pub edge: EdgeId,
    pub name: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub weight: u32,
    pub roundabout: bool,
    pub motorway_link: bool,
    /// [lon, lat] pairs from source to target
    pub coordinates: Vec<[f64; 2]>,
}

pub struct Router {
    graph: HighwayHierarchyGraph,
    spatial: SpatialIndex,
    pool: Mutex<ObjectPool>,
    config: RouterConfig,
}

impl Router {
    /// Load a hierarchy file with default settings and the given read buffer
    pub fn open<P: AsRef<Path>>(path: P, cache_size_bytes: usize) -> Result<Self, OpenError> {
        let config = RouterConfig {
            cache_size_bytes,
            ..Default::default()
        };
        Self::with_config(path, config)
    }

    pub fn with_config<P: AsRef<Path>>(path: P, config: RouterConfig) -> Result<Self, OpenError> {
        config.validate()?;
        let graph = GraphFile::read(path, &config.load_options())?;
        Ok(Self::from_graph_with_config(graph, config))
    }

    /// Serve an already-resident graph
    pub fn from_graph(graph: HighwayHierarchyGraph) -> Self {
        Self::from_graph_with_config(graph, RouterConfig::default())
    }

    pub fn from_graph_with_config(graph: HighwayHierarchyGraph, config: RouterConfig) -> Self {
        let spatial = SpatialIndex::build(&graph);
        let pool = Mutex::new(ObjectPool::with_capacity(config.pool_capacity));
        Self {
            graph,
            spatial,
            pool,
            config,
        }
    }

    pub fn graph(&self) -> &HighwayHierarchyGraph {
        &self.graph
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// `Ok(None)` when no path exists; an empty path only for `source == target`
    pub fn shortest_path(
        &self,
        source: VertexId,
        target: VertexId,
    ) -> Result<Option<PathResult>, RouterError> {
        let result = SearchEngine::new(&self.graph).shortest_path(source, target)?;
        Ok(result.map(|r| self.into_handles(r)))
    }

    pub fn shortest_path_cancellable(
        &self,
        source: VertexId,
        target: VertexId,
        cancel: &AtomicBool,
    ) -> Result<Option<PathResult>, RouterError> {
        let result =
            SearchEngine::new(&self.graph).shortest_path_cancellable(source, target, cancel)?;
        Ok(result.map(|r| self.into_handles(r)))
    }

    /// Search result with raw edges and statistics, no pooling
    pub fn search(&self, source: VertexId, target: VertexId) -> Result<Option<SearchResult>, RouterError> {
        Ok(SearchEngine::new(&self.graph).shortest_path(source, target)?)
    }

    fn into_handles(&self, result: SearchResult) -> PathResult {
        let mut pool = self.pool.lock();
        PathResult {
            edges: result
                .edges
                .into_iter()
                .map(|e| pool.acquire_edge(e))
                .collect(),
            cost: result.cost,
        }
    }

    pub fn nearest_vertex(&self, coordinate: Coordinate, max_radius_m: f64) -> Option<VertexId> {
        self.spatial.nearest(coordinate, max_radius_m)
    }

    pub fn nearest_edge(&self, coordinate: Coordinate, max_radius_m: f64) -> Option<EdgeSnap> {
        self.spatial.nearest_edge(&self.graph, coordinate, max_radius_m)
    }

    /// Extent of every vertex in the graph
    pub fn bounding_box(&self) -> BoundingBox {
        self.graph.bounding_box()
    }

    /// Vertices inside `bbox` in id order, for overlays and rendering
    pub fn vertices_within_box(&self, bbox: &BoundingBox) -> Vec<VertexId> {
        self.spatial.vertices_within(bbox)
    }

    /// Borrow a pooled copy of a vertex
    pub fn vertex(&self, id: VertexId) -> Result<VertexHandle, RouterError> {
        let vertex = self.graph.vertex(id)?;
        Ok(self.pool.lock().acquire_vertex(vertex))
    }

    /// Borrow the base edges leaving a vertex
    pub fn outbound_edges(&self, vertex: VertexHandle) -> Result<Vec<EdgeHandle>, RouterError> {
        let id = self.read_vertex(vertex)?.id;
        let edges: Vec<Edge> = self
            .graph
            .outgoing_edges(id, 0)?
            .filter(|e| !e.is_shortcut())
            .copied()
            .collect();
        let mut pool = self.pool.lock();
        Ok(edges.into_iter().map(|e| pool.acquire_edge(e)).collect())
    }

    pub fn read_vertex(&self, handle: VertexHandle) -> Result<Vertex, RouterError> {
        Ok(*self.pool.lock().vertex(handle)?)
    }

    pub fn read_edge(&self, handle: EdgeHandle) -> Result<Edge, RouterError> {
        Ok(*self.pool.lock().edge(handle)?)
    }

    pub fn segment(&self, handle: EdgeHandle) -> Result<RouteSegment, RouterError> {
        let edge = self.read_edge(handle)?;
        let source = self.graph.vertex(edge.source)?.coordinate;
        let target = self.graph.vertex(edge.target)?.coordinate;
        let coordinates = std::iter::once(&source)
            .chain(self.graph.waypoints(&edge))
            .chain(std::iter::once(&target))
            .map(|c| [c.lon(), c.lat()])
            .collect();

        Ok(RouteSegment {
            edge: edge.id,
            name: self.graph.name(edge.name).map(str::to_string),
            reference: self.graph.name(edge.reference).map(str::to_string),
            weight: edge.weight,
            roundabout: edge.is_roundabout(),
            motorway_link: edge.is_motorway_link(),
            coordinates,
        })
    }

    pub fn release(&self, handle: impl Into<PooledHandle>) -> Result<(), RouterError> {
        Ok(self.pool.lock().release(handle)?)
    }

    /// Release every edge of a path. A stale handle does not stop the rest
    /// from being returned; the first failure is reported afterwards.
    pub fn release_path(&self, path: PathResult) -> Result<(), RouterError> {
        let mut pool = self.pool.lock();
        let mut first_err = None;
        for handle in path.edges {
            if let Err(e) = pool.release(handle) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use crate::graph::{HierarchyBuilder, InputEdge};

    fn assert_send_sync<T: Send + Sync>() {}

    fn router() -> (Router, Vec<VertexId>) {
        let mut b = HierarchyBuilder::new();
        for i in 0..3 {
            b.add_vertex(Coordinate::from_degrees(50.0, 4.0 + 0.01 * i as f64).unwrap());
        }
        b.add_edge(
            InputEdge::new(0, 1, 30)
                .named("Avenue Louise")
                .with_waypoints(vec![Coordinate::from_degrees(50.001, 4.005).unwrap()]),
        );
        b.add_edge(InputEdge::new(1, 2, 40).with_ref("R0").roundabout());
        let built = b.with_levels(vec![0, 1, 1]).build().unwrap();
        (Router::from_graph(built.graph), built.vertex_ids)
    }

    #[test]
    fn test_router_is_shareable() {
        assert_send_sync::<Router>();
    }

    #[test]
    fn test_path_handles_and_segments() {
        let (router, ids) = router();
        let path = router.shortest_path(ids[0], ids[2]).unwrap().unwrap();
        assert_eq!(path.cost, 70);
        assert_eq!(path.edges.len(), 2);

        let first = router.segment(path.edges[0]).unwrap();
        assert_eq!(first.name.as_deref(), Some("Avenue Louise"));
        assert_eq!(first.coordinates.len(), 3);
        let second = router.segment(path.edges[1]).unwrap();
        assert_eq!(second.reference.as_deref(), Some("R0"));
        assert!(second.roundabout);

        let stale = path.edges[0];
        router.release_path(path).unwrap();
        assert_eq!(
            router.read_edge(stale),
            Err(RouterError::Pool(PoolError::StaleHandle {
                kind: "edge",
                index: stale.index(),
                generation: stale.generation(),
            }))
        );
        let stats = router.pool_stats();
        assert_eq!(stats.edges_borrowed, stats.edges_released);
    }

    #[test]
    fn test_release_path_continues_past_stale_handle() {
        let (router, ids) = router();
        let path = router.shortest_path(ids[0], ids[2]).unwrap().unwrap();
        let released_early = path.edges[0];
        router.release(released_early).unwrap();

        let err = router.release_path(path.clone()).unwrap_err();
        assert!(matches!(err, RouterError::Pool(PoolError::StaleHandle { .. })));
        assert!(router.read_edge(path.edges[1]).is_err());
        let stats = router.pool_stats();
        assert_eq!(stats.edges_borrowed, 2);
        assert_eq!(stats.edges_released, 2);
    }

    #[test]
    fn test_vertices_within_box() {
        let (router, ids) = router();
        let bbox = router.bounding_box();
        let mut all = ids.clone();
        all.sort_unstable();
        assert_eq!(router.vertices_within_box(&bbox), all);

        let west = BoundingBox::from_coords(&[
            Coordinate::from_degrees(49.99, 3.99).unwrap(),
            Coordinate::from_degrees(50.01, 4.005).unwrap(),
        ]);
        assert_eq!(router.vertices_within_box(&west), vec![ids[0]]);
    }

    #[test]
    fn test_unreachable_is_none() {
        let (router, ids) = router();
        assert!(router.shortest_path(ids[2], ids[0]).unwrap().is_none());
    }

    #[test]
    fn test_vertex_and_outbound_edges() {
        let (router, ids) = router();
        let v = router.vertex(ids[1]).unwrap();
        assert_eq!(router.read_vertex(v).unwrap().id, ids[1]);

        let out = router.outbound_edges(v).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(router.read_edge(out[0]).unwrap().target, ids[2]);

        router.release(v).unwrap();
        assert!(router.outbound_edges(v).is_err());
        for h in out {
            router.release(h).unwrap();
        }
    }

    #[test]
    fn test_nearest_lookups() {
        let (router, ids) = router();
        let near_middle = Coordinate::from_degrees(50.0, 4.0101).unwrap();
        assert_eq!(router.nearest_vertex(near_middle, 100.0), Some(ids[1]));
        assert_eq!(router.nearest_vertex(near_middle, 1.0), None);

        let snap = router
            .nearest_edge(Coordinate::from_degrees(50.0009, 4.005).unwrap(), 50.0)
            .unwrap();
        assert_eq!(router.graph().edge(snap.edge).unwrap().source, ids[0]);
    }
}
