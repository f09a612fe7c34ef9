//! One level of the hierarchy: the vertices and edges stored in that
//! level's file slice, plus CSR adjacency over every vertex that exists
//! on the level (ids `first_vertex..vertex_end`).

use crate::error::GraphError;

use super::{Edge, EdgeId, Level, Vertex, VertexId};

/// Compressed adjacency: `offsets[v - first_vertex]..offsets[v - first_vertex + 1]`
/// indexes `slots`, which holds local edge indices.
#[derive(Debug, Clone, Default)]
struct Csr {
    offsets: Vec<u32>,
    slots: Vec<u32>,
}

impl Csr {
    fn build(n_local: usize, keys: impl Iterator<Item = usize> + Clone) -> Self {
        // First pass: count edges per vertex
        let mut counts = vec![0u32; n_local];
        for key in keys.clone() {
            counts[key] += 1;
        }

        let mut offsets = Vec::with_capacity(n_local + 1);
        let mut offset = 0u32;
        for &count in &counts {
            offsets.push(offset);
            offset += count;
        }
        offsets.push(offset);

        // Second pass: place edges, reusing counts as cursors
        let mut slots = vec![0u32; offset as usize];
        counts.fill(0);
        for (edge_idx, key) in keys.enumerate() {
            let pos = (offsets[key] + counts[key]) as usize;
            slots[pos] = edge_idx as u32;
            counts[key] += 1;
        }

        Self { offsets, slots }
    }

    fn range(&self, local: Option<usize>) -> std::ops::Range<usize> {
        match local {
            Some(l) if l + 1 < self.offsets.len() => {
                self.offsets[l] as usize..self.offsets[l + 1] as usize
            }
            _ => 0..0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LevelGraph {
    level: Level,
    first_vertex: VertexId,
    vertex_end: VertexId,
    first_edge: EdgeId,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    forward: Csr,
    backward: Csr,
}

impl LevelGraph {
    /// Assemble a level from its slice records.
    ///
    /// `vertices` must carry ids `first_vertex..` and `edges` ids `first_edge..`,
    /// all tagged with `level`; edge endpoints must lie in `first_vertex..vertex_end`.
    pub fn new(
        level: Level,
        first_vertex: VertexId,
        vertex_end: VertexId,
        first_edge: EdgeId,
        vertices: Vec<Vertex>,
        edges: Vec<Edge>,
    ) -> Result<Self, GraphError> {
        let slice_end = first_vertex as u64 + vertices.len() as u64;
        if slice_end > vertex_end as u64 {
            return Err(GraphError::InvalidLayout(format!(
                "level {level}: slice ends at vertex {slice_end}, past vertex end {vertex_end}"
            )));
        }

        for (i, v) in vertices.iter().enumerate() {
            if v.id as u64 != first_vertex as u64 + i as u64 || v.level != level {
                return Err(GraphError::InvalidLayout(format!(
                    "level {level}: vertex slot {i} holds id {} at level {}",
                    v.id, v.level
                )));
            }
        }

        let in_range = |id: VertexId| (first_vertex..vertex_end).contains(&id);
        for (i, e) in edges.iter().enumerate() {
            if e.id as u64 != first_edge as u64 + i as u64 || e.level != level {
                return Err(GraphError::InvalidLayout(format!(
                    "level {level}: edge slot {i} holds id {} at level {}",
                    e.id, e.level
                )));
            }
            if !in_range(e.source) || !in_range(e.target) {
                return Err(GraphError::InvalidLayout(format!(
                    "level {level}: edge {} ({} -> {}) touches a vertex below the level",
                    e.id, e.source, e.target
                )));
            }
        }

        let n_local = (vertex_end - first_vertex) as usize;
        let forward = Csr::build(
            n_local,
            edges.iter().map(|e| (e.source - first_vertex) as usize),
        );
        let backward = Csr::build(
            n_local,
            edges.iter().map(|e| (e.target - first_vertex) as usize),
        );

        Ok(Self {
            level,
            first_vertex,
            vertex_end,
            first_edge,
            vertices,
            edges,
            forward,
            backward,
        })
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn first_vertex(&self) -> VertexId {
        self.first_vertex
    }

    /// One past the highest vertex id present on this level
    pub fn vertex_end(&self) -> VertexId {
        self.vertex_end
    }

    pub fn first_edge(&self) -> EdgeId {
        self.first_edge
    }

    /// Vertices whose topmost level is this one
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        let local = id.checked_sub(self.first_vertex)?;
        self.vertices.get(local as usize)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        let local = id.checked_sub(self.first_edge)?;
        self.edges.get(local as usize)
    }

    /// Edges of this level leaving `v`
    pub fn out_edges(&self, v: VertexId) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacent(&self.forward, v)
    }

    /// Edges of this level entering `v`
    pub fn in_edges(&self, v: VertexId) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacent(&self.backward, v)
    }

    fn adjacent<'a>(&'a self, csr: &'a Csr, v: VertexId) -> impl Iterator<Item = &'a Edge> + 'a {
        let local = v.checked_sub(self.first_vertex).map(|l| l as usize);
        csr.slots[csr.range(local)]
            .iter()
            .map(move |&idx| &self.edges[idx as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeFlags, Waypoints};

    fn vertex(id: VertexId, level: Level) -> Vertex {
        Vertex {
            id,
            level,
            ..Default::default()
        }
    }

    fn edge(id: EdgeId, source: VertexId, target: VertexId, level: Level) -> Edge {
        Edge {
            id,
            source,
            target,
            weight: 1,
            level,
            flags: EdgeFlags::empty(),
            bypassed: None,
            waypoints: Waypoints::NONE,
            name: None,
            reference: None,
        }
    }

    #[test]
    fn test_adjacency_covers_higher_vertices() {
        // Level 1 stores vertices 2..4; vertex 4 lives on level 2 but is
        // still reachable through level-1 edges.
        let lg = LevelGraph::new(
            1,
            2,
            5,
            10,
            vec![vertex(2, 1), vertex(3, 1)],
            vec![edge(10, 2, 3, 1), edge(11, 2, 4, 1), edge(12, 4, 3, 1)],
        )
        .unwrap();

        let out: Vec<EdgeId> = lg.out_edges(2).map(|e| e.id).collect();
        assert_eq!(out, vec![10, 11]);
        let into: Vec<EdgeId> = lg.in_edges(3).map(|e| e.id).collect();
        assert_eq!(into, vec![10, 12]);
        assert_eq!(lg.out_edges(4).count(), 1);

        // Below the level and past the end: nothing
        assert_eq!(lg.out_edges(0).count(), 0);
        assert_eq!(lg.out_edges(99).count(), 0);

        assert_eq!(lg.vertex(3).map(|v| v.id), Some(3));
        assert!(lg.vertex(4).is_none());
        assert_eq!(lg.edge(12).map(|e| e.source), Some(4));
        assert!(lg.edge(9).is_none());
    }

    #[test]
    fn test_rejects_edge_below_level() {
        let err = LevelGraph::new(
            1,
            2,
            4,
            0,
            vec![vertex(2, 1), vertex(3, 1)],
            vec![edge(0, 1, 3, 1)],
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::InvalidLayout(_)));
    }

    #[test]
    fn test_rejects_misnumbered_vertex() {
        let err = LevelGraph::new(0, 0, 2, 0, vec![vertex(1, 0)], vec![]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidLayout(_)));
    }
}
