//! The resident multi-level graph

use skyway_common::{BoundingBox, Coordinate};

use crate::error::GraphError;

use super::{
    Edge, EdgeFlags, EdgeId, Level, LevelGraph, LevelSummary, Vertex, VertexId, MAX_LEVELS,
};

/// All levels of a highway hierarchy plus the shared geometry pool and
/// string table. Immutable once built; safe to share across threads.
#[derive(Debug, Clone)]
pub struct HighwayHierarchyGraph {
    levels: Vec<LevelGraph>,
    geometry: Vec<Coordinate>,
    names: Vec<String>,
    vertex_count: u32,
    edge_count: u32,
    bbox: BoundingBox,
}

impl HighwayHierarchyGraph {
    /// Assemble and cross-validate levels `0..L`.
    pub fn from_levels(
        levels: Vec<LevelGraph>,
        geometry: Vec<Coordinate>,
        names: Vec<String>,
    ) -> Result<Self, GraphError> {
        if levels.is_empty() || levels.len() > MAX_LEVELS {
            return Err(GraphError::InvalidLayout(format!(
                "level count {} not in 1..={MAX_LEVELS}",
                levels.len()
            )));
        }

        let vertex_end = levels[levels.len() - 1].vertex_end();
        let mut next_vertex = 0u32;
        let mut next_edge = 0u32;
        for (k, lg) in levels.iter().enumerate() {
            if lg.level() as usize != k
                || lg.first_vertex() != next_vertex
                || lg.first_edge() != next_edge
                || lg.vertex_end() != vertex_end
            {
                return Err(GraphError::InvalidLayout(format!(
                    "level {k} is not contiguous with the levels below it"
                )));
            }
            next_vertex += lg.vertices().len() as u32;
            next_edge += lg.edges().len() as u32;
        }
        if next_vertex != vertex_end {
            return Err(GraphError::InvalidLayout(format!(
                "{next_vertex} vertices stored but levels span {vertex_end}"
            )));
        }

        let edge_count = next_edge;
        for e in levels.iter().flat_map(|lg| lg.edges()) {
            if e.flags.contains(EdgeFlags::SHORTCUT) != e.bypassed.is_some() {
                return Err(GraphError::InvalidLayout(format!(
                    "edge {}: shortcut flag disagrees with bypass ids",
                    e.id
                )));
            }
            if let Some([a, b]) = e.bypassed {
                if a >= edge_count || b >= edge_count {
                    return Err(GraphError::EdgeOutOfRange {
                        id: a.max(b),
                        count: edge_count,
                    });
                }
            }
            if e.waypoints.end() > geometry.len() as u64 {
                return Err(GraphError::InvalidLayout(format!(
                    "edge {}: waypoints {}+{} exceed geometry pool of {}",
                    e.id,
                    e.waypoints.offset,
                    e.waypoints.len,
                    geometry.len()
                )));
            }
            for id in [e.name, e.reference].into_iter().flatten() {
                if id as usize >= names.len() {
                    return Err(GraphError::InvalidLayout(format!(
                        "edge {}: string id {id} exceeds table of {}",
                        e.id,
                        names.len()
                    )));
                }
            }
        }

        let bbox = BoundingBox::from_coords(
            levels
                .iter()
                .flat_map(|lg| lg.vertices())
                .map(|v| &v.coordinate),
        );

        Ok(Self {
            levels,
            geometry,
            names,
            vertex_count: vertex_end,
            edge_count,
            bbox,
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn edge_count(&self) -> u32 {
        self.edge_count
    }

    pub fn levels(&self) -> &[LevelGraph] {
        &self.levels
    }

    pub fn level(&self, level: Level) -> Result<&LevelGraph, GraphError> {
        self.levels
            .get(level as usize)
            .ok_or(GraphError::LevelOutOfRange {
                level,
                count: self.levels.len(),
            })
    }

    pub fn geometry(&self) -> &[Coordinate] {
        &self.geometry
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// Every vertex in id order (this is the level-0 vertex set)
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> + '_ {
        self.levels.iter().flat_map(|lg| lg.vertices())
    }

    /// Every edge in id order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.levels.iter().flat_map(|lg| lg.edges())
    }

    pub fn vertex(&self, id: VertexId) -> Result<Vertex, GraphError> {
        if id >= self.vertex_count {
            return Err(GraphError::VertexOutOfRange {
                id,
                count: self.vertex_count,
            });
        }
        // Last level whose slice starts at or before `id`; empty slices share
        // their start with the next level, so this lands on the owning slice.
        let slot = self.levels.partition_point(|lg| lg.first_vertex() <= id) - 1;
        self.levels[slot]
            .vertex(id)
            .copied()
            .ok_or(GraphError::VertexOutOfRange {
                id,
                count: self.vertex_count,
            })
    }

    pub fn edge(&self, id: EdgeId) -> Result<Edge, GraphError> {
        if id >= self.edge_count {
            return Err(GraphError::EdgeOutOfRange {
                id,
                count: self.edge_count,
            });
        }
        let slot = self.levels.partition_point(|lg| lg.first_edge() <= id) - 1;
        self.levels[slot]
            .edge(id)
            .copied()
            .ok_or(GraphError::EdgeOutOfRange {
                id,
                count: self.edge_count,
            })
    }

    /// Edges leaving `v` whose level is at least `min_level`.
    pub fn outgoing_edges(
        &self,
        v: VertexId,
        min_level: Level,
    ) -> Result<impl Iterator<Item = &Edge> + '_, GraphError> {
        let top = self.vertex(v)?.level as usize;
        Ok(self
            .levels
            .iter()
            .take(top + 1)
            .skip(min_level as usize)
            .flat_map(move |lg| lg.out_edges(v)))
    }

    /// Edges entering `v` whose level is at least `min_level`.
    pub fn incoming_edges(
        &self,
        v: VertexId,
        min_level: Level,
    ) -> Result<impl Iterator<Item = &Edge> + '_, GraphError> {
        let top = self.vertex(v)?.level as usize;
        Ok(self
            .levels
            .iter()
            .take(top + 1)
            .skip(min_level as usize)
            .flat_map(move |lg| lg.in_edges(v)))
    }

    /// Unfold a shortcut into the base edges it stands for, in travel order.
    /// A base edge expands to itself.
    pub fn expand_shortcut(&self, id: EdgeId) -> Result<Vec<Edge>, GraphError> {
        // Each bypass step descends at least one level
        let max_depth = self.levels.len();
        let mut base = Vec::new();
        let mut stack = vec![(self.edge(id)?, 0usize)];

        while let Some((edge, depth)) = stack.pop() {
            let Some([first_id, second_id]) = edge.bypassed else {
                base.push(edge);
                continue;
            };
            if depth >= max_depth {
                return Err(GraphError::BypassCycle { edge: id, depth });
            }

            let first = self.edge(first_id)?;
            let second = self.edge(second_id)?;
            if first.source != edge.source
                || first.target != second.source
                || second.target != edge.target
            {
                return Err(GraphError::BrokenShortcut {
                    edge: edge.id,
                    reason: format!(
                        "bypassed edges {first_id} ({} -> {}) and {second_id} ({} -> {}) do not chain {} -> {}",
                        first.source, first.target, second.source, second.target, edge.source, edge.target
                    ),
                });
            }
            if first.weight.checked_add(second.weight) != Some(edge.weight) {
                return Err(GraphError::BrokenShortcut {
                    edge: edge.id,
                    reason: format!(
                        "weight {} differs from {} + {}",
                        edge.weight, first.weight, second.weight
                    ),
                });
            }

            // Second pushed first so the first half unfolds first
            stack.push((second, depth + 1));
            stack.push((first, depth + 1));
        }

        tracing::trace!(edge = id, base_edges = base.len(), "expanded shortcut");
        Ok(base)
    }

    /// Intermediate points of an edge (shortcuts carry none of their own)
    pub fn waypoints(&self, edge: &Edge) -> &[Coordinate] {
        let start = edge.waypoints.offset as usize;
        let end = start + edge.waypoints.len as usize;
        self.geometry.get(start..end).unwrap_or(&[])
    }

    pub fn name(&self, id: Option<u32>) -> Option<&str> {
        id.and_then(|i| self.names.get(i as usize)).map(String::as_str)
    }

    pub fn summary(&self) -> Vec<LevelSummary> {
        self.levels
            .iter()
            .map(|lg| LevelSummary {
                level: lg.level(),
                vertices: lg.vertices().len() as u32,
                edges: lg.edges().len() as u32,
                shortcuts: lg.edges().iter().filter(|e| e.is_shortcut()).count() as u32,
            })
            .collect()
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
            neighborhood_radius: 10,
            ..Default::default()
        }
    }

    fn edge(id: EdgeId, source: VertexId, target: VertexId, weight: u32, level: Level) -> Edge {
        Edge {
            id,
            source,
            target,
            weight,
            level,
            flags: EdgeFlags::empty(),
            bypassed: None,
            waypoints: Waypoints::NONE,
            name: None,
            reference: None,
        }
    }

    fn shortcut(
        id: EdgeId,
        source: VertexId,
        target: VertexId,
        weight: u32,
        level: Level,
        bypassed: [EdgeId; 2],
    ) -> Edge {
        Edge {
            flags: EdgeFlags::SHORTCUT,
            bypassed: Some(bypassed),
            ..edge(id, source, target, weight, level)
        }
    }

    /// 0 (L0) sits between 1 and 2 (L1); shortcut 1 -> 2 over edges 0 and 1.
    fn two_level(top_edges: Vec<Edge>) -> Result<HighwayHierarchyGraph, GraphError> {
        let l0 = LevelGraph::new(
            0,
            0,
            3,
            0,
            vec![vertex(0, 0)],
            vec![edge(0, 1, 0, 3, 0), edge(1, 0, 2, 4, 0)],
        )?;
        let l1 = LevelGraph::new(1, 1, 3, 2, vec![vertex(1, 1), vertex(2, 1)], top_edges)?;
        HighwayHierarchyGraph::from_levels(vec![l0, l1], vec![], vec![])
    }

    #[test]
    fn test_lookup_and_level_filtered_adjacency() {
        let g = two_level(vec![shortcut(2, 1, 2, 7, 1, [0, 1])]).unwrap();
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.vertex(2).unwrap().level, 1);
        assert!(matches!(
            g.vertex(3),
            Err(GraphError::VertexOutOfRange { id: 3, count: 3 })
        ));
        assert!(matches!(g.edge(3), Err(GraphError::EdgeOutOfRange { .. })));

        let all: Vec<EdgeId> = g.outgoing_edges(1, 0).unwrap().map(|e| e.id).collect();
        assert_eq!(all, vec![0, 2]);
        let upper: Vec<EdgeId> = g.outgoing_edges(1, 1).unwrap().map(|e| e.id).collect();
        assert_eq!(upper, vec![2]);
        let into: Vec<EdgeId> = g.incoming_edges(2, 1).unwrap().map(|e| e.id).collect();
        assert_eq!(into, vec![2]);
        // Vertex 0 only exists on level 0
        assert_eq!(g.outgoing_edges(0, 1).unwrap().count(), 0);
        assert_eq!(g.outgoing_edges(0, 0).unwrap().count(), 1);
    }

    #[test]
    fn test_expand_shortcut() {
        let g = two_level(vec![shortcut(2, 1, 2, 7, 1, [0, 1])]).unwrap();
        let base: Vec<EdgeId> = g.expand_shortcut(2).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(base, vec![0, 1]);
        // Base edges expand to themselves
        assert_eq!(g.expand_shortcut(1).unwrap().len(), 1);
    }

    #[test]
    fn test_expand_rejects_weight_mismatch() {
        let g = two_level(vec![shortcut(2, 1, 2, 8, 1, [0, 1])]).unwrap();
        assert!(matches!(
            g.expand_shortcut(2),
            Err(GraphError::BrokenShortcut { edge: 2, .. })
        ));
    }

    #[test]
    fn test_expand_rejects_bypass_cycle() {
        // Two same-level shortcuts bypassing each other never descend
        let g = two_level(vec![
            shortcut(2, 1, 2, 0, 1, [3, 2]),
            shortcut(3, 1, 1, 0, 1, [3, 3]),
        ])
        .unwrap();
        assert!(matches!(
            g.expand_shortcut(2),
            Err(GraphError::BypassCycle { .. })
        ));
    }

    #[test]
    fn test_rejects_dangling_bypass() {
        let err = two_level(vec![shortcut(2, 1, 2, 7, 1, [0, 9])]).unwrap_err();
        assert!(matches!(err, GraphError::EdgeOutOfRange { id: 9, .. }));
    }
}
