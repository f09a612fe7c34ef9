//! Plain Dijkstra over base edges only, for validating the hierarchy search

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::GraphError;
use crate::graph::{HighwayHierarchyGraph, VertexId};

/// Cost from `source` to every vertex; `None` where unreachable
pub fn base_distances(
    graph: &HighwayHierarchyGraph,
    source: VertexId,
) -> Result<Vec<Option<u32>>, GraphError> {
    graph.vertex(source)?;
    let n = graph.vertex_count() as usize;
    let mut dist = vec![u32::MAX; n];
    let mut heap = BinaryHeap::new();
    dist[source as usize] = 0;
    heap.push(Reverse((0u32, source)));

    while let Some(Reverse((d, u))) = heap.pop() {
        if d > dist[u as usize] {
            continue; // Stale entry
        }
        for e in graph.outgoing_edges(u, 0)?.filter(|e| !e.is_shortcut()) {
            let nd = d.saturating_add(e.weight);
            if nd < dist[e.target as usize] {
                dist[e.target as usize] = nd;
                heap.push(Reverse((nd, e.target)));
            }
        }
    }

    Ok(dist
        .into_iter()
        .map(|d| (d != u32::MAX).then_some(d))
        .collect())
}

pub fn base_distance(
    graph: &HighwayHierarchyGraph,
    source: VertexId,
    target: VertexId,
) -> Result<Option<u32>, GraphError> {
    graph.vertex(target)?;
    Ok(base_distances(graph, source)?[target as usize])
}
