//! Self-check of a hierarchy
//!
//! Compares the pruned bidirectional search against plain Dijkstra over base
//! edges on random pairs, checks that every returned path is a chained walk
//! whose weights sum to the reported cost, and expands every shortcut.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::error::GraphError;
use crate::graph::{EdgeId, HighwayHierarchyGraph, VertexId};
use crate::search::{reference, SearchEngine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub source: VertexId,
    pub target: VertexId,
    pub hierarchy: Option<u32>,
    pub reference: Option<u32>,
    /// Set when the costs agree but the edge list does not add up
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenShortcut {
    pub edge: EdgeId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub pairs: usize,
    pub reachable: usize,
    pub shortcuts: usize,
    pub mismatches: Vec<Mismatch>,
    pub broken_shortcuts: Vec<BrokenShortcut>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty() && self.broken_shortcuts.is_empty()
    }
}

/// Deterministic random query pairs; empty for an empty graph
pub fn sample_pairs(vertex_count: u32, n_pairs: usize, seed: u64) -> Vec<(VertexId, VertexId)> {
    if vertex_count == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_pairs)
        .map(|_| {
            (
                rng.random_range(0..vertex_count),
                rng.random_range(0..vertex_count),
            )
        })
        .collect()
}

pub fn verify(
    graph: &HighwayHierarchyGraph,
    n_pairs: usize,
    seed: u64,
) -> Result<VerifyReport, GraphError> {
    let pairs = sample_pairs(graph.vertex_count(), n_pairs, seed);
    let (reachable, mismatches) = verify_pairs(graph, &pairs)?;
    let (shortcuts, broken_shortcuts) = verify_shortcuts(graph);

    let report = VerifyReport {
        pairs: pairs.len(),
        reachable,
        shortcuts,
        mismatches,
        broken_shortcuts,
    };
    debug!(
        pairs = report.pairs,
        reachable = report.reachable,
        mismatches = report.mismatches.len(),
        shortcuts = report.shortcuts,
        broken = report.broken_shortcuts.len(),
        "verification finished"
    );
    Ok(report)
}

/// Returns the number of reachable pairs and every disagreement
pub fn verify_pairs(
    graph: &HighwayHierarchyGraph,
    pairs: &[(VertexId, VertexId)],
) -> Result<(usize, Vec<Mismatch>), GraphError> {
    let outcomes = pairs
        .par_iter()
        .map(|&(source, target)| check_pair(graph, source, target))
        .collect::<Result<Vec<_>, GraphError>>()?;

    let reachable = outcomes.iter().filter(|(found, _)| *found).count();
    let mismatches = outcomes.into_iter().filter_map(|(_, m)| m).collect();
    Ok((reachable, mismatches))
}

fn check_pair(
    graph: &HighwayHierarchyGraph,
    source: VertexId,
    target: VertexId,
) -> Result<(bool, Option<Mismatch>), GraphError> {
    let result = SearchEngine::new(graph).shortest_path(source, target)?;
    let expected = reference::base_distance(graph, source, target)?;
    let found = result.as_ref().map(|r| r.cost);

    let mismatch = |detail: Option<String>| Mismatch {
        source,
        target,
        hierarchy: found,
        reference: expected,
        detail,
    };

    if found != expected {
        return Ok((found.is_some(), Some(mismatch(None))));
    }
    let Some(result) = result else {
        return Ok((false, None));
    };

    let mut at = source;
    let mut total = 0u64;
    for edge in &result.edges {
        if edge.is_shortcut() {
            return Ok((true, Some(mismatch(Some(format!("edge {} is a shortcut", edge.id))))));
        }
        if edge.source != at {
            return Ok((
                true,
                Some(mismatch(Some(format!(
                    "edge {} starts at {}, expected {}",
                    edge.id, edge.source, at
                )))),
            ));
        }
        at = edge.target;
        total += edge.weight as u64;
    }
    if at != target || total != result.cost as u64 {
        return Ok((
            true,
            Some(mismatch(Some(format!(
                "path ends at {at} with weight {total}"
            )))),
        ));
    }
    Ok((true, None))
}

/// Expand every shortcut; returns the shortcut count and the failures
pub fn verify_shortcuts(graph: &HighwayHierarchyGraph) -> (usize, Vec<BrokenShortcut>) {
    let shortcuts: Vec<EdgeId> = graph
        .edges()
        .filter(|e| e.is_shortcut())
        .map(|e| e.id)
        .collect();

    let broken = shortcuts
        .par_iter()
        .filter_map(|&id| {
            graph.expand_shortcut(id).err().map(|error| BrokenShortcut {
                edge: id,
                error: error.to_string(),
            })
        })
        .collect();
    (shortcuts.len(), broken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{HierarchyBuilder, InputEdge};
    use skyway_common::Coordinate;

    fn ring(n: u32) -> HighwayHierarchyGraph {
        let mut b = HierarchyBuilder::new();
        for i in 0..n {
            b.add_vertex(Coordinate::from_fixed(i as i32 * 1000, 0));
        }
        for i in 0..n {
            b.add_two_way(InputEdge::new(i, (i + 1) % n, 10 + i));
        }
        b.build().unwrap().graph
    }

    #[test]
    fn test_sample_pairs_is_deterministic() {
        assert_eq!(sample_pairs(50, 20, 7), sample_pairs(50, 20, 7));
        assert!(sample_pairs(50, 20, 7).iter().all(|&(s, t)| s < 50 && t < 50));
        assert!(sample_pairs(0, 20, 7).is_empty());
    }

    #[test]
    fn test_ring_verifies_clean() {
        let graph = ring(12);
        let report = verify(&graph, 200, 42).unwrap();
        assert!(report.is_ok(), "{report:?}");
        assert_eq!(report.pairs, 200);
        assert_eq!(report.reachable, 200);
    }

    #[test]
    fn test_out_of_range_pair_is_an_error() {
        let graph = ring(4);
        assert!(verify_pairs(&graph, &[(0, 99)]).is_err());
    }
}
