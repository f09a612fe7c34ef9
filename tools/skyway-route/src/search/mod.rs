//! Bidirectional level-pruned shortest-path search on the hierarchy
//!
//! Both frontiers expand the side with the smaller minimum key. From a vertex
//! settled beyond its neighborhood radius only edges at or above the vertex's
//! own level are relaxed; inside the radius every incident edge is. Every
//! shortest path can be rearranged to climb weakly in level from the source
//! and descend weakly into the target, and those edges are never pruned, so
//! pruning never loses the optimum. Stall-on-demand skips vertices a settled
//! neighbour already reaches more cheaply over an edge at their level.
//!
//! A frontier retires once its minimum key reaches the best meeting cost; the
//! query ends when both have retired.

mod frontier;
pub mod reference;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::error::GraphError;
use crate::graph::{Edge, EdgeId, HighwayHierarchyGraph, Level, Vertex, VertexId};

use frontier::Frontier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub settled_forward: usize,
    pub settled_backward: usize,
    pub relaxed: usize,
    pub stalled: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub cost: u32,
    pub meeting: VertexId,
    /// Edges as found on the hierarchy, shortcuts included
    pub hierarchy_path: Vec<EdgeId>,
    /// Fully expanded base edges, source to target
    pub edges: Vec<Edge>,
    pub stats: SearchStats,
}

pub struct SearchEngine<'g> {
    graph: &'g HighwayHierarchyGraph,
}

impl<'g> SearchEngine<'g> {
    pub fn new(graph: &'g HighwayHierarchyGraph) -> Self {
        Self { graph }
    }

    /// `Ok(None)` when the target is unreachable
    pub fn shortest_path(
        &self,
        source: VertexId,
        target: VertexId,
    ) -> Result<Option<SearchResult>, GraphError> {
        self.run(source, target, None)
    }

    /// As [`Self::shortest_path`], abandoning the query with `Ok(None)` as soon
    /// as `cancel` is observed set.
    pub fn shortest_path_cancellable(
        &self,
        source: VertexId,
        target: VertexId,
        cancel: &AtomicBool,
    ) -> Result<Option<SearchResult>, GraphError> {
        self.run(source, target, Some(cancel))
    }

    fn run(
        &self,
        source: VertexId,
        target: VertexId,
        cancel: Option<&AtomicBool>,
    ) -> Result<Option<SearchResult>, GraphError> {
        self.graph.vertex(source)?;
        self.graph.vertex(target)?;

        if source == target {
            return Ok(Some(SearchResult {
                cost: 0,
                meeting: source,
                hierarchy_path: vec![],
                edges: vec![],
                stats: SearchStats::default(),
            }));
        }

        let start = Instant::now();
        let mut fwd = Frontier::new(source);
        let mut bwd = Frontier::new(target);
        let mut best = Meeting::default();

        loop {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                tracing::debug!(source, target, "search cancelled");
                return Ok(None);
            }

            if fwd.min_key().is_some_and(|k| k >= best.cost) {
                fwd.retire();
            }
            if bwd.min_key().is_some_and(|k| k >= best.cost) {
                bwd.retire();
            }
            let direction = match (fwd.min_key(), bwd.min_key()) {
                (None, None) => break,
                (Some(_), None) => Direction::Forward,
                (None, Some(_)) => Direction::Backward,
                (Some(f), Some(b)) if f <= b => Direction::Forward,
                (Some(_), Some(_)) => Direction::Backward,
            };

            let (this, other) = match direction {
                Direction::Forward => (&mut fwd, &bwd),
                Direction::Backward => (&mut bwd, &fwd),
            };
            let Some((u, d)) = this.settle_next() else {
                break;
            };

            if let Some(od) = other.distance(u) {
                best.offer(u, d.saturating_add(od));
            }

            let vertex = self.graph.vertex(u)?;
            if self.is_stalled(direction, this, &vertex, d)? {
                this.stalled += 1;
                continue;
            }

            let min_level = expansion_level(&vertex, d);
            match direction {
                Direction::Forward => relax_all(
                    self.graph.outgoing_edges(u, min_level)?,
                    |e| e.target,
                    d,
                    this,
                    other,
                    &mut best,
                ),
                Direction::Backward => relax_all(
                    self.graph.incoming_edges(u, min_level)?,
                    |e| e.source,
                    d,
                    this,
                    other,
                    &mut best,
                ),
            }
        }

        let stats = SearchStats {
            settled_forward: fwd.settled,
            settled_backward: bwd.settled,
            relaxed: fwd.relaxed + bwd.relaxed,
            stalled: fwd.stalled + bwd.stalled,
        };
        tracing::trace!(
            source,
            target,
            cost = best.cost,
            settled_forward = stats.settled_forward,
            settled_backward = stats.settled_backward,
            relaxed = stats.relaxed,
            stalled = stats.stalled,
            elapsed_us = start.elapsed().as_micros() as u64,
            "search finished"
        );

        let Some(meeting) = best.vertex else {
            return Ok(None);
        };

        let hierarchy_path = self.reconstruct(&fwd, &bwd, source, target, meeting)?;
        let mut edges = Vec::with_capacity(hierarchy_path.len());
        for &id in &hierarchy_path {
            edges.extend(self.graph.expand_shortcut(id)?);
        }

        Ok(Some(SearchResult {
            cost: best.cost,
            meeting,
            hierarchy_path,
            edges,
            stats,
        }))
    }

    /// A settled same-side neighbour reaches `vertex` strictly cheaper over
    /// an edge at or above the vertex's level.
    fn is_stalled(
        &self,
        direction: Direction,
        frontier: &Frontier,
        vertex: &Vertex,
        d: u32,
    ) -> Result<bool, GraphError> {
        let cheaper = |neighbor: VertexId, weight: u32| {
            frontier
                .settled_distance(neighbor)
                .is_some_and(|dx| dx.saturating_add(weight) < d)
        };
        let stalled = match direction {
            Direction::Forward => self
                .graph
                .incoming_edges(vertex.id, vertex.level)?
                .any(|e| cheaper(e.source, e.weight)),
            Direction::Backward => self
                .graph
                .outgoing_edges(vertex.id, vertex.level)?
                .any(|e| cheaper(e.target, e.weight)),
        };
        Ok(stalled)
    }

    /// Parent edges from the meeting vertex back to the source, then forward
    /// to the target.
    fn reconstruct(
        &self,
        fwd: &Frontier,
        bwd: &Frontier,
        source: VertexId,
        target: VertexId,
        meeting: VertexId,
    ) -> Result<Vec<EdgeId>, GraphError> {
        let mut path = Vec::new();
        let mut current = meeting;
        while current != source {
            let id = fwd
                .parent(current)
                .ok_or(GraphError::MissingParent { vertex: current })?;
            path.push(id);
            current = self.graph.edge(id)?.source;
        }
        path.reverse();

        current = meeting;
        while current != target {
            let id = bwd
                .parent(current)
                .ok_or(GraphError::MissingParent { vertex: current })?;
            path.push(id);
            current = self.graph.edge(id)?.target;
        }
        Ok(path)
    }
}

/// Cheapest known connection between the two frontiers
#[derive(Debug, Clone, Copy)]
struct Meeting {
    cost: u32,
    vertex: Option<VertexId>,
}

impl Default for Meeting {
    fn default() -> Self {
        Self {
            cost: u32::MAX,
            vertex: None,
        }
    }
}

impl Meeting {
    fn offer(&mut self, vertex: VertexId, cost: u32) {
        if cost < self.cost {
            self.cost = cost;
            self.vertex = Some(vertex);
        }
    }
}

/// Lowest edge level expanded from `vertex` once settled at distance `d`.
/// Beyond its neighborhood radius a vertex only keeps edges at its own level
/// or above.
fn expansion_level(vertex: &Vertex, d: u32) -> Level {
    if d > vertex.neighborhood_radius {
        vertex.level
    } else {
        0
    }
}

fn relax_all<'e>(
    edges: impl Iterator<Item = &'e Edge>,
    head: impl Fn(&Edge) -> VertexId,
    d: u32,
    this: &mut Frontier,
    other: &Frontier,
    best: &mut Meeting,
) {
    for edge in edges {
        let next = head(edge);
        let nd = d.saturating_add(edge.weight);
        if this.relax(next, nd, edge.id) {
            // Tentative labels are real path costs, so they bound too
            if let Some(od) = other.distance(next) {
                best.offer(next, nd.saturating_add(od));
            }
        }
    }
}
