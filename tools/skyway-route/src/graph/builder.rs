//! In-memory hierarchy construction
//!
//! Turns a plain directed road graph into a [`HighwayHierarchyGraph`]:
//!
//! 1. Level assignment. Each round contracts an independent set of the
//!    remaining core (either chosen greedily by edge difference or given
//!    explicitly), bridging every contracted vertex with pair shortcuts.
//!    Vertices left after the last round form the top level.
//! 2. Neighborhood radii: distance to the H-th closest vertex over base edges.
//! 3. Renumbering so vertex and edge ids are grouped by ascending level.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;
use skyway_common::Coordinate;

use crate::error::BuildError;

use super::{
    Edge, EdgeFlags, EdgeId, HighwayHierarchyGraph, Level, LevelGraph, Vertex, VertexId,
    Waypoints, MAX_LEVELS,
};

pub const DEFAULT_MAX_LEVELS: usize = 6;
pub const DEFAULT_NEIGHBORHOOD_SIZE: usize = 4;

/// A directed road segment between two builder vertices
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputEdge {
    pub source: u32,
    pub target: u32,
    pub weight: u32,
    pub flags: EdgeFlags,
    pub waypoints: Vec<Coordinate>,
    pub name: Option<String>,
    pub reference: Option<String>,
}

impl InputEdge {
    pub fn new(source: u32, target: u32, weight: u32) -> Self {
        Self {
            source,
            target,
            weight,
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_ref(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_waypoints(mut self, waypoints: Vec<Coordinate>) -> Self {
        self.waypoints = waypoints;
        self
    }

    pub fn roundabout(mut self) -> Self {
        self.flags.insert(EdgeFlags::ROUNDABOUT);
        self
    }

    pub fn motorway_link(mut self) -> Self {
        self.flags.insert(EdgeFlags::MOTORWAY_LINK);
        self
    }
}

/// Output of [`HierarchyBuilder::build`]
#[derive(Debug, Clone)]
pub struct BuiltHierarchy {
    pub graph: HighwayHierarchyGraph,
    /// Builder vertex index -> graph vertex id
    pub vertex_ids: Vec<VertexId>,
}

#[derive(Debug, Clone)]
pub struct HierarchyBuilder {
    coords: Vec<Coordinate>,
    edges: Vec<InputEdge>,
    levels: Option<Vec<Level>>,
    radii: Option<Vec<u32>>,
    max_levels: usize,
    neighborhood_size: usize,
}

/// Edge under construction; `bypass` and adjacency refer to work indices
#[derive(Debug, Clone)]
struct WorkEdge {
    source: u32,
    target: u32,
    weight: u32,
    bypass: Option<[usize; 2]>,
    input: Option<usize>,
}

/// Mutable contraction state
struct Core {
    edges: Vec<WorkEdge>,
    out_adj: Vec<Vec<usize>>,
    in_adj: Vec<Vec<usize>>,
    contracted: Vec<bool>,
}

impl Core {
    fn new(n: usize, edges: Vec<WorkEdge>) -> Self {
        let mut out_adj = vec![Vec::new(); n];
        let mut in_adj = vec![Vec::new(); n];
        for (i, e) in edges.iter().enumerate() {
            out_adj[e.source as usize].push(i);
            in_adj[e.target as usize].push(i);
        }
        Self {
            edges,
            out_adj,
            in_adj,
            contracted: vec![false; n],
        }
    }

    /// Uncontracted neighbours of `v`, both directions, excluding `v`
    fn core_neighbors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        let out = self.out_adj[v].iter().map(|&e| self.edges[e].target as usize);
        let inc = self.in_adj[v].iter().map(|&e| self.edges[e].source as usize);
        out.chain(inc)
            .filter(move |&o| o != v && !self.contracted[o])
    }

    /// (in_edge, out_edge) pairs through `v` between distinct core vertices
    fn bridge_pairs(&self, v: usize) -> Vec<(usize, usize)> {
        let ins: Vec<usize> = self.in_adj[v]
            .iter()
            .copied()
            .filter(|&e| {
                let u = self.edges[e].source as usize;
                u != v && !self.contracted[u]
            })
            .collect();
        let outs: Vec<usize> = self.out_adj[v]
            .iter()
            .copied()
            .filter(|&e| {
                let w = self.edges[e].target as usize;
                w != v && !self.contracted[w]
            })
            .collect();

        let mut pairs = Vec::new();
        for &ei in &ins {
            for &eo in &outs {
                if self.edges[ei].source != self.edges[eo].target {
                    pairs.push((ei, eo));
                }
            }
        }
        pairs
    }

    /// A direct edge u -> w no heavier than `weight`
    fn has_witness(&self, u: u32, w: u32, weight: u32) -> bool {
        self.out_adj[u as usize]
            .iter()
            .any(|&e| self.edges[e].target == w && self.edges[e].weight <= weight)
    }

    /// Priority = shortcuts added - edges removed; lower contracts earlier
    fn edge_difference(&self, v: usize) -> i64 {
        let removed = self.core_neighbors(v).count() as i64;
        let added = self
            .bridge_pairs(v)
            .into_iter()
            .filter(|&(ei, eo)| {
                let (a, b) = (&self.edges[ei], &self.edges[eo]);
                !self.has_witness(a.source, b.target, a.weight.saturating_add(b.weight))
            })
            .count() as i64;
        added - removed
    }

    /// Bridge `v` with shortcuts and return how many were added
    fn contract(&mut self, v: usize) -> Result<usize, BuildError> {
        let mut added = 0;
        for (ei, eo) in self.bridge_pairs(v) {
            let (u, w1) = (self.edges[ei].source, self.edges[ei].weight);
            let (w, w2) = (self.edges[eo].target, self.edges[eo].weight);
            let weight = w1
                .checked_add(w2)
                .ok_or(BuildError::WeightOverflow { first: w1, second: w2 })?;
            if self.has_witness(u, w, weight) {
                continue;
            }
            let idx = self.edges.len();
            self.edges.push(WorkEdge {
                source: u,
                target: w,
                weight,
                bypass: Some([ei, eo]),
                input: None,
            });
            self.out_adj[u as usize].push(idx);
            self.in_adj[w as usize].push(idx);
            added += 1;
        }
        Ok(added)
    }
}

impl Default for HierarchyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self {
            coords: Vec::new(),
            edges: Vec::new(),
            levels: None,
            radii: None,
            max_levels: DEFAULT_MAX_LEVELS,
            neighborhood_size: DEFAULT_NEIGHBORHOOD_SIZE,
        }
    }

    /// Add a vertex and return its builder index
    pub fn add_vertex(&mut self, coordinate: Coordinate) -> u32 {
        self.coords.push(coordinate);
        (self.coords.len() - 1) as u32
    }

    pub fn add_edge(&mut self, edge: InputEdge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    /// Add a segment in both directions
    pub fn add_two_way(&mut self, edge: InputEdge) -> &mut Self {
        let mut reverse = edge.clone();
        std::mem::swap(&mut reverse.source, &mut reverse.target);
        reverse.waypoints.reverse();
        self.edges.push(edge);
        self.edges.push(reverse);
        self
    }

    /// Fix every vertex's level instead of choosing them by contraction order.
    /// Vertices sharing a level below the top must not be adjacent.
    pub fn with_levels(mut self, levels: Vec<Level>) -> Self {
        self.levels = Some(levels);
        self
    }

    pub fn with_neighborhood_radii(mut self, radii: Vec<u32>) -> Self {
        self.radii = Some(radii);
        self
    }

    pub fn max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    pub fn neighborhood_size(mut self, size: usize) -> Self {
        self.neighborhood_size = size;
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.coords.len()
    }

    pub fn build(&self) -> Result<BuiltHierarchy, BuildError> {
        let n = self.coords.len();
        if n == 0 {
            return Err(BuildError::Empty);
        }
        if self.max_levels == 0 || self.max_levels > MAX_LEVELS {
            return Err(BuildError::TooManyLevels {
                requested: self.max_levels,
                max: MAX_LEVELS,
            });
        }
        for (i, e) in self.edges.iter().enumerate() {
            for vertex in [e.source, e.target] {
                if vertex as usize >= n {
                    return Err(BuildError::UnknownVertex {
                        edge_index: i,
                        vertex,
                    });
                }
            }
            if e.waypoints.len() > u16::MAX as usize {
                return Err(BuildError::TooManyWaypoints {
                    edge_index: i,
                    len: e.waypoints.len(),
                });
            }
        }
        if let Some(radii) = &self.radii {
            if radii.len() != n {
                return Err(BuildError::CountMismatch {
                    what: "neighborhood radius",
                    expected: n,
                    found: radii.len(),
                });
            }
        }

        // Self-loops never shorten a path
        let base: Vec<WorkEdge> = self
            .edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.source != e.target)
            .map(|(i, e)| WorkEdge {
                source: e.source,
                target: e.target,
                weight: e.weight,
                bypass: None,
                input: Some(i),
            })
            .collect();
        let mut core = Core::new(n, base);

        let levels = match &self.levels {
            Some(levels) => self.contract_explicit(&mut core, levels)?,
            None => self.contract_greedy(&mut core)?,
        };

        let radii = match &self.radii {
            Some(radii) => radii.clone(),
            None => neighborhood_radii(n, &core.edges, self.neighborhood_size),
        };

        self.assemble(core.edges, &levels, &radii)
    }

    fn contract_explicit(&self, core: &mut Core, levels: &[Level]) -> Result<Vec<Level>, BuildError> {
        let n = self.coords.len();
        if levels.len() != n {
            return Err(BuildError::CountMismatch {
                what: "level",
                expected: n,
                found: levels.len(),
            });
        }
        let top = levels.iter().copied().max().unwrap_or(0);
        if top as usize >= MAX_LEVELS {
            return Err(BuildError::TooManyLevels {
                requested: top as usize + 1,
                max: MAX_LEVELS,
            });
        }

        for round in 0..top {
            let members: Vec<usize> = (0..n).filter(|&v| levels[v] == round).collect();
            for &v in &members {
                if let Some(o) = core.core_neighbors(v).find(|&o| levels[o] == round) {
                    return Err(BuildError::AdjacentContractions {
                        level: round,
                        a: v.min(o) as u32,
                        b: v.max(o) as u32,
                    });
                }
            }
            let mut shortcuts = 0;
            for &v in &members {
                shortcuts += core.contract(v)?;
            }
            for &v in &members {
                core.contracted[v] = true;
            }
            tracing::debug!(level = round, contracted = members.len(), shortcuts, "contracted level");
        }
        Ok(levels.to_vec())
    }

    fn contract_greedy(&self, core: &mut Core) -> Result<Vec<Level>, BuildError> {
        let n = self.coords.len();
        let mut levels: Vec<Option<Level>> = vec![None; n];
        let mut top: Level = 0;

        for round in 0..self.max_levels.saturating_sub(1) {
            let round = round as Level;
            let mut candidates: Vec<(i64, usize)> = (0..n)
                .filter(|&v| !core.contracted[v])
                .map(|v| (core.edge_difference(v), v))
                .collect();
            if candidates.len() <= 1 {
                break;
            }
            candidates.sort_unstable();

            // Greedy independent set; keep at least one vertex for the top level
            let limit = candidates.len() - 1;
            let mut blocked = vec![false; n];
            let mut members = Vec::new();
            for &(priority, v) in &candidates {
                if members.len() == limit {
                    break;
                }
                let degree = core.core_neighbors(v).count() as i64;
                if blocked[v] || priority > degree {
                    continue;
                }
                members.push(v);
                blocked[v] = true;
                for o in core.core_neighbors(v) {
                    blocked[o] = true;
                }
            }
            if members.is_empty() {
                break;
            }

            let mut shortcuts = 0;
            for &v in &members {
                shortcuts += core.contract(v)?;
            }
            for &v in &members {
                core.contracted[v] = true;
                levels[v] = Some(round);
            }
            top = round + 1;
            tracing::debug!(level = round, contracted = members.len(), shortcuts, "contracted level");
        }

        Ok(levels.into_iter().map(|l| l.unwrap_or(top)).collect())
    }

    /// Renumber by level and hand the slices to the graph types
    fn assemble(
        &self,
        work: Vec<WorkEdge>,
        levels: &[Level],
        radii: &[u32],
    ) -> Result<BuiltHierarchy, BuildError> {
        let n = self.coords.len();
        let n_levels = levels.iter().copied().max().unwrap_or(0) as usize + 1;

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&v| (levels[v], v));
        let mut vertex_ids = vec![0 as VertexId; n];
        for (new_id, &v) in order.iter().enumerate() {
            vertex_ids[v] = new_id as VertexId;
        }

        let edge_level =
            |e: &WorkEdge| levels[e.source as usize].min(levels[e.target as usize]);
        let mut edge_order: Vec<usize> = (0..work.len()).collect();
        edge_order.sort_by_key(|&i| {
            let e = &work[i];
            (
                edge_level(e),
                vertex_ids[e.source as usize],
                vertex_ids[e.target as usize],
                e.weight,
                i,
            )
        });
        let mut edge_ids = vec![0 as EdgeId; work.len()];
        for (new_id, &i) in edge_order.iter().enumerate() {
            edge_ids[i] = new_id as EdgeId;
        }

        // Shared geometry pool and deduplicated string table
        let mut geometry = Vec::new();
        let mut names: Vec<String> = Vec::new();
        let mut name_ids: FxHashMap<String, u32> = FxHashMap::default();
        let mut intern = |s: &Option<String>| -> Option<u32> {
            let s = s.as_deref()?;
            Some(*name_ids.entry(s.to_string()).or_insert_with(|| {
                names.push(s.to_string());
                (names.len() - 1) as u32
            }))
        };

        let mut vertex_slices: Vec<Vec<Vertex>> = vec![Vec::new(); n_levels];
        for &v in &order {
            vertex_slices[levels[v] as usize].push(Vertex {
                id: vertex_ids[v],
                coordinate: self.coords[v],
                level: levels[v],
                neighborhood_radius: radii[v],
            });
        }

        let mut edge_slices: Vec<Vec<Edge>> = vec![Vec::new(); n_levels];
        for &i in &edge_order {
            let e = &work[i];
            let level = edge_level(e);
            let mut edge = Edge {
                id: edge_ids[i],
                source: vertex_ids[e.source as usize],
                target: vertex_ids[e.target as usize],
                weight: e.weight,
                level,
                flags: EdgeFlags::empty(),
                bypassed: e.bypass.map(|[a, b]| [edge_ids[a], edge_ids[b]]),
                waypoints: Waypoints::NONE,
                name: None,
                reference: None,
            };
            if edge.bypassed.is_some() {
                edge.flags.insert(EdgeFlags::SHORTCUT);
            }
            if let Some(input) = e.input.map(|idx| &self.edges[idx]) {
                let mut flags = input.flags;
                flags.remove(EdgeFlags::SHORTCUT);
                edge.flags = flags;
                if !input.waypoints.is_empty() {
                    // Lengths were checked against u16::MAX up front
                    edge.waypoints = Waypoints {
                        offset: geometry.len() as u32,
                        len: input.waypoints.len() as u16,
                    };
                    geometry.extend_from_slice(&input.waypoints);
                }
                edge.name = intern(&input.name);
                edge.reference = intern(&input.reference);
            }
            edge_slices[level as usize].push(edge);
        }

        let vertex_end = n as VertexId;
        let mut level_graphs = Vec::with_capacity(n_levels);
        let mut first_vertex = 0u32;
        let mut first_edge = 0u32;
        for (k, (vertices, edges)) in vertex_slices.into_iter().zip(edge_slices).enumerate() {
            let (nv, ne) = (vertices.len() as u32, edges.len() as u32);
            level_graphs.push(LevelGraph::new(
                k as Level,
                first_vertex,
                vertex_end,
                first_edge,
                vertices,
                edges,
            )?);
            first_vertex += nv;
            first_edge += ne;
        }

        let graph = HighwayHierarchyGraph::from_levels(level_graphs, geometry, names)?;
        tracing::debug!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            levels = graph.level_count(),
            "built hierarchy"
        );
        Ok(BuiltHierarchy { graph, vertex_ids })
    }
}

/// Distance from each vertex to its `size`-th closest forward neighbour over
/// base edges (or the farthest reachable one when fewer exist).
fn neighborhood_radii(n: usize, edges: &[WorkEdge], size: usize) -> Vec<u32> {
    let mut out_adj: Vec<Vec<(u32, u32)>> = vec![Vec::new(); n];
    for e in edges.iter().filter(|e| e.bypass.is_none()) {
        out_adj[e.source as usize].push((e.target, e.weight));
    }

    let mut dist: FxHashMap<u32, u32> = FxHashMap::default();
    let mut heap = BinaryHeap::new();
    (0..n as u32)
        .map(|source| {
            dist.clear();
            heap.clear();
            dist.insert(source, 0);
            heap.push(Reverse((0u32, source)));

            let mut settled = 0usize;
            let mut radius = 0u32;
            while let Some(Reverse((d, u))) = heap.pop() {
                if d > dist.get(&u).copied().unwrap_or(u32::MAX) {
                    continue;
                }
                radius = d;
                // The source itself is the first settled vertex
                if settled == size {
                    break;
                }
                settled += 1;
                for &(v, w) in &out_adj[u as usize] {
                    let nd = d.saturating_add(w);
                    if nd < dist.get(&v).copied().unwrap_or(u32::MAX) {
                        dist.insert(v, nd);
                        heap.push(Reverse((nd, v)));
                    }
                }
            }
            radius
        })
        .collect()
}
