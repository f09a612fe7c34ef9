//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use skyway_route::{BuiltHierarchy, Coordinate, GraphFile, HierarchyBuilder, HighwayHierarchyGraph, InputEdge};
use tempfile::TempDir;

pub const A: u32 = 0;
pub const B: u32 = 1;
pub const C: u32 = 2;
pub const M: u32 = 3;
pub const S: u32 = 4;
pub const T: u32 = 5;

/// Two-level toy network.
///
/// ```text
///   a --2--> s --3--> m --4--> t --1--> c
///            |
///            +--6--> b
/// ```
///
/// `s` and `t` form the top level, so contracting `m` yields the shortcut
/// `s -> t` of weight 7.
pub fn toy() -> BuiltHierarchy {
    let mut b = HierarchyBuilder::new();
    for i in 0..6 {
        b.add_vertex(Coordinate::from_degrees(48.0 + 0.01 * i as f64, 11.0).unwrap());
    }
    b.add_edge(InputEdge::new(S, M, 3).named("Ring"));
    b.add_edge(InputEdge::new(M, T, 4).named("Ring").with_ref("B2"));
    b.add_edge(InputEdge::new(A, S, 2));
    b.add_edge(InputEdge::new(S, B, 6).roundabout());
    b.add_edge(InputEdge::new(T, C, 1).motorway_link());
    b.with_levels(vec![0, 0, 0, 0, 1, 1]).build().unwrap()
}

/// Random sparse directed network with a spanning path so most pairs connect
pub fn random_builder(seed: u64, n: u32, extra_edges: usize) -> HierarchyBuilder {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut b = HierarchyBuilder::new();
    for _ in 0..n {
        let lat = rng.random_range(47.0..48.0);
        let lon = rng.random_range(7.0..8.0);
        b.add_vertex(Coordinate::from_degrees(lat, lon).unwrap());
    }
    for i in 1..n {
        let w = rng.random_range(1..50);
        if rng.random_bool(0.7) {
            b.add_two_way(InputEdge::new(i - 1, i, w));
        } else {
            b.add_edge(InputEdge::new(i - 1, i, w));
        }
    }
    for _ in 0..extra_edges {
        let s = rng.random_range(0..n);
        let t = rng.random_range(0..n);
        if s == t {
            continue;
        }
        let w = rng.random_range(1..100);
        b.add_edge(InputEdge::new(s, t, w));
    }
    b
}

/// Write a graph into a fresh temporary directory
pub fn write_temp(graph: &HighwayHierarchyGraph) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.hh");
    GraphFile::write(&path, graph).unwrap();
    (dir, path)
}
