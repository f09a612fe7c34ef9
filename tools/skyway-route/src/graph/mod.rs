//! Multi-level road graph: vertex/edge records, per-level adjacency,
//! the resident hierarchy and its in-memory builder.

pub mod builder;
pub mod hierarchy;
pub mod level;

use std::ops::BitOr;

use serde::Serialize;
use skyway_common::Coordinate;

pub use builder::{BuiltHierarchy, HierarchyBuilder, InputEdge};
pub use hierarchy::HighwayHierarchyGraph;
pub use level::LevelGraph;

pub type VertexId = u32;
pub type EdgeId = u32;
pub type Level = u8;
/// Index into the shared string table
pub type NameId = u32;

/// Hard cap on hierarchy depth (fixed by the header layout)
pub const MAX_LEVELS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vertex {
    pub id: VertexId,
    pub coordinate: Coordinate,
    /// Topmost level whose core still contains this vertex
    pub level: Level,
    /// Search cost within which all incident edges stay eligible
    pub neighborhood_radius: u32,
}

/// Edge attribute bits, as stored in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EdgeFlags(u8);

impl EdgeFlags {
    pub const SHORTCUT: Self = Self(1);
    pub const ROUNDABOUT: Self = Self(1 << 1);
    pub const MOTORWAY_LINK: Self = Self(1 << 2);

    const ALL: u8 = 0b111;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// None if unknown bits are set
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for EdgeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Range of intermediate points in the shared geometry pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Waypoints {
    pub offset: u32,
    pub len: u16,
}

impl Waypoints {
    pub const NONE: Self = Self { offset: 0, len: 0 };

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> u64 {
        self.offset as u64 + self.len as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Edge {
    pub id: EdgeId,
    pub source: VertexId,
    pub target: VertexId,
    pub weight: u32,
    pub level: Level,
    pub flags: EdgeFlags,
    /// The two lower-level edges a shortcut stands for, in travel order
    pub bypassed: Option<[EdgeId; 2]>,
    pub waypoints: Waypoints,
    pub name: Option<NameId>,
    pub reference: Option<NameId>,
}

impl Edge {
    pub fn is_shortcut(&self) -> bool {
        self.bypassed.is_some()
    }

    pub fn is_roundabout(&self) -> bool {
        self.flags.contains(EdgeFlags::ROUNDABOUT)
    }

    pub fn is_motorway_link(&self) -> bool {
        self.flags.contains(EdgeFlags::MOTORWAY_LINK)
    }
}

/// Per-level size summary, used by `info` and load logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelSummary {
    pub level: Level,
    pub vertices: u32,
    pub edges: u32,
    pub shortcuts: u32,
}
