//! Typed errors for the routing library
//!
//! Every failure is returned to the caller; nothing here is logged and
//! swallowed. Negative query outcomes ("no path", "nothing within radius")
//! are `Option::None`, not errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::graph::{EdgeId, Level, VertexId};

/// Failures while decoding or encoding a hierarchy file
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("file truncated: need at least {needed} bytes, found {found}")]
    TruncatedFile { needed: u64, found: u64 },

    #[error("invalid magic number: {found:08x}")]
    BadMagic { found: u32 },

    #[error("unsupported format version {found} (this build reads {expected})")]
    VersionMismatch { expected: u16, found: u16 },

    #[error("{section} at offset {offset} (+{len} bytes) exceeds limit {limit}")]
    OffsetOutOfBounds {
        section: &'static str,
        offset: u64,
        len: u64,
        limit: u64,
    },

    #[error("inconsistent counts: {0}")]
    InconsistentCounts(String),

    #[error("invalid {section} record {index}: {reason}")]
    InvalidRecord {
        section: &'static str,
        index: u64,
        reason: String,
    },

    #[error("checksum mismatch: stored {stored:016x}, computed {computed:016x}")]
    ChecksumMismatch { stored: u64, computed: u64 },

    #[error("graph failed validation: {0}")]
    InvalidGraph(#[from] GraphError),
}

/// Lookup and consistency failures on the resident graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("vertex {id} out of range (graph has {count} vertices)")]
    VertexOutOfRange { id: VertexId, count: u32 },

    #[error("edge {id} out of range (graph has {count} edges)")]
    EdgeOutOfRange { id: EdgeId, count: u32 },

    #[error("level {level} out of range (graph has {count} levels)")]
    LevelOutOfRange { level: Level, count: usize },

    #[error("shortcut {edge} still unexpanded at depth {depth}: bypass chain does not descend")]
    BypassCycle { edge: EdgeId, depth: usize },

    #[error("shortcut {edge} is broken: {reason}")]
    BrokenShortcut { edge: EdgeId, reason: String },

    #[error("search lost the parent edge of vertex {vertex}")]
    MissingParent { vertex: VertexId },

    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("stale {kind} handle (slot {index}, generation {generation})")]
    StaleHandle {
        kind: &'static str,
        index: u32,
        generation: u32,
    },
}

/// Failures while building a hierarchy in memory
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("cannot build a hierarchy without vertices")]
    Empty,

    #[error("edge {edge_index} references unknown vertex {vertex}")]
    UnknownVertex { edge_index: usize, vertex: u32 },

    #[error("expected {expected} {what} entries, got {found}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{requested} levels requested, at most {max} supported")]
    TooManyLevels { requested: usize, max: usize },

    #[error("vertices {a} and {b} are adjacent but both contracted at level {level}")]
    AdjacentContractions { level: Level, a: u32, b: u32 },

    #[error("edge {edge_index} has {len} waypoints, at most 65535 fit a record")]
    TooManyWaypoints { edge_index: usize, len: usize },

    #[error("shortcut weight overflows u32 ({first} + {second})")]
    WeightOverflow { first: u32, second: u32 },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failures constructing a [`crate::Router`]
#[derive(Error, Debug)]
pub enum OpenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Failures answering a query on an open [`crate::Router`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Failures reading a JSON road network for the builder
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse road network: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid coordinate in {what} {index}: {source}")]
    Coordinate {
        what: &'static str,
        index: usize,
        #[source]
        source: skyway_common::CoordError,
    },

    #[error(transparent)]
    Build(#[from] BuildError),
}
