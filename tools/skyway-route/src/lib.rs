//! Offline routing on a precomputed highway hierarchy
//!
//! A hierarchy file is loaded once into memory ([`formats`]); queries run a
//! bidirectional, level-pruned Dijkstra over it ([`search`]) and expand
//! shortcuts back to road segments. [`Router`] ties the graph, a spatial
//! index for coordinate snapping and a generational handle pool together.
//! Hierarchies are built in memory with [`HierarchyBuilder`].

pub mod config;
pub mod error;
pub mod formats;
pub mod graph;
pub mod import;
pub mod pool;
pub mod router;
pub mod search;
pub mod spatial;
pub mod verify;

pub use config::RouterConfig;
pub use error::{
    BuildError, ConfigError, FormatError, GraphError, ImportError, OpenError, PoolError,
    RouterError,
};
pub use formats::{GraphFile, LoadOptions};
pub use graph::{
    BuiltHierarchy, Edge, EdgeFlags, EdgeId, HierarchyBuilder, HighwayHierarchyGraph, InputEdge,
    Level, LevelGraph, Vertex, VertexId,
};
pub use pool::{EdgeHandle, ObjectPool, PoolStats, PooledHandle, VertexHandle};
pub use router::{PathResult, RouteSegment, Router};
pub use search::{SearchEngine, SearchResult, SearchStats};
pub use spatial::{EdgeSnap, SpatialIndex};
pub use skyway_common::{BoundingBox, Coordinate};
