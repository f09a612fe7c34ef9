//! Recycled vertex/edge slots handed out to callers as generation-tagged
//! handles. Releasing a handle bumps its slot's generation, so any copy of
//! the old handle fails with [`PoolError::StaleHandle`] from then on.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::Serialize;

use crate::error::PoolError;
use crate::graph::{Edge, Vertex};

pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

pub type VertexHandle = Handle<Vertex>;
pub type EdgeHandle = Handle<Edge>;

impl<T> Handle<T> {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

// Manual impls: derives would demand the same bounds of `T`.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Typed slot arena
pub struct Arena<T> {
    kind: &'static str,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    borrowed: u64,
    released: u64,
}

impl<T> Arena<T> {
    pub fn with_capacity(kind: &'static str, capacity: usize) -> Self {
        Self {
            kind,
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            borrowed: 0,
            released: 0,
        }
    }

    /// Store `value` in a recycled slot if one is free
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.borrowed += 1;
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].value = Some(value);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                (self.slots.len() - 1) as u32
            }
        };
        Handle {
            index,
            generation: self.slots[index as usize].generation,
            _marker: PhantomData,
        }
    }

    fn stale(&self, handle: Handle<T>) -> PoolError {
        PoolError::StaleHandle {
            kind: self.kind,
            index: handle.index,
            generation: handle.generation,
        }
    }

    pub fn get(&self, handle: Handle<T>) -> Result<&T, PoolError> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
            .ok_or_else(|| self.stale(handle))
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut T, PoolError> {
        let err = self.stale(handle);
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
            .ok_or(err)
    }

    /// Drop the value and retire the handle
    pub fn release(&mut self, handle: Handle<T>) -> Result<T, PoolError> {
        let err = self.stale(handle);
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or_else(|| err.clone())?;
        let value = slot.value.take().ok_or(err)?;

        slot.generation = slot.generation.wrapping_add(1);
        // A slot whose generation wrapped could alias a very old handle
        if slot.generation != 0 {
            self.free.push(handle.index);
        }
        self.released += 1;
        Ok(value)
    }

    /// Handles currently out
    pub fn live(&self) -> u64 {
        self.borrowed - self.released
    }
}

/// Which arena an untyped acquire draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Vertex,
    Edge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PooledHandle {
    Vertex(VertexHandle),
    Edge(EdgeHandle),
}

impl From<VertexHandle> for PooledHandle {
    fn from(h: VertexHandle) -> Self {
        PooledHandle::Vertex(h)
    }
}

impl From<EdgeHandle> for PooledHandle {
    fn from(h: EdgeHandle) -> Self {
        PooledHandle::Edge(h)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub vertices_borrowed: u64,
    pub vertices_released: u64,
    pub edges_borrowed: u64,
    pub edges_released: u64,
}

/// Vertex and edge arenas behind one owner
pub struct ObjectPool {
    vertices: Arena<Vertex>,
    edges: Arena<Edge>,
}

impl ObjectPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            vertices: Arena::with_capacity("vertex", capacity),
            edges: Arena::with_capacity("edge", capacity),
        }
    }

    /// Borrow a default-initialised slot of the given kind
    pub fn acquire(&mut self, kind: HandleKind) -> PooledHandle {
        match kind {
            HandleKind::Vertex => PooledHandle::Vertex(self.vertices.insert(Vertex::default())),
            HandleKind::Edge => PooledHandle::Edge(self.edges.insert(Edge::default())),
        }
    }

    pub fn acquire_vertex(&mut self, vertex: Vertex) -> VertexHandle {
        self.vertices.insert(vertex)
    }

    pub fn acquire_edge(&mut self, edge: Edge) -> EdgeHandle {
        self.edges.insert(edge)
    }

    pub fn vertex(&self, handle: VertexHandle) -> Result<&Vertex, PoolError> {
        self.vertices.get(handle)
    }

    pub fn vertex_mut(&mut self, handle: VertexHandle) -> Result<&mut Vertex, PoolError> {
        self.vertices.get_mut(handle)
    }

    pub fn edge(&self, handle: EdgeHandle) -> Result<&Edge, PoolError> {
        self.edges.get(handle)
    }

    pub fn edge_mut(&mut self, handle: EdgeHandle) -> Result<&mut Edge, PoolError> {
        self.edges.get_mut(handle)
    }

    pub fn release(&mut self, handle: impl Into<PooledHandle>) -> Result<(), PoolError> {
        match handle.into() {
            PooledHandle::Vertex(h) => self.vertices.release(h).map(drop),
            PooledHandle::Edge(h) => self.edges.release(h).map(drop),
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            vertices_borrowed: self.vertices.borrowed,
            vertices_released: self.vertices.released,
            edges_borrowed: self.edges.borrowed,
            edges_released: self.edges.released,
        }
    }

    pub fn live(&self) -> u64 {
        self.vertices.live() + self.edges.live()
    }
}

impl Default for ObjectPool {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
