//! One direction of the bidirectional search

use std::cmp::Reverse;

use priority_queue::PriorityQueue;
use rustc_hash::FxHashMap;

use crate::graph::{EdgeId, VertexId};

#[derive(Debug, Clone, Copy)]
struct Label {
    dist: u32,
    parent: Option<EdgeId>,
    settled: bool,
}

/// Sparse labels plus an addressable min-queue. Only vertices the search
/// touches get a label, so per-query memory tracks the search space.
pub(crate) struct Frontier {
    queue: PriorityQueue<VertexId, Reverse<u32>>,
    labels: FxHashMap<VertexId, Label>,
    pub settled: usize,
    pub relaxed: usize,
    pub stalled: usize,
}

impl Frontier {
    pub fn new(origin: VertexId) -> Self {
        let mut queue = PriorityQueue::new();
        queue.push(origin, Reverse(0));
        let mut labels = FxHashMap::default();
        labels.insert(
            origin,
            Label {
                dist: 0,
                parent: None,
                settled: false,
            },
        );
        Self {
            queue,
            labels,
            settled: 0,
            relaxed: 0,
            stalled: 0,
        }
    }

    pub fn min_key(&self) -> Option<u32> {
        self.queue.peek().map(|(_, Reverse(d))| *d)
    }

    /// Stop expanding this direction
    pub fn retire(&mut self) {
        self.queue.clear();
    }

    /// Pop and settle the closest queued vertex
    pub fn settle_next(&mut self) -> Option<(VertexId, u32)> {
        let (v, Reverse(d)) = self.queue.pop()?;
        if let Some(label) = self.labels.get_mut(&v) {
            label.settled = true;
        }
        self.settled += 1;
        Some((v, d))
    }

    /// Tentative or final distance
    pub fn distance(&self, v: VertexId) -> Option<u32> {
        self.labels.get(&v).map(|l| l.dist)
    }

    pub fn settled_distance(&self, v: VertexId) -> Option<u32> {
        self.labels.get(&v).filter(|l| l.settled).map(|l| l.dist)
    }

    pub fn parent(&self, v: VertexId) -> Option<EdgeId> {
        self.labels.get(&v).and_then(|l| l.parent)
    }

    /// Offer `dist` for `v` via edge `via`; true if the label improved
    pub fn relax(&mut self, v: VertexId, dist: u32, via: EdgeId) -> bool {
        self.relaxed += 1;
        match self.labels.get_mut(&v) {
            Some(label) if label.settled || dist >= label.dist => false,
            Some(label) => {
                label.dist = dist;
                label.parent = Some(via);
                self.queue.push_increase(v, Reverse(dist));
                true
            }
            None => {
                self.labels.insert(
                    v,
                    Label {
                        dist,
                        parent: Some(via),
                        settled: false,
                    },
                );
                self.queue.push(v, Reverse(dist));
                true
            }
        }
    }
}
