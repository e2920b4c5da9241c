//! One-to-all searches without targets
//!
//! Used to precompute reachable sets: either every vertex within a cost
//! radius of a source vertex, or everything reachable from a snapped point.
//! No turn restrictions are applied and no capacity is reserved, so the
//! graph is only borrowed shared and several engines may search it at once.

use evac_common::{Error, Result, Uid};
use rustc_hash::FxHashMap;
use serde::Serialize;

use super::{seed_start, SearchKey, SearchState};
use crate::graph::{EdgeId, Graph, VertexIdx};
use crate::heap::IndexedMinHeap;
use crate::snap::SnapPoint;

/// Settled label of one reached vertex
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reached {
    pub cost: f64,
    /// Edge the vertex was reached over; `None` for search roots
    pub via: Option<EdgeId>,
    /// Vertex at the other end of `via`
    pub previous: Option<Uid>,
}

/// Result of a one-to-all search
#[derive(Debug, Clone, Default)]
pub struct Reachability {
    reached: FxHashMap<Uid, Reached>,
}

impl Reachability {
    pub fn cost(&self, uid: Uid) -> Option<f64> {
        self.reached.get(&uid).map(|r| r.cost)
    }

    pub fn get(&self, uid: Uid) -> Option<&Reached> {
        self.reached.get(&uid)
    }

    pub fn contains(&self, uid: Uid) -> bool {
        self.reached.contains_key(&uid)
    }

    pub fn len(&self) -> usize {
        self.reached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reached.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uid, &Reached)> {
        self.reached.iter().map(|(&uid, r)| (uid, r))
    }

    /// Edge chain from a search root to `uid`, in travel order
    pub fn edges_to(&self, uid: Uid) -> Option<Vec<EdgeId>> {
        let mut current = self.reached.get(&uid)?;
        let mut edges = Vec::new();
        while let (Some(edge), Some(previous)) = (current.via, current.previous) {
            edges.push(edge);
            current = self.reached.get(&previous)?;
        }
        edges.reverse();
        Some(edges)
    }
}

pub struct PrecomputeEngine<'g> {
    graph: &'g Graph,
    heap: IndexedMinHeap<VertexIdx, SearchKey>,
    state: SearchState,
}

impl<'g> PrecomputeEngine<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            heap: IndexedMinHeap::new(),
            state: SearchState::new(graph.vertex_count()),
        }
    }

    /// Every vertex whose cost from `source` is at most `limit`
    pub fn within_radius(&mut self, source: Uid, limit: f64) -> Result<Reachability> {
        let root = self.graph.vertex_idx(source).ok_or(Error::UnknownVertex(source))?;
        self.heap.clear();
        self.state.reset(self.graph.vertex_count());

        self.state.set(root, 0.0, f64::INFINITY, None);
        self.heap.push(root, SearchKey::new(0.0, f64::INFINITY));

        let result = self.expand(limit);
        tracing::debug!(source, limit, reached = result.len(), "radius search finished");
        Ok(result)
    }

    /// Everything reachable from a snapped point, both ends of its edge seeded
    pub fn from_snap(&mut self, start: &SnapPoint) -> Result<Reachability> {
        self.heap.clear();
        self.state.reset(self.graph.vertex_count());
        seed_start(self.graph, start, &mut self.heap, &mut self.state)?;

        let result = self.expand(f64::INFINITY);
        tracing::debug!(start_edge = start.edge, reached = result.len(), "snap search finished");
        Ok(result)
    }

    fn expand(&mut self, limit: f64) -> Reachability {
        let graph = self.graph;
        let mut reached = FxHashMap::default();

        while let Some((u, key)) = self.heap.pop_min() {
            self.state.close(u);
            if key.cost > limit {
                // Every vertex still queued is at least as far
                break;
            }

            let label = self.state.get(u);
            let vertex = graph.vertex_at(u);
            let (via, previous) = match label.lead {
                Some(e) => {
                    let edge = graph.edge_at(e);
                    (Some(edge.id), Some(graph.vertex_at(edge.from).uid()))
                }
                None => (None, None),
            };
            reached.insert(
                vertex.uid(),
                Reached {
                    cost: label.cost,
                    via,
                    previous,
                },
            );

            for &e in &vertex.outgoing {
                let v = graph.edge_at(e).to;
                if self.state.is_closed(v) {
                    continue;
                }
                let cost = label.cost + graph.length_at(e);
                let bottleneck = label.bottleneck.min(graph.spare_at(e));
                let key = SearchKey::new(cost, bottleneck);
                if !self.heap.contains(&v) {
                    self.state.set(v, cost, bottleneck, Some(e));
                    self.heap.push(v, key);
                } else if key < self.state.get(v).key() {
                    self.state.set(v, cost, bottleneck, Some(e));
                    self.heap.decrease_key(&v, key);
                }
            }
        }

        Reachability { reached }
    }
}
