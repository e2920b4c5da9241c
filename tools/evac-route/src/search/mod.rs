//! Label-setting search over the road graph
//!
//! Shared pieces of [`PathEngine`] and [`PrecomputeEngine`]:
//!
//! 1. [`SearchKey`]: the (cost, bottleneck) order vertices leave the heap in
//! 2. [`SearchState`]: per-search labels, reset in O(1) by version stamping
//!
//! Labels are kept out of the graph so a search never writes to topology and
//! a stale label can never leak into the next query.

pub mod engine;
pub mod precompute;

use std::cmp::Ordering;

use evac_common::{Error, Result};

use crate::graph::{EdgeIdx, Graph, VertexIdx};
use crate::heap::IndexedMinHeap;
use crate::snap::SnapPoint;

pub use engine::{PathEngine, Route};
pub use precompute::{PrecomputeEngine, Reachability, Reached};

/// Heap key of a vertex: ascending cost, then descending bottleneck
#[derive(Debug, Clone, Copy)]
pub struct SearchKey {
    pub cost: f64,
    pub bottleneck: f64,
}

impl SearchKey {
    pub fn new(cost: f64, bottleneck: f64) -> Self {
        Self { cost, bottleneck }
    }
}

impl Ord for SearchKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| other.bottleneck.total_cmp(&self.bottleneck))
    }
}

impl PartialOrd for SearchKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SearchKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchKey {}

/// Search label of one vertex
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Label {
    pub cost: f64,
    pub bottleneck: f64,
    /// Edge this vertex was reached over; `None` for seeds
    pub lead: Option<EdgeIdx>,
    pub closed: bool,
}

impl Label {
    const UNREACHED: Label = Label {
        cost: f64::INFINITY,
        bottleneck: f64::INFINITY,
        lead: None,
        closed: false,
    };

    #[inline]
    pub fn key(&self) -> SearchKey {
        SearchKey::new(self.cost, self.bottleneck)
    }
}

#[derive(Clone, Copy)]
struct Slot {
    label: Label,
    version: u32,
}

/// Reusable per-search label arena indexed by dense vertex index
///
/// A slot whose version differs from the current one reads as unreached, so
/// starting a new search is a counter increment rather than a sweep.
pub(crate) struct SearchState {
    slots: Vec<Slot>,
    version: u32,
}

impl SearchState {
    pub fn new(n_vertices: usize) -> Self {
        Self {
            slots: vec![
                Slot {
                    label: Label::UNREACHED,
                    version: 0
                };
                n_vertices
            ],
            version: 0,
        }
    }

    /// Invalidate every label and make room for `n_vertices`
    pub fn reset(&mut self, n_vertices: usize) {
        if self.slots.len() < n_vertices {
            self.slots.resize(
                n_vertices,
                Slot {
                    label: Label::UNREACHED,
                    version: 0,
                },
            );
        }
        self.version = self.version.wrapping_add(1);
        if self.version == 0 {
            // Version wrapped, need full reset
            for slot in &mut self.slots {
                slot.version = 0;
            }
            self.version = 1;
        }
    }

    #[inline]
    pub fn get(&self, v: VertexIdx) -> Label {
        let slot = &self.slots[v as usize];
        if slot.version == self.version {
            slot.label
        } else {
            Label::UNREACHED
        }
    }

    #[inline]
    pub fn set(&mut self, v: VertexIdx, cost: f64, bottleneck: f64, lead: Option<EdgeIdx>) {
        let closed = self.get(v).closed;
        self.slots[v as usize] = Slot {
            label: Label {
                cost,
                bottleneck,
                lead,
                closed,
            },
            version: self.version,
        };
    }

    #[inline]
    pub fn close(&mut self, v: VertexIdx) {
        let mut label = self.get(v);
        label.closed = true;
        self.slots[v as usize] = Slot {
            label,
            version: self.version,
        };
    }

    #[inline]
    pub fn is_closed(&self, v: VertexIdx) -> bool {
        self.get(v).closed
    }
}

/// Edges a snapped start can leave over
#[derive(Debug, Clone, Copy)]
pub(crate) struct StartEdges {
    pub forward: EdgeIdx,
    /// Physical reverse of `forward`, if drivable
    pub reverse: Option<EdgeIdx>,
}

impl StartEdges {
    /// The synthetic entry edge of a seeded vertex
    pub fn entry_of(&self, graph: &Graph, v: VertexIdx) -> Option<EdgeIdx> {
        if graph.edge_at(self.forward).to == v {
            Some(self.forward)
        } else {
            self.reverse.filter(|&r| graph.edge_at(r).to == v)
        }
    }
}

/// Queue the one or two frontier vertices of a snapped start
///
/// The snap edge's `to` vertex costs the rest of the edge; the reverse edge's
/// `to` vertex (the snap edge's `from`) costs the part already travelled. Each
/// seed starts with the spare capacity of the edge it is reached over.
pub(crate) fn seed_start(
    graph: &Graph,
    start: &SnapPoint,
    heap: &mut IndexedMinHeap<VertexIdx, SearchKey>,
    state: &mut SearchState,
) -> Result<StartEdges> {
    let forward = graph.edge_idx(start.edge).ok_or(Error::UnknownEdge(start.edge))?;
    let length = graph.length_at(forward);
    if !start.position.is_finite() {
        return Err(Error::InvalidSnap {
            edge: start.edge,
            reason: format!("position {} is not finite", start.position),
        });
    }
    if start.position < 0.0 || start.position > length {
        return Err(Error::InvalidSnap {
            edge: start.edge,
            reason: format!("position {} outside 0..={length}", start.position),
        });
    }

    let reverse = graph.edge_idx(-start.edge);
    seed(
        heap,
        state,
        graph.edge_at(forward).to,
        length - start.position,
        graph.spare_at(forward),
    );
    if let Some(r) = reverse {
        seed(heap, state, graph.edge_at(r).to, start.position, graph.spare_at(r));
    }
    Ok(StartEdges { forward, reverse })
}

fn seed(
    heap: &mut IndexedMinHeap<VertexIdx, SearchKey>,
    state: &mut SearchState,
    v: VertexIdx,
    cost: f64,
    bottleneck: f64,
) {
    let key = SearchKey::new(cost, bottleneck);
    if heap.contains(&v) {
        if key < state.get(v).key() {
            state.set(v, cost, bottleneck, None);
            heap.decrease_key(&v, key);
        }
    } else {
        state.set(v, cost, bottleneck, None);
        heap.push(v, key);
    }
}
