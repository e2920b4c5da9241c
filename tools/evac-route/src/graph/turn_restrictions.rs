//! Turn restriction index
//!
//! A restriction forbids leaving intersection `via` over `to_edge` when it
//! was entered over `from_edge`. Restrictions are grouped by intersection so
//! the search pays one map lookup per expanded vertex; most vertices carry
//! none.

use evac_common::Uid;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{EdgeId, VertexIdx};

/// A forbidden (incoming edge, outgoing edge) pair at an intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnRestriction {
    pub via: Uid,
    pub from_edge: EdgeId,
    pub to_edge: EdgeId,
}

/// Restrictions keyed by dense vertex index
#[derive(Debug, Clone, Default)]
pub struct TurnRestrictionIndex {
    by_vertex: FxHashMap<VertexIdx, Vec<TurnRestriction>>,
}

impl TurnRestrictionIndex {
    /// Record a restriction; returns false if it was already present
    pub(crate) fn insert(&mut self, vertex: VertexIdx, restriction: TurnRestriction) -> bool {
        let rules = self.by_vertex.entry(vertex).or_default();
        if rules.contains(&restriction) {
            return false;
        }
        rules.push(restriction);
        true
    }

    #[inline]
    pub(crate) fn at(&self, vertex: VertexIdx) -> &[TurnRestriction] {
        self.by_vertex.get(&vertex).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check if the turn `from_edge -> to_edge` is forbidden at `vertex`
    #[inline]
    pub(crate) fn forbids(&self, vertex: VertexIdx, from_edge: EdgeId, to_edge: EdgeId) -> bool {
        self.at(vertex)
            .iter()
            .any(|r| r.from_edge == from_edge && r.to_edge == to_edge)
    }

    /// Number of intersections with at least one restriction
    pub fn n_restricted_vertices(&self) -> usize {
        self.by_vertex.len()
    }

    /// Total number of restrictions
    pub fn n_restrictions(&self) -> usize {
        self.by_vertex.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TurnRestriction> {
        self.by_vertex.values().flatten()
    }
}
