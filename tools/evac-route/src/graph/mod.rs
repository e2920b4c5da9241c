//! Road network graph
//!
//! Index-based directed graph: vertices, directed edges and the road records
//! they share live in flat arenas and refer to each other by integer index.
//! A bidirectional road segment `n` becomes two directed edges `+n` and `-n`
//! pointing at the same road record, so capacity reserved while driving one
//! direction is visible from the other.
//!
//! Only structural data lives here. Per-search labels (cost, predecessor,
//! bottleneck) are kept by the engines in [`crate::search::SearchState`].

pub mod turn_restrictions;

use evac_common::{Error, Point, Result, Uid, UidGrid};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::topology::RoadSegment;

pub use turn_restrictions::{TurnRestriction, TurnRestrictionIndex};

/// Signed directed edge id; `+n` and `-n` are the two directions of segment `n`
pub type EdgeId = i64;

pub(crate) type VertexIdx = u32;
pub(crate) type EdgeIdx = u32;

/// Handle to a road record inside a [`Graph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoadId(u32);

/// Direction(s) in which a road segment may be driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OneWay {
    /// Both directions (`B`)
    #[serde(rename = "B")]
    Both,
    /// Digitization direction only (`F`)
    #[serde(rename = "F")]
    Forward,
    /// Against the digitization direction only (`T`)
    #[serde(rename = "T")]
    Reverse,
}

impl OneWay {
    /// Swap Forward and Reverse (routing on the reversed network)
    pub fn reversed(self) -> Self {
        match self {
            OneWay::Both => OneWay::Both,
            OneWay::Forward => OneWay::Reverse,
            OneWay::Reverse => OneWay::Forward,
        }
    }
}

/// Physical road properties shared by both directions of a segment
#[derive(Debug, Clone, PartialEq)]
pub struct Road {
    pub length: f64,
    pub capacity: f64,
    pub capacity_used: f64,
    pub oneway: OneWay,
    /// Shape in the direction of the positive edge id
    pub shape: Vec<Point>,
}

impl Road {
    pub fn new(length: f64, capacity: f64, oneway: OneWay, shape: Vec<Point>) -> Self {
        Self {
            length,
            capacity,
            capacity_used: 0.0,
            oneway,
            shape,
        }
    }

    #[inline]
    pub fn spare_capacity(&self) -> f64 {
        self.capacity - self.capacity_used
    }
}

#[derive(Debug, Clone)]
pub struct Vertex {
    uid: Uid,
    point: Point,
    pub(crate) outgoing: Vec<EdgeIdx>,
    pub(crate) incoming: Vec<EdgeIdx>,
}

impl Vertex {
    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn point(&self) -> Point {
        self.point
    }

    pub fn out_degree(&self) -> usize {
        self.outgoing.len()
    }

    pub fn in_degree(&self) -> usize {
        self.incoming.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Edge {
    pub(crate) id: EdgeId,
    pub(crate) from: VertexIdx,
    pub(crate) to: VertexIdx,
    pub(crate) road: u32,
}

/// Borrowed view of a directed edge
#[derive(Clone, Copy)]
pub struct EdgeRef<'g> {
    graph: &'g Graph,
    idx: EdgeIdx,
}

impl<'g> EdgeRef<'g> {
    #[inline]
    fn edge(&self) -> &'g Edge {
        &self.graph.edges[self.idx as usize]
    }

    #[inline]
    fn road(&self) -> &'g Road {
        &self.graph.roads[self.edge().road as usize]
    }

    pub fn id(&self) -> EdgeId {
        self.edge().id
    }

    pub fn from(&self) -> Uid {
        self.graph.vertices[self.edge().from as usize].uid
    }

    pub fn to(&self) -> Uid {
        self.graph.vertices[self.edge().to as usize].uid
    }

    pub fn length(&self) -> f64 {
        self.road().length
    }

    pub fn capacity(&self) -> f64 {
        self.road().capacity
    }

    pub fn capacity_used(&self) -> f64 {
        self.road().capacity_used
    }

    pub fn spare_capacity(&self) -> f64 {
        self.road().spare_capacity()
    }

    pub fn oneway(&self) -> OneWay {
        self.road().oneway
    }

    /// Shape points in travel direction, from `from()` to `to()`
    pub fn shape(&self) -> Vec<Point> {
        let shape = &self.road().shape;
        if self.id() > 0 {
            shape.clone()
        } else {
            shape.iter().rev().copied().collect()
        }
    }

    /// The opposite direction of the same road, if it is drivable
    pub fn twin(&self) -> Option<EdgeRef<'g>> {
        self.graph.edge(-self.id())
    }
}

impl std::fmt::Debug for EdgeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeRef")
            .field("id", &self.id())
            .field("from", &self.from())
            .field("to", &self.to())
            .field("length", &self.length())
            .finish()
    }
}

/// Directed road network with turn restrictions
#[derive(Debug, Clone)]
pub struct Graph {
    grid: UidGrid,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    roads: Vec<Road>,
    vertex_index: FxHashMap<Uid, VertexIdx>,
    edge_index: FxHashMap<EdgeId, EdgeIdx>,
    restrictions: TurnRestrictionIndex,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(UidGrid::default())
    }
}

impl Graph {
    pub fn new(grid: UidGrid) -> Self {
        Self::with_capacity(grid, 0, 0)
    }

    pub fn with_capacity(grid: UidGrid, n_vertices: usize, n_edges: usize) -> Self {
        Self {
            grid,
            vertices: Vec::with_capacity(n_vertices),
            edges: Vec::with_capacity(n_edges),
            roads: Vec::with_capacity(n_edges),
            vertex_index: FxHashMap::with_capacity_and_hasher(n_vertices, Default::default()),
            edge_index: FxHashMap::with_capacity_and_hasher(n_edges, Default::default()),
            restrictions: TurnRestrictionIndex::default(),
        }
    }

    pub fn grid(&self) -> &UidGrid {
        &self.grid
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn road_count(&self) -> usize {
        self.roads.len()
    }

    /// UID a point would get in this graph, `None` beyond the grid's range
    pub fn uid_of(&self, point: &Point) -> Option<Uid> {
        self.grid.uid(point)
    }

    /// Add a new vertex, failing if its UID is taken or does not fit the grid
    pub fn add_vertex(&mut self, point: Point) -> Result<Uid> {
        let uid = self.grid.uid(&point).ok_or(Error::GridOverflow(point))?;
        if let Some(&idx) = self.vertex_index.get(&uid) {
            let existing = self.vertices[idx as usize].point;
            if existing != point {
                return Err(Error::UidCollision {
                    uid,
                    existing,
                    incoming: point,
                });
            }
            return Err(Error::DuplicateVertex(uid));
        }
        let idx = self.vertices.len() as VertexIdx;
        self.vertices.push(Vertex {
            uid,
            point,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        });
        self.vertex_index.insert(uid, idx);
        Ok(uid)
    }

    /// Return the vertex at `point`, creating it if needed
    pub fn insert_or_get_vertex(&mut self, point: Point) -> Result<Uid> {
        match self.add_vertex(point) {
            Err(Error::DuplicateVertex(uid)) => Ok(uid),
            other => other,
        }
    }

    pub fn add_road(&mut self, road: Road) -> RoadId {
        let id = RoadId(self.roads.len() as u32);
        self.roads.push(road);
        id
    }

    /// Add directed edge `id` from `from` to `to` over `road`
    pub fn add_edge(&mut self, id: EdgeId, from: Uid, to: Uid, road: RoadId) -> Result<()> {
        if self.edge_index.contains_key(&id) {
            return Err(Error::DuplicateEdge(id));
        }
        let from_idx = self.vertex_idx(from).ok_or(Error::UnknownVertex(from))?;
        let to_idx = self.vertex_idx(to).ok_or(Error::UnknownVertex(to))?;
        if road.0 as usize >= self.roads.len() {
            return Err(Error::InvalidSegment {
                id,
                reason: "road record does not exist".to_string(),
            });
        }

        let idx = self.edges.len() as EdgeIdx;
        self.edges.push(Edge {
            id,
            from: from_idx,
            to: to_idx,
            road: road.0,
        });
        self.edge_index.insert(id, idx);
        self.vertices[from_idx as usize].outgoing.push(idx);
        self.vertices[to_idx as usize].incoming.push(idx);
        Ok(())
    }

    /// Add a road segment and the directed edges its one-way code allows
    pub fn add_segment(&mut self, segment: &RoadSegment) -> Result<()> {
        segment.validate()?;
        let from = self.insert_or_get_vertex(segment.from)?;
        let to = self.insert_or_get_vertex(segment.to)?;
        let road = self.add_road(Road::new(
            segment.length,
            segment.capacity,
            segment.oneway,
            segment.shape_points(),
        ));

        match segment.oneway {
            OneWay::Both => {
                self.add_edge(segment.id, from, to, road)?;
                self.add_edge(-segment.id, to, from, road)?;
            }
            OneWay::Forward => self.add_edge(segment.id, from, to, road)?,
            OneWay::Reverse => self.add_edge(-segment.id, to, from, road)?,
        }
        Ok(())
    }

    pub fn contains_vertex(&self, uid: Uid) -> bool {
        self.vertex_index.contains_key(&uid)
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edge_index.contains_key(&id)
    }

    pub fn vertex(&self, uid: Uid) -> Option<&Vertex> {
        self.vertex_idx(uid).map(|idx| &self.vertices[idx as usize])
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.iter()
    }

    pub fn edge(&self, id: EdgeId) -> Option<EdgeRef<'_>> {
        self.edge_idx(id).map(|idx| self.edge_ref(idx))
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeRef<'_>> {
        (0..self.edges.len() as EdgeIdx).map(move |idx| self.edge_ref(idx))
    }

    /// The drivable edge of segment `segment_id`, preferring the positive direction
    pub fn segment_edge(&self, segment_id: i64) -> Option<EdgeRef<'_>> {
        let id = segment_id.abs();
        self.edge(id).or_else(|| self.edge(-id))
    }

    pub fn outgoing(&self, uid: Uid) -> impl Iterator<Item = EdgeRef<'_>> {
        self.vertex(uid)
            .map(|v| v.outgoing.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&idx| self.edge_ref(idx))
    }

    pub fn incoming(&self, uid: Uid) -> impl Iterator<Item = EdgeRef<'_>> {
        self.vertex(uid)
            .map(|v| v.incoming.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&idx| self.edge_ref(idx))
    }

    pub fn spare_capacity(&self, id: EdgeId) -> Option<f64> {
        self.edge(id).map(|e| e.spare_capacity())
    }

    /// Consume `amount` of capacity on the road under edge `id` (both directions)
    pub fn reserve_capacity(&mut self, id: EdgeId, amount: f64) -> Result<()> {
        let idx = self.edge_idx(id).ok_or(Error::UnknownEdge(id))?;
        self.reserve_at(idx, amount);
        Ok(())
    }

    /// Forget all reservations made by previous queries
    pub fn reset_capacity_used(&mut self) {
        for road in &mut self.roads {
            road.capacity_used = 0.0;
        }
    }

    /// Forbid the turn `from_edge -> to_edge` at vertex `via`
    pub fn insert_turn_restriction(
        &mut self,
        via: Uid,
        from_edge: EdgeId,
        to_edge: EdgeId,
    ) -> Result<()> {
        let via_idx = self.vertex_idx(via).ok_or(Error::UnknownVertex(via))?;
        let incoming = self.edge_idx(from_edge).ok_or(Error::UnknownEdge(from_edge))?;
        let outgoing = self.edge_idx(to_edge).ok_or(Error::UnknownEdge(to_edge))?;

        if self.edges[incoming as usize].to != via_idx || self.edges[outgoing as usize].from != via_idx {
            return Err(Error::InvalidTurnRestriction {
                via,
                from_edge,
                to_edge,
            });
        }

        self.restrictions.insert(
            via_idx,
            TurnRestriction {
                via,
                from_edge,
                to_edge,
            },
        );
        Ok(())
    }

    /// Forbidden turns at `uid`; empty when the intersection is unrestricted
    pub fn turn_restrictions(&self, uid: Uid) -> &[TurnRestriction] {
        match self.vertex_idx(uid) {
            Some(idx) => self.restrictions.at(idx),
            None => &[],
        }
    }

    pub fn restriction_index(&self) -> &TurnRestrictionIndex {
        &self.restrictions
    }

    // Index-level access for the search engines

    #[inline]
    pub(crate) fn vertex_idx(&self, uid: Uid) -> Option<VertexIdx> {
        self.vertex_index.get(&uid).copied()
    }

    #[inline]
    pub(crate) fn edge_idx(&self, id: EdgeId) -> Option<EdgeIdx> {
        self.edge_index.get(&id).copied()
    }

    #[inline]
    pub(crate) fn vertex_at(&self, idx: VertexIdx) -> &Vertex {
        &self.vertices[idx as usize]
    }

    #[inline]
    pub(crate) fn edge_at(&self, idx: EdgeIdx) -> &Edge {
        &self.edges[idx as usize]
    }

    #[inline]
    pub(crate) fn edge_ref(&self, idx: EdgeIdx) -> EdgeRef<'_> {
        EdgeRef { graph: self, idx }
    }

    #[inline]
    pub(crate) fn length_at(&self, idx: EdgeIdx) -> f64 {
        self.roads[self.edges[idx as usize].road as usize].length
    }

    #[inline]
    pub(crate) fn spare_at(&self, idx: EdgeIdx) -> f64 {
        self.roads[self.edges[idx as usize].road as usize].spare_capacity()
    }

    #[inline]
    pub(crate) fn forbids_turn(&self, via: VertexIdx, from_edge: EdgeId, to_edge: EdgeId) -> bool {
        self.restrictions.forbids(via, from_edge, to_edge)
    }

    pub(crate) fn reserve_at(&mut self, idx: EdgeIdx, amount: f64) {
        let road = self.edges[idx as usize].road as usize;
        self.roads[road].capacity_used += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn segment(id: i64, from: Point, to: Point, oneway: OneWay) -> RoadSegment {
        RoadSegment {
            id,
            from,
            to,
            length: 10.0,
            capacity: 4.0,
            oneway,
            shape: vec![from, p(from.x(), to.y()), to],
        }
    }

    fn graph() -> Graph {
        Graph::new(UidGrid::new(0.0, 0.0, 10.0))
    }

    #[test]
    fn test_bidirectional_segment_has_twins() {
        let mut g = graph();
        g.add_segment(&segment(7, p(0.0, 0.0), p(1.0, 1.0), OneWay::Both)).unwrap();

        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.road_count(), 1);

        for e in g.edges().filter(|e| e.id() > 0) {
            let twin = e.twin().expect("twin of a bidirectional edge");
            assert_eq!(twin.id(), -e.id());
            assert_eq!(twin.length(), e.length());
            assert_eq!(twin.capacity(), e.capacity());
            assert_eq!(twin.from(), e.to());
            assert_eq!(twin.to(), e.from());
            let (shape, twin_shape) = (e.shape(), twin.shape());
            assert_eq!(shape.first(), twin_shape.last());
            assert_eq!(shape.last(), twin_shape.first());
        }
    }

    #[test]
    fn test_oneway_codes_select_directions() {
        let mut g = graph();
        g.add_segment(&segment(1, p(0.0, 0.0), p(1.0, 0.0), OneWay::Forward)).unwrap();
        g.add_segment(&segment(2, p(1.0, 0.0), p(2.0, 0.0), OneWay::Reverse)).unwrap();

        assert!(g.contains_edge(1) && !g.contains_edge(-1));
        assert!(g.contains_edge(-2) && !g.contains_edge(2));

        let e = g.segment_edge(2).unwrap();
        assert_eq!(e.id(), -2);
        assert_eq!(e.from(), g.uid_of(&p(2.0, 0.0)).unwrap());
        assert_eq!(e.shape().first(), Some(&p(2.0, 0.0)));
        assert!(e.twin().is_none());
    }

    #[test]
    fn test_adjacency_is_wired_both_ways() {
        let mut g = graph();
        g.add_segment(&segment(1, p(0.0, 0.0), p(1.0, 0.0), OneWay::Forward)).unwrap();
        let a = g.uid_of(&p(0.0, 0.0)).unwrap();
        let b = g.uid_of(&p(1.0, 0.0)).unwrap();

        assert_eq!(g.outgoing(a).map(|e| e.id()).collect::<Vec<_>>(), vec![1]);
        assert_eq!(g.incoming(b).map(|e| e.id()).collect::<Vec<_>>(), vec![1]);
        assert_eq!(g.outgoing(b).count(), 0);
        assert_eq!(g.vertex(a).unwrap().out_degree(), 1);
        assert_eq!(g.vertex(b).unwrap().in_degree(), 1);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut g = graph();
        let a = g.add_vertex(p(0.0, 0.0)).unwrap();
        let b = g.add_vertex(p(1.0, 0.0)).unwrap();
        assert!(matches!(g.add_vertex(p(0.0, 0.0)), Err(Error::DuplicateVertex(uid)) if uid == a));

        let road = g.add_road(Road::new(1.0, 1.0, OneWay::Forward, vec![]));
        g.add_edge(3, a, b, road).unwrap();
        assert!(matches!(g.add_edge(3, b, a, road), Err(Error::DuplicateEdge(3))));
        assert!(matches!(g.add_edge(4, a, 999, road), Err(Error::UnknownVertex(999))));
    }

    #[test]
    fn test_uid_collision_is_detected() {
        // Stride of one quantized unit: (1e-6, 0) and (0, 1e-6) share a UID
        let mut g = Graph::new(UidGrid::new(0.0, 0.0, 0.0));
        g.add_vertex(p(0.000001, 0.0)).unwrap();
        let err = g.add_vertex(p(0.0, 0.000001)).unwrap_err();
        assert!(matches!(err, Error::UidCollision { .. }));
    }

    #[test]
    fn test_turn_restriction_must_meet_at_vertex() {
        let mut g = graph();
        g.add_segment(&segment(1, p(0.0, 0.0), p(1.0, 0.0), OneWay::Forward)).unwrap();
        g.add_segment(&segment(2, p(1.0, 0.0), p(2.0, 0.0), OneWay::Forward)).unwrap();
        let a = g.uid_of(&p(0.0, 0.0)).unwrap();
        let b = g.uid_of(&p(1.0, 0.0)).unwrap();

        g.insert_turn_restriction(b, 1, 2).unwrap();
        assert_eq!(g.turn_restrictions(b).len(), 1);
        assert!(g.turn_restrictions(a).is_empty());

        let err = g.insert_turn_restriction(a, 1, 2).unwrap_err();
        assert!(matches!(err, Error::InvalidTurnRestriction { via, .. } if via == a));
        assert!(matches!(g.insert_turn_restriction(b, 1, 9), Err(Error::UnknownEdge(9))));

        // Idempotent
        g.insert_turn_restriction(b, 1, 2).unwrap();
        assert_eq!(g.restriction_index().n_restrictions(), 1);
    }

    #[test]
    fn test_reservation_is_shared_with_twin() {
        let mut g = graph();
        g.add_segment(&segment(5, p(0.0, 0.0), p(0.0, 1.0), OneWay::Both)).unwrap();

        g.reserve_capacity(5, 0.25).unwrap();
        g.reserve_capacity(-5, 0.25).unwrap();
        assert_eq!(g.edge(5).unwrap().capacity_used(), 0.5);
        assert_eq!(g.spare_capacity(-5), Some(3.5));

        g.reset_capacity_used();
        assert_eq!(g.spare_capacity(5), Some(4.0));
        assert!(matches!(g.reserve_capacity(6, 1.0), Err(Error::UnknownEdge(6))));
    }
}
