//! Multi-target shortest path search with capacity tie-breaking
//!
//! A label-setting Dijkstra over [`Graph`] that stops at the first requested
//! target it settles. Among equal-cost paths it keeps the one with the larger
//! bottleneck (minimum spare capacity), and it never takes a turn forbidden
//! at the vertex being expanded. Every edge of a returned route has
//! `reservation_increment` of its road's capacity reserved, so repeated
//! queries spread load over alternative roads.

use std::collections::HashSet;
use std::hash::BuildHasher;

use evac_common::{Point, Result, Uid};
use geo::{Geometry, LineString};
use serde::{Deserialize, Serialize};

use super::{seed_start, SearchKey, SearchState};
use crate::config::SearchConfig;
use crate::graph::{EdgeId, EdgeIdx, Graph, VertexIdx};
use crate::heap::IndexedMinHeap;
use crate::snap::SnapPoint;

/// A path from a query point to one of the requested targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Query point (unless it is the first vertex) followed by the shape of every edge
    pub points: Vec<Point>,
    /// Edges travelled after leaving the snapped start edge, in order
    pub edges: Vec<EdgeId>,
    pub cost: f64,
    /// Minimum spare capacity along the path before this route reserved any
    pub bottleneck: f64,
    pub destination: Uid,
}

impl Route {
    pub fn geometry(&self) -> Option<Geometry<f64>> {
        path_geometry(&self.points)
    }
}

/// LineString of a point sequence; a lone point stays a Point
pub fn path_geometry(points: &[Point]) -> Option<Geometry<f64>> {
    match points {
        [] => None,
        [p] => Some(Geometry::Point(geo::Point::new(p.x(), p.y()))),
        _ => Some(Geometry::LineString(LineString::from(
            points.iter().map(|p| (p.x(), p.y())).collect::<Vec<_>>(),
        ))),
    }
}

/// Search engine bound to one graph and one set of closed vertices
///
/// Holds the graph mutably: routes reserve capacity on it.
pub struct PathEngine<'g> {
    graph: &'g mut Graph,
    restricted: Vec<VertexIdx>,
    heap: IndexedMinHeap<VertexIdx, SearchKey>,
    state: SearchState,
    reservation_increment: f64,
}

impl<'g> PathEngine<'g> {
    /// `restricted` vertices are never settled or expanded by any search
    pub fn new<I>(graph: &'g mut Graph, restricted: I, config: &SearchConfig) -> Self
    where
        I: IntoIterator<Item = Uid>,
    {
        let mut closed = Vec::new();
        for uid in restricted {
            match graph.vertex_idx(uid) {
                Some(idx) => closed.push(idx),
                None => tracing::warn!(uid, "ignoring restricted vertex that is not in the graph"),
            }
        }
        closed.sort_unstable();
        closed.dedup();

        let n = graph.vertex_count();
        Self {
            graph,
            restricted: closed,
            heap: IndexedMinHeap::with_capacity(64),
            state: SearchState::new(n),
            reservation_increment: config.reservation_increment,
        }
    }

    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    /// Route from `start` to the cheapest reachable vertex in `targets`
    ///
    /// `Ok(None)` when no target can be reached.
    pub fn execute<S: BuildHasher>(
        &mut self,
        start: &SnapPoint,
        targets: &HashSet<Uid, S>,
    ) -> Result<Option<Route>> {
        self.heap.clear();
        self.state.reset(self.graph.vertex_count());

        let found = {
            let Self {
                graph,
                restricted,
                heap,
                state,
                ..
            } = self;
            let graph: &Graph = &**graph;

            let start_edges = seed_start(graph, start, heap, state)?;
            for &v in restricted.iter() {
                if !heap.contains(&v) {
                    state.close(v);
                }
            }

            let mut settled = 0usize;
            let mut pruned = 0usize;
            let mut found = None;

            while let Some((u, _)) = heap.pop_min() {
                state.close(u);
                settled += 1;

                let vertex = graph.vertex_at(u);
                if targets.contains(&vertex.uid()) {
                    found = Some(u);
                    break;
                }

                let label = state.get(u);
                let entry = label
                    .lead
                    .or_else(|| start_edges.entry_of(graph, u))
                    .map(|e| graph.edge_at(e).id);

                for &e in &vertex.outgoing {
                    let edge = graph.edge_at(e);
                    let v = edge.to;
                    if state.is_closed(v) {
                        continue;
                    }
                    if let Some(entry) = entry {
                        if graph.forbids_turn(u, entry, edge.id) {
                            pruned += 1;
                            continue;
                        }
                    }

                    let cost = label.cost + graph.length_at(e);
                    let bottleneck = label.bottleneck.min(graph.spare_at(e));
                    let key = SearchKey::new(cost, bottleneck);
                    if !heap.contains(&v) {
                        state.set(v, cost, bottleneck, Some(e));
                        heap.push(v, key);
                    } else if key < state.get(v).key() {
                        state.set(v, cost, bottleneck, Some(e));
                        heap.decrease_key(&v, key);
                    }
                }
            }

            tracing::debug!(
                start_edge = start.edge,
                settled,
                pruned,
                reached = found.is_some(),
                "search finished"
            );
            found
        };

        Ok(found.map(|target| self.reconstruct(start, target)))
    }

    /// Walk leading edges back from `target`, reserving capacity on each
    fn reconstruct(&mut self, start: &SnapPoint, target: VertexIdx) -> Route {
        let label = self.state.get(target);

        let mut chain: Vec<EdgeIdx> = Vec::new();
        let mut v = target;
        while let Some(e) = self.state.get(v).lead {
            chain.push(e);
            v = self.graph.edge_at(e).from;
        }
        chain.reverse();

        let first = self.graph.vertex_at(v).point();
        let mut points = Vec::with_capacity(chain.len() * 2 + 2);
        if start.point != first {
            points.push(start.point);
        }
        points.push(first);

        let mut edges = Vec::with_capacity(chain.len());
        for &e in &chain {
            let edge = self.graph.edge_ref(e);
            let shape = edge.shape();
            if shape.len() >= 2 {
                points.extend_from_slice(&shape[1..]);
            } else {
                points.push(self.graph.vertex_at(self.graph.edge_at(e).to).point());
            }
            edges.push(edge.id());
            self.graph.reserve_at(e, self.reservation_increment);
        }

        Route {
            points,
            edges,
            cost: label.cost,
            bottleneck: label.bottleneck,
            destination: self.graph.vertex_at(target).uid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OneWay;
    use crate::topology::RoadSegment;
    use evac_common::{Error, UidGrid};

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn seg(id: i64, from: Point, to: Point, length: f64, capacity: f64, oneway: OneWay) -> RoadSegment {
        RoadSegment {
            id,
            from,
            to,
            length,
            capacity,
            oneway,
            shape: Vec::new(),
        }
    }

    fn build(segments: &[RoadSegment]) -> Graph {
        let mut g = Graph::new(UidGrid::new(-10.0, -10.0, 20.0));
        for s in segments {
            g.add_segment(s).unwrap();
        }
        g
    }

    fn targets(g: &Graph, points: &[Point]) -> HashSet<Uid> {
        points.iter().map(|pt| g.uid_of(pt).unwrap()).collect()
    }

    const A: (f64, f64) = (0.0, 0.0);
    const B: (f64, f64) = (1.0, 0.0);
    const C: (f64, f64) = (2.0, 0.0);

    fn chain() -> Graph {
        build(&[
            seg(1, p(A.0, A.1), p(B.0, B.1), 10.0, 5.0, OneWay::Forward),
            seg(2, p(B.0, B.1), p(C.0, C.1), 10.0, 5.0, OneWay::Forward),
        ])
    }

    #[test]
    fn test_chain_route() {
        let mut g = chain();
        let goal = targets(&g, &[p(C.0, C.1)]);
        let mut engine = PathEngine::new(&mut g, [], &SearchConfig::default());

        // Snapped at the very start of A->B, query point is A itself
        let start = SnapPoint::on_edge(p(A.0, A.1), 1, 0.0);
        let route = engine.execute(&start, &goal).unwrap().expect("C is reachable");

        assert_eq!(route.points, vec![p(A.0, A.1), p(B.0, B.1), p(C.0, C.1)]);
        assert_eq!(route.edges, vec![2]);
        assert_eq!(route.cost, 20.0);
        assert_eq!(route.bottleneck, 5.0);
        assert_eq!(route.destination, engine.graph().uid_of(&p(C.0, C.1)).unwrap());
    }

    #[test]
    fn test_query_point_is_prepended() {
        let mut g = chain();
        let goal = targets(&g, &[p(C.0, C.1)]);
        let mut engine = PathEngine::new(&mut g, [], &SearchConfig::default());

        let start = SnapPoint::on_edge(p(0.5, 0.1), 1, 5.0);
        let route = engine.execute(&start, &goal).unwrap().unwrap();
        assert_eq!(route.points.first(), Some(&p(0.5, 0.1)));
        assert_eq!(route.points.last(), Some(&p(C.0, C.1)));
        assert_eq!(route.cost, 15.0);
    }

    #[test]
    fn test_forbidden_turn_makes_target_unreachable() {
        let mut g = build(&[
            seg(3, p(-1.0, 0.0), p(A.0, A.1), 1.0, 5.0, OneWay::Forward),
            seg(1, p(A.0, A.1), p(B.0, B.1), 5.0, 5.0, OneWay::Forward),
            seg(2, p(B.0, B.1), p(C.0, C.1), 1.0, 5.0, OneWay::Forward),
        ]);
        let b = g.uid_of(&p(B.0, B.1)).unwrap();
        g.insert_turn_restriction(b, 1, 2).unwrap();
        let goal = targets(&g, &[p(C.0, C.1)]);

        let mut engine = PathEngine::new(&mut g, [], &SearchConfig::default());
        let start = SnapPoint::on_edge(p(-1.0, 0.0), 3, 0.0);
        assert_eq!(engine.execute(&start, &goal).unwrap(), None);

        // Still reachable without the restriction
        let mut open = build(&[
            seg(3, p(-1.0, 0.0), p(A.0, A.1), 1.0, 5.0, OneWay::Forward),
            seg(1, p(A.0, A.1), p(B.0, B.1), 5.0, 5.0, OneWay::Forward),
            seg(2, p(B.0, B.1), p(C.0, C.1), 1.0, 5.0, OneWay::Forward),
        ]);
        let mut engine = PathEngine::new(&mut open, [], &SearchConfig::default());
        let route = engine.execute(&start, &goal).unwrap().unwrap();
        assert_eq!(route.edges, vec![1, 2]);
        assert_eq!(route.cost, 7.0);
    }

    #[test]
    fn test_restriction_applies_to_seeded_vertex() {
        // The start edge itself is the entry edge of B
        let mut g = build(&[
            seg(1, p(A.0, A.1), p(B.0, B.1), 5.0, 5.0, OneWay::Forward),
            seg(2, p(B.0, B.1), p(C.0, C.1), 1.0, 5.0, OneWay::Forward),
        ]);
        let b = g.uid_of(&p(B.0, B.1)).unwrap();
        g.insert_turn_restriction(b, 1, 2).unwrap();
        let goal = targets(&g, &[p(C.0, C.1)]);

        let mut engine = PathEngine::new(&mut g, [], &SearchConfig::default());
        let start = SnapPoint::on_edge(p(0.9, 0.0), 1, 4.5);
        assert!(engine.execute(&start, &goal).unwrap().is_none());
    }

    #[test]
    fn test_equal_cost_prefers_wider_bottleneck() {
        // Two 20-long paths from S to T: via N (capacity 1) and via W (capacity 9)
        let s = p(0.0, 0.0);
        let n = p(1.0, 1.0);
        let w = p(1.0, -1.0);
        let t = p(2.0, 0.0);
        let start_end = p(-1.0, 0.0);
        let mut g = build(&[
            seg(1, start_end, s, 1.0, 50.0, OneWay::Forward),
            seg(2, s, n, 10.0, 1.0, OneWay::Forward),
            seg(3, n, t, 10.0, 1.0, OneWay::Forward),
            seg(4, s, w, 10.0, 9.0, OneWay::Forward),
            seg(5, w, t, 10.0, 9.0, OneWay::Forward),
        ]);
        let goal = targets(&g, &[t]);

        let mut engine = PathEngine::new(&mut g, [], &SearchConfig::default());
        let route = engine
            .execute(&SnapPoint::on_edge(start_end, 1, 0.0), &goal)
            .unwrap()
            .unwrap();
        assert_eq!(route.edges, vec![4, 5]);
        assert_eq!(route.cost, 21.0);
        assert_eq!(route.bottleneck, 9.0);
    }

    #[test]
    fn test_equal_cost_wider_path_settled_later_wins() {
        // N pops before W (wider so far) but its road into T is the narrow one,
        // so T's label must be replaced when W is expanded
        let s = p(0.0, 0.0);
        let n = p(1.0, 1.0);
        let w = p(1.0, -1.0);
        let t = p(2.0, 0.0);
        let start_end = p(-1.0, 0.0);
        let mut g = build(&[
            seg(1, start_end, s, 1.0, 50.0, OneWay::Forward),
            seg(2, s, n, 10.0, 9.0, OneWay::Forward),
            seg(3, n, t, 10.0, 1.0, OneWay::Forward),
            seg(4, s, w, 10.0, 5.0, OneWay::Forward),
            seg(5, w, t, 10.0, 5.0, OneWay::Forward),
        ]);
        let goal = targets(&g, &[t]);

        let mut engine = PathEngine::new(&mut g, [], &SearchConfig::default());
        let route = engine
            .execute(&SnapPoint::on_edge(start_end, 1, 0.0), &goal)
            .unwrap()
            .unwrap();
        assert_eq!(route.edges, vec![4, 5]);
        assert_eq!(route.cost, 21.0);
        assert_eq!(route.bottleneck, 5.0);
    }

    #[test]
    fn test_repeated_queries_accumulate_reservations() {
        let mut g = chain();
        let goal = targets(&g, &[p(C.0, C.1)]);
        let config = SearchConfig::default();
        let mut engine = PathEngine::new(&mut g, [], &config);

        let start = SnapPoint::on_edge(p(A.0, A.1), 1, 0.0);
        let mut last_spare = f64::INFINITY;
        for _ in 0..4 {
            engine.execute(&start, &goal).unwrap().unwrap();
            let spare = engine.graph().spare_capacity(2).unwrap();
            assert!(spare < last_spare);
            last_spare = spare;
        }
        // The partially driven start edge is not reserved
        assert_eq!(g.edge(1).unwrap().capacity_used(), 0.0);
        assert_eq!(g.edge(2).unwrap().capacity_used(), 4.0 * config.reservation_increment);
    }

    #[test]
    fn test_reservation_steers_next_query() {
        // Equal-cost alternatives; the first route eats into its own bottleneck
        let s = p(0.0, 0.0);
        let n = p(1.0, 1.0);
        let w = p(1.0, -1.0);
        let t = p(2.0, 0.0);
        let mut g = build(&[
            seg(1, p(-1.0, 0.0), s, 1.0, 50.0, OneWay::Forward),
            seg(2, s, n, 10.0, 2.0, OneWay::Forward),
            seg(3, n, t, 10.0, 2.0, OneWay::Forward),
            seg(4, s, w, 10.0, 2.1, OneWay::Forward),
            seg(5, w, t, 10.0, 2.1, OneWay::Forward),
        ]);
        let goal = targets(&g, &[t]);
        let config = SearchConfig {
            reservation_increment: 0.5,
        };
        let mut engine = PathEngine::new(&mut g, [], &config);
        let start = SnapPoint::on_edge(p(-1.0, 0.0), 1, 0.0);

        let first = engine.execute(&start, &goal).unwrap().unwrap();
        let second = engine.execute(&start, &goal).unwrap().unwrap();
        assert_eq!(first.edges, vec![4, 5]);
        assert_eq!(second.edges, vec![2, 3]);
    }

    #[test]
    fn test_restricted_vertices_are_never_crossed() {
        // Short way through B is closed, long way around through D is open
        let d = p(1.0, 1.0);
        let mut g = build(&[
            seg(1, p(A.0, A.1), p(B.0, B.1), 1.0, 5.0, OneWay::Forward),
            seg(2, p(B.0, B.1), p(C.0, C.1), 1.0, 5.0, OneWay::Forward),
            seg(3, p(A.0, A.1), d, 5.0, 5.0, OneWay::Forward),
            seg(4, d, p(C.0, C.1), 5.0, 5.0, OneWay::Forward),
            seg(5, p(-1.0, 0.0), p(A.0, A.1), 1.0, 5.0, OneWay::Forward),
        ]);
        let goal = targets(&g, &[p(C.0, C.1)]);
        let blocked = g.uid_of(&p(B.0, B.1)).unwrap();

        let mut engine = PathEngine::new(&mut g, [blocked, 424_242], &SearchConfig::default());
        let route = engine
            .execute(&SnapPoint::on_edge(p(-1.0, 0.0), 5, 0.0), &goal)
            .unwrap()
            .unwrap();
        assert_eq!(route.edges, vec![3, 4]);
        assert_eq!(route.cost, 11.0);
    }

    #[test]
    fn test_two_sided_start_takes_the_shorter_side() {
        // Snapped near the B end of A<->B; target A is closer going backwards
        let mut g = build(&[
            seg(1, p(A.0, A.1), p(B.0, B.1), 10.0, 5.0, OneWay::Both),
            seg(2, p(B.0, B.1), p(C.0, C.1), 10.0, 5.0, OneWay::Both),
        ]);
        let goal = targets(&g, &[p(A.0, A.1), p(C.0, C.1)]);
        let mut engine = PathEngine::new(&mut g, [], &SearchConfig::default());

        let near_a = SnapPoint::on_edge(p(0.2, 0.0), 1, 2.0);
        let route = engine.execute(&near_a, &goal).unwrap().unwrap();
        assert_eq!(route.cost, 2.0);
        assert_eq!(route.points, vec![p(0.2, 0.0), p(A.0, A.1)]);
        assert!(route.edges.is_empty());

        let only_c = targets(engine.graph(), &[p(C.0, C.1)]);
        let near_b = SnapPoint::on_edge(p(0.9, 0.0), 1, 9.0);
        let route = engine.execute(&near_b, &only_c).unwrap().unwrap();
        assert_eq!(route.cost, 11.0);
        assert_eq!(route.edges, vec![2]);
    }

    #[test]
    fn test_oneway_start_does_not_go_backwards() {
        let mut g = chain();
        let goal = targets(&g, &[p(A.0, A.1)]);
        let mut engine = PathEngine::new(&mut g, [], &SearchConfig::default());
        let start = SnapPoint::on_edge(p(0.1, 0.0), 1, 1.0);
        assert_eq!(engine.execute(&start, &goal).unwrap(), None);
    }

    #[test]
    fn test_bad_start_is_a_usage_error() {
        let mut g = chain();
        let goal = targets(&g, &[p(C.0, C.1)]);
        let mut engine = PathEngine::new(&mut g, [], &SearchConfig::default());

        let err = engine
            .execute(&SnapPoint::on_edge(p(A.0, A.1), 77, 0.0), &goal)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEdge(77)));

        let err = engine
            .execute(&SnapPoint::on_edge(p(A.0, A.1), 1, f64::NAN), &goal)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSnap { edge: 1, .. }));
        assert!(err.is_usage_error());
    }

    #[test]
    fn test_route_geometry() {
        let line = path_geometry(&[p(0.0, 0.0), p(1.0, 0.0)]);
        assert!(matches!(line, Some(Geometry::LineString(ref ls)) if ls.0.len() == 2));
        assert!(matches!(path_geometry(&[p(3.0, 4.0)]), Some(Geometry::Point(_))));
        assert!(path_geometry(&[]).is_none());
    }
}
