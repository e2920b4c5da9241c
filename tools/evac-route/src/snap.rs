//! Snapping query points onto the road network
//!
//! Builds an R-tree over every shape segment of every drivable road and
//! projects a query point onto the nearest one. The distance along the edge
//! is measured on the planar shape and rescaled to the road's nominal
//! length, so it can be compared with edge lengths directly.

use evac_common::{Error, Point, Result, Uid};
use rstar::primitives::{GeomWithData, Line};
use rstar::RTree;

use crate::graph::{EdgeId, Graph};

/// A query point attached to a directed edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapPoint {
    /// The original query location
    pub point: Point,
    pub edge: EdgeId,
    /// Distance from the edge's `from` vertex, in edge length units
    pub position: f64,
    /// Closest location on the edge's shape
    pub projected: Point,
}

impl SnapPoint {
    /// Snap point placed by hand at `position` along `edge`
    pub fn on_edge(point: Point, edge: EdgeId, position: f64) -> Self {
        Self {
            point,
            edge,
            position,
            projected: point,
        }
    }

    /// The end of the snapped edge closer along the road
    pub fn nearest_vertex(&self, graph: &Graph) -> Option<Uid> {
        let edge = graph.edge(self.edge)?;
        if self.position * 2.0 <= edge.length() {
            Some(edge.from())
        } else {
            Some(edge.to())
        }
    }
}

/// Where a shape segment sits along its edge
#[derive(Debug, Clone, Copy)]
struct Piece {
    edge: EdgeId,
    /// Planar distance from the edge start to this segment's start
    offset: f64,
    /// Planar length of the whole edge shape
    shape_length: f64,
    /// Nominal edge length
    length: f64,
}

type IndexedSegment = GeomWithData<Line<[f64; 2]>, Piece>;

pub struct EdgeSnapper {
    tree: RTree<IndexedSegment>,
}

impl EdgeSnapper {
    /// Index one drivable direction of every road in `graph`
    pub fn new(graph: &Graph) -> Self {
        let mut segments = Vec::with_capacity(graph.edge_count());

        // Positive edges stand for their road; reverse-only roads only have the negative one
        for edge in graph.edges().filter(|e| e.id() > 0 || e.twin().is_none()) {
            let mut shape = edge.shape();
            if shape.len() < 2 {
                let endpoints = graph
                    .vertex(edge.from())
                    .zip(graph.vertex(edge.to()))
                    .map(|(a, b)| [a.point(), b.point()]);
                match endpoints {
                    Some(points) => shape = points.to_vec(),
                    None => continue,
                }
            }

            let shape_length: f64 = shape.windows(2).map(|w| w[0].distance(&w[1])).sum();
            let mut offset = 0.0;
            for w in shape.windows(2) {
                segments.push(GeomWithData::new(
                    Line::new([w[0].x(), w[0].y()], [w[1].x(), w[1].y()]),
                    Piece {
                        edge: edge.id(),
                        offset,
                        shape_length,
                        length: edge.length(),
                    },
                ));
                offset += w[0].distance(&w[1]);
            }
        }

        tracing::debug!(segments = segments.len(), "built snapping index");
        Self {
            tree: RTree::bulk_load(segments),
        }
    }

    /// Number of indexed shape segments
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Project `point` onto the nearest road
    pub fn snap(&self, point: Point) -> Result<SnapPoint> {
        let query = [point.x(), point.y()];
        let nearest = self.tree.nearest_neighbor(&query).ok_or(Error::EmptyGraph)?;
        let line = nearest.geom();
        let piece = nearest.data;

        let dx = line.to[0] - line.from[0];
        let dy = line.to[1] - line.from[1];
        let len2 = dx * dx + dy * dy;
        let t = if len2 > 0.0 {
            (((query[0] - line.from[0]) * dx + (query[1] - line.from[1]) * dy) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let along = piece.offset + t * len2.sqrt();
        let position = if piece.shape_length > 0.0 {
            (along / piece.shape_length * piece.length).clamp(0.0, piece.length)
        } else {
            0.0
        };

        Ok(SnapPoint {
            point,
            edge: piece.edge,
            position,
            projected: Point::new(line.from[0] + t * dx, line.from[1] + t * dy),
        })
    }
}
