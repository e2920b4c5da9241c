//! Topology feed loading and graph construction
//!
//! The feed is a JSON array of road segments:
//!
//! ```json
//! [{"id": 1, "from": [-118.29, 34.02], "to": [-118.28, 34.02],
//!   "length": 120.5, "capacity": 3.0, "oneway": "B",
//!   "shape": [[-118.29, 34.02], [-118.28, 34.02]]}]
//! ```
//!
//! `shape` is optional and defaults to the straight line `[from, to]`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use evac_common::{Error, Point, Result, UidGrid};
use serde::{Deserialize, Serialize};

use crate::config::{RoutingConfig, TopologyConfig};
use crate::graph::{Graph, OneWay};

/// One physical road segment of the topology feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadSegment {
    /// Positive segment id; its directed edges are `id` and `-id`
    pub id: i64,
    pub from: Point,
    pub to: Point,
    pub length: f64,
    pub capacity: f64,
    pub oneway: OneWay,
    #[serde(default)]
    pub shape: Vec<Point>,
}

impl RoadSegment {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidSegment {
            id: self.id,
            reason,
        };

        if self.id <= 0 {
            return Err(invalid("segment ids must be positive".to_string()));
        }
        if !self.from.is_in_range() || !self.to.is_in_range() {
            return Err(invalid(format!("endpoint {} -> {} is out of coordinate range", self.from, self.to)));
        }
        if !self.length.is_finite() || self.length < 0.0 {
            return Err(invalid(format!("length {} is not a finite non-negative number", self.length)));
        }
        if !self.capacity.is_finite() {
            return Err(invalid(format!("capacity {} is not finite", self.capacity)));
        }
        match self.shape.as_slice() {
            [] => Ok(()),
            [_] => Err(invalid("shape needs at least two points".to_string())),
            [first, .., last] if *first != self.from || *last != self.to => Err(invalid(format!(
                "shape runs {first} -> {last} but the segment runs {} -> {}",
                self.from, self.to
            ))),
            _ => Ok(()),
        }
    }

    /// Shape in digitization direction, `[from, to]` when none was given
    pub fn shape_points(&self) -> Vec<Point> {
        if self.shape.is_empty() {
            vec![self.from, self.to]
        } else {
            self.shape.clone()
        }
    }
}

/// Read a JSON topology feed
pub fn load_segments(path: &Path) -> Result<Vec<RoadSegment>> {
    let reader = BufReader::new(File::open(path)?);
    let segments: Vec<RoadSegment> = serde_json::from_reader(reader)?;
    tracing::debug!(path = %path.display(), segments = segments.len(), "loaded topology feed");
    Ok(segments)
}

/// Build a graph from feed records
///
/// With no `grid`, the UID grid is fitted to the bounding box of all segment
/// endpoints, which makes UIDs collision free.
pub fn build_graph(segments: &[RoadSegment], config: &TopologyConfig, grid: Option<UidGrid>) -> Result<Graph> {
    let grid = match grid {
        Some(grid) => grid,
        None => UidGrid::covering(segments.iter().flat_map(|s| [&s.from, &s.to]))?,
    };
    let mut graph = Graph::with_capacity(grid, segments.len(), segments.len() * 2);

    for segment in segments {
        if config.reverse {
            let mut flipped = segment.clone();
            flipped.oneway = segment.oneway.reversed();
            graph.add_segment(&flipped)?;
        } else {
            graph.add_segment(segment)?;
        }
    }

    tracing::info!(
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        roads = graph.road_count(),
        reverse = config.reverse,
        "built road graph"
    );
    Ok(graph)
}

/// Load a feed and build its graph with the topology and grid settings of `config`
pub fn load_graph(path: &Path, config: &RoutingConfig) -> Result<Graph> {
    let segments = load_segments(path)?;
    build_graph(&segments, &config.topology, config.uid_grid())
}
