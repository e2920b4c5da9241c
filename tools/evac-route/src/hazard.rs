//! Hazard and safe zones
//!
//! Regions are planar polygons tagged with a zone kind. Hazard regions turn
//! into turn restrictions: wherever a road enters a hazard region, every
//! turn onto that road at its outside end is forbidden. Safe zones supply
//! routing destinations (see [`crate::planner::destinations`]).
//!
//! Region feed format:
//!
//! ```json
//! [{"name": "fire", "kind": "high_risk", "points": [[0, 0], [1, 0], [1, 1]]}]
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use evac_common::{Error, Point, Result, Uid};
use geo::{BoundingRect, Intersects, LineString, Polygon};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::graph::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Safe,
    LowRisk,
    HighRisk,
}

/// Region feed record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRecord {
    #[serde(default)]
    pub name: Option<String>,
    pub kind: ZoneKind,
    /// Exterior ring; closing the ring is optional
    pub points: Vec<Point>,
}

#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    kind: ZoneKind,
    polygon: Polygon<f64>,
}

impl Region {
    pub fn new(name: impl Into<String>, kind: ZoneKind, ring: &[Point]) -> Result<Self> {
        let name = name.into();
        let mut distinct: Vec<Point> = ring.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() < 3 {
            return Err(Error::InvalidRegion {
                name,
                reason: format!("needs at least 3 distinct points, got {}", distinct.len()),
            });
        }

        let exterior = LineString::from(ring.iter().map(|p| (p.x(), p.y())).collect::<Vec<_>>());
        Ok(Self {
            name,
            kind,
            polygon: Polygon::new(exterior, Vec::new()),
        })
    }

    pub fn from_record(index: usize, record: &RegionRecord) -> Result<Self> {
        let name = record
            .name
            .clone()
            .unwrap_or_else(|| format!("#{index}"));
        Self::new(name, record.kind, &record.points)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ZoneKind {
        self.kind
    }

    pub fn is_safe(&self) -> bool {
        self.kind == ZoneKind::Safe
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Whether `point` lies inside the region or on its boundary
    pub fn contains(&self, point: &Point) -> bool {
        self.polygon.intersects(&geo::Point::new(point.x(), point.y()))
    }

    /// Whether a polyline touches the region boundary
    pub fn crosses_boundary(&self, shape: &[Point]) -> bool {
        let line = LineString::from(shape.iter().map(|p| (p.x(), p.y())).collect::<Vec<_>>());
        line.intersects(self.polygon.exterior())
    }

    /// Center of the bounding box
    pub fn center(&self) -> Option<Point> {
        self.polygon.bounding_rect().map(|rect| {
            let c = rect.center();
            Point::new(c.x, c.y)
        })
    }
}

pub fn load_regions(path: &Path) -> Result<Vec<Region>> {
    let reader = BufReader::new(File::open(path)?);
    let records: Vec<RegionRecord> = serde_json::from_reader(reader)?;
    let regions = records
        .iter()
        .enumerate()
        .map(|(i, r)| Region::from_record(i, r))
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(path = %path.display(), regions = regions.len(), "loaded regions");
    Ok(regions)
}

/// UIDs of the vertices inside `region`, boundary included
pub fn vertices_in_region(graph: &Graph, region: &Region) -> Vec<Uid> {
    graph
        .vertices()
        .filter(|v| region.contains(&v.point()))
        .map(|v| v.uid())
        .collect()
}

/// Forbid every turn onto an edge that enters one of `regions`
///
/// An edge enters a region when its shape crosses the boundary, its `to`
/// vertex is inside and its `from` vertex is outside. Returns the number of
/// restrictions added.
pub fn add_turn_restrictions(graph: &mut Graph, regions: &[Region]) -> Result<usize> {
    let before = graph.restriction_index().n_restrictions();
    let mut handled: FxHashSet<i64> = FxHashSet::default();
    let mut forbidden = Vec::new();

    for region in regions {
        for edge in graph.edges() {
            if handled.contains(&edge.id()) {
                continue;
            }
            let (Some(from), Some(to)) = (graph.vertex(edge.from()), graph.vertex(edge.to())) else {
                continue;
            };
            if !region.contains(&to.point()) || region.contains(&from.point()) {
                continue;
            }
            let mut shape = edge.shape();
            if shape.len() < 2 {
                shape = vec![from.point(), to.point()];
            }
            if !region.crosses_boundary(&shape) {
                continue;
            }

            handled.insert(edge.id());
            for incoming in graph.incoming(edge.from()) {
                forbidden.push((edge.from(), incoming.id(), edge.id()));
            }
        }
    }

    for (via, from_edge, to_edge) in forbidden {
        graph.insert_turn_restriction(via, from_edge, to_edge)?;
    }

    let added = graph.restriction_index().n_restrictions() - before;
    tracing::info!(
        regions = regions.len(),
        entering_edges = handled.len(),
        restrictions = added,
        "derived turn restrictions from hazard regions"
    );
    Ok(added)
}
