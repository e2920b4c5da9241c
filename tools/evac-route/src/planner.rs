//! Batch evacuation planning
//!
//! Routes every user to the nearest safe destination over a graph whose
//! hazard regions have been turned into turn restrictions. Users are routed
//! one after another against the same graph, so each route's capacity
//! reservation pushes later users toward less loaded roads.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use evac_common::{Error, Point, Result, Uid};
use geo::Geometry;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::graph::Graph;
use crate::hazard::{self, Region};
use crate::search::engine::path_geometry;
use crate::search::PathEngine;
use crate::snap::EdgeSnapper;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub user_id: u64,
    pub point: Point,
}

/// Evacuation route of one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRoute {
    pub user_id: u64,
    /// The user's own location alone when no destination is reachable
    pub points: Vec<Point>,
    pub cost: Option<f64>,
    pub destination: Option<Uid>,
}

impl UserRoute {
    pub fn is_reachable(&self) -> bool {
        self.destination.is_some()
    }

    pub fn geometry(&self) -> Option<Geometry<f64>> {
        path_geometry(&self.points)
    }
}

/// Outcome of a batch; failed users have no route
#[derive(Debug)]
pub struct PlanReport {
    pub routes: Vec<UserRoute>,
    pub total: usize,
    pub failed: usize,
    pub last_error: Option<Error>,
}

impl PlanReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Routes of a batch in which every user was routed, or `BatchFailed`
    pub fn into_result(self) -> Result<Vec<UserRoute>> {
        match self.last_error {
            Some(source) if self.failed > 0 => Err(Error::BatchFailed {
                failed: self.failed,
                total: self.total,
                source: Box::new(source),
            }),
            _ => Ok(self.routes),
        }
    }
}

pub fn load_users(path: &Path) -> Result<Vec<UserLocation>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Destination vertices for an evacuation
///
/// With safe zones: every vertex inside one, or for a zone without vertices,
/// both ends of the road nearest to its center. Without safe zones: every
/// vertex outside all hazard regions.
pub fn destinations(graph: &Graph, snapper: &EdgeSnapper, regions: &[Region]) -> Result<FxHashSet<Uid>> {
    let mut targets = FxHashSet::default();
    let (safe, hazards): (Vec<&Region>, Vec<&Region>) = regions.iter().partition(|r| r.is_safe());

    if !safe.is_empty() {
        for zone in safe {
            let inside = hazard::vertices_in_region(graph, zone);
            if !inside.is_empty() {
                targets.extend(inside);
                continue;
            }
            let Some(center) = zone.center() else {
                continue;
            };
            let snap = snapper.snap(center)?;
            let edge = graph.edge(snap.edge).ok_or(Error::UnknownEdge(snap.edge))?;
            tracing::debug!(zone = zone.name(), edge = snap.edge, "safe zone has no vertex, using nearest road");
            targets.insert(edge.from());
            targets.insert(edge.to());
        }
    } else {
        let mut unsafe_vertices = FxHashSet::default();
        for region in hazards {
            unsafe_vertices.extend(hazard::vertices_in_region(graph, region));
        }
        targets.extend(
            graph
                .vertices()
                .map(|v| v.uid())
                .filter(|uid| !unsafe_vertices.contains(uid)),
        );
    }
    Ok(targets)
}

/// Route every user out of the hazard regions
///
/// Turn restrictions for the hazard regions are added to `graph`, and every
/// returned route leaves its capacity reservation on it. Per-user failures
/// are counted in the report rather than aborting the batch.
pub fn plan_evacuation(
    graph: &mut Graph,
    regions: &[Region],
    users: &[UserLocation],
    config: &SearchConfig,
) -> Result<PlanReport> {
    let hazards: Vec<Region> = regions.iter().filter(|r| !r.is_safe()).cloned().collect();
    hazard::add_turn_restrictions(graph, &hazards)?;

    let snapper = EdgeSnapper::new(graph);
    let targets = destinations(graph, &snapper, regions)?;
    tracing::info!(users = users.len(), destinations = targets.len(), "planning evacuation");

    let mut engine = PathEngine::new(graph, [], config);
    let mut report = PlanReport {
        routes: Vec::with_capacity(users.len()),
        total: users.len(),
        failed: 0,
        last_error: None,
    };

    for user in users {
        let routed = snapper
            .snap(user.point)
            .and_then(|start| engine.execute(&start, &targets));
        match routed {
            Ok(Some(route)) => report.routes.push(UserRoute {
                user_id: user.user_id,
                points: route.points,
                cost: Some(route.cost),
                destination: Some(route.destination),
            }),
            Ok(None) => report.routes.push(UserRoute {
                user_id: user.user_id,
                points: vec![user.point],
                cost: None,
                destination: None,
            }),
            Err(e) => {
                tracing::warn!(user_id = user.user_id, error = %e, "failed to route user");
                report.failed += 1;
                report.last_error = Some(e);
            }
        }
    }

    let unreachable = report.routes.iter().filter(|r| !r.is_reachable()).count();
    tracing::info!(
        routed = report.routes.len() - unreachable,
        unreachable,
        failed = report.failed,
        "evacuation plan finished"
    );
    Ok(report)
}
