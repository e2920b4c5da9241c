//! Capacity-aware evacuation routing
//!
//! Builds a directed road graph from a topology feed, turns hazard regions
//! into turn restrictions and routes evacuees to the nearest safe
//! destination, preferring roads with spare capacity among equally short
//! alternatives.

pub mod config;
pub mod graph;
pub mod hazard;
pub mod heap;
pub mod planner;
pub mod search;
pub mod snap;
pub mod topology;

pub use config::RoutingConfig;
pub use graph::{EdgeId, Graph, OneWay, TurnRestriction};
pub use hazard::{Region, ZoneKind};
pub use planner::{plan_evacuation, PlanReport, UserLocation, UserRoute};
pub use search::{PathEngine, PrecomputeEngine, Reachability, Route};
pub use snap::{EdgeSnapper, SnapPoint};
pub use topology::{build_graph, load_graph, RoadSegment};
