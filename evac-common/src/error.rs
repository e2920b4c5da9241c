//! Error types for the evac-route toolkit
//!
//! Usage errors (duplicate ids, turn restrictions whose edges do not meet,
//! bad snap points) fail fast. Unreachable destinations are not errors and
//! never show up here; they are encoded in search results instead.

use crate::point::{Point, Uid};

/// Main error type for evac-route operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A vertex with this UID is already part of the graph
    #[error("vertex {0} already exists")]
    DuplicateVertex(Uid),

    /// Two distinct points quantize to the same UID under the active grid
    #[error("UID {uid} is shared by {existing} and {incoming}; the UID grid does not cover the data")]
    UidCollision {
        uid: Uid,
        existing: Point,
        incoming: Point,
    },

    /// A point whose UID does not fit in an `i64` under the active grid
    #[error("point {0} is beyond the range of the UID grid")]
    GridOverflow(Point),

    /// NaN, infinite or out of range coordinate
    #[error("coordinate ({x}, {y}) is not a finite value within range")]
    InvalidCoordinate { x: f64, y: f64 },

    /// A directed edge with this signed id is already part of the graph
    #[error("edge {0} already exists")]
    DuplicateEdge(i64),

    #[error("vertex {0} is not part of the graph")]
    UnknownVertex(Uid),

    #[error("edge {0} is not part of the graph")]
    UnknownEdge(i64),

    /// The incoming edge does not end at `via` or the outgoing edge does not start there
    #[error("turn restriction {from_edge} -> {to_edge} does not meet at vertex {via}")]
    InvalidTurnRestriction { via: Uid, from_edge: i64, to_edge: i64 },

    #[error("invalid snap point on edge {edge}: {reason}")]
    InvalidSnap { edge: i64, reason: String },

    /// A topology record that cannot become a road
    #[error("invalid road segment {id}: {reason}")]
    InvalidSegment { id: i64, reason: String },

    /// A region polygon that cannot be built
    #[error("invalid region {name}: {reason}")]
    InvalidRegion { name: String, reason: String },

    /// Snapping requested on a graph without any edge
    #[error("graph has no edges to snap onto")]
    EmptyGraph,

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Raised after every origin of a batch was attempted
    #[error("{failed} of {total} origins failed to route")]
    BatchFailed {
        failed: usize,
        total: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for programming/usage errors that must not be retried
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::DuplicateVertex(_)
                | Error::UidCollision { .. }
                | Error::GridOverflow(_)
                | Error::InvalidCoordinate { .. }
                | Error::DuplicateEdge(_)
                | Error::UnknownVertex(_)
                | Error::UnknownEdge(_)
                | Error::InvalidTurnRestriction { .. }
                | Error::InvalidSnap { .. }
                | Error::InvalidSegment { .. }
                | Error::InvalidRegion { .. }
        )
    }
}

/// Convenience result type for evac-route operations
pub type Result<T> = std::result::Result<T, Error>;
