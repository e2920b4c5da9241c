//! Common types for the evac-route toolkit

pub mod error;
pub mod point;

pub use error::{Error, Result};
pub use point::{Point, Uid, UidGrid, MAX_COORDINATE, POINT_RESOLUTION};
