//! Calibration Map Engine
//!
//! A device-backed 2D lookup table: load axes and cells through the protocol
//! client, interpolate against live axis values, and apply bounded
//! incremental edits that are written back cell by cell.

mod layout;
mod table;

pub use layout::{LinearMapLayout, MapLayout, MapSpec};
pub use table::{EditAlgorithm, Interpolation, MapState, MapTable, Selection};

use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors raised by the map engine
#[derive(Error, Debug)]
pub enum MapError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("map '{name}': device returned {actual} values, expected {expected}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("map '{name}': unsupported codec width {width} (must be 1..=4)")]
    InvalidCodec { name: String, width: usize },

    #[error("map is not loaded")]
    NotLoaded,

    #[error("map is closed")]
    Closed,

    #[error("invalid map spec: {0}")]
    Spec(#[from] serde_json::Error),
}
