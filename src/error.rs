// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Which kind of point failed a domain check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointRole {
    /// A transmitter / source point.
    Source,
    /// A receiver point.
    Receiver,
}

impl fmt::Display for PointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointRole::Source => f.write_str("source"),
            PointRole::Receiver => f.write_str("receiver"),
        }
    }
}

/// Errors that can occur during mesh setup, raytracing, or I/O.
#[derive(Debug, thiserror::Error)]
pub enum RaytraceError {
    /// Grid shape is invalid (no cells along an axis).
    #[error("invalid grid shape: axis {axis} has {cells} cells (must be >= 1)")]
    InvalidGridShape {
        /// The axis index.
        axis: usize,
        /// The number of cells provided.
        cells: usize,
    },
    /// Grid spacing is not positive and finite.
    #[error("invalid grid spacing: {0} (must be positive and finite)")]
    InvalidGridSpacing(f64),
    /// Mesh connectivity or geometry is unusable.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
    /// Slowness vector does not have one value per primary node.
    #[error("slowness vector of incompatible size: expected {expected}, got {got}")]
    SlownessSizeMismatch {
        /// Number of primary nodes.
        expected: usize,
        /// Length of the vector supplied.
        got: usize,
    },
    /// Slowness value is not positive and finite.
    #[error("invalid slowness at index {index}: {value} (must be positive and finite)")]
    InvalidSlowness {
        /// The primary node index of the invalid value.
        index: usize,
        /// The invalid value.
        value: f64,
    },
    /// Two containers that must be the same length are not.
    #[error("shape mismatch: {what} expected {expected}, got {got}")]
    ShapeMismatch {
        /// What was being compared.
        what: &'static str,
        /// The expected length.
        expected: usize,
        /// The actual length.
        got: usize,
    },
    /// Array read from a file does not have the expected shape.
    #[error("array shape mismatch: expected {expected:?}, got {got:?}")]
    FieldShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The shape found in the file.
        got: Vec<usize>,
    },
    /// Velocity value is not positive and finite.
    #[error("invalid velocity at index {index}: {value} (must be positive and finite)")]
    InvalidVelocity {
        /// The index of the invalid value.
        index: usize,
        /// The invalid value.
        value: f64,
    },
    /// A raytrace call was made without any source.
    #[error("at least one source is required")]
    NoSources,
    /// Seed time is negative or not finite.
    #[error("invalid seed time for source {index}: {value}")]
    InvalidSeedTime {
        /// The source index.
        index: usize,
        /// The invalid time.
        value: f64,
    },
    /// A source or receiver lies outside the mesh.
    #[error("{role} {index} at {coord:?} is outside the mesh")]
    OutsideDomain {
        /// Whether the point is a source or a receiver.
        role: PointRole,
        /// Index of the point in its list.
        index: usize,
        /// The point coordinates.
        coord: Vec<f64>,
    },
    /// Lane index is out of range.
    #[error("invalid lane {lane}: raytracer has {lanes} lanes")]
    InvalidLane {
        /// The requested lane.
        lane: usize,
        /// The configured number of lanes.
        lanes: usize,
    },
    /// A raytracer needs at least one lane.
    #[error("invalid lane count: {0} (must be >= 1)")]
    InvalidLaneCount(usize),
    /// Another call currently holds the lane.
    #[error("lane {0} is already in use by another raytrace call")]
    LaneBusy(usize),
    /// A batch found every lane held by other calls.
    #[error("no idle lane: every lane is held by another raytrace call")]
    NoIdleLane,
    /// Coincidence tolerance is not positive and finite.
    #[error("invalid tolerance: {0} (must be positive and finite)")]
    InvalidTolerance(f64),
    /// No source reached the receiver, so no ray exists.
    #[error("receiver {index} was not reached by the wavefront")]
    UnreachableReceiver {
        /// The receiver index.
        index: usize,
    },
    /// Walking the parent chain did not reach a source within the node count.
    #[error("parent chain of receiver {receiver} did not terminate within {limit} steps")]
    ParentChainOverrun {
        /// The receiver index.
        receiver: usize,
        /// The step bound (total node count).
        limit: usize,
    },
    /// Unsupported data type in file.
    #[error("unsupported dtype: {0}")]
    UnsupportedDtype(String),
    /// Unsupported file format (unrecognized extension).
    #[error("unsupported file format: {0}")]
    UnsupportedFileFormat(String),
    /// Expected MAT variable not found in file.
    #[error("MAT variable '{expected}' not found; available variables: {available:?}")]
    MatVariableNotFound {
        /// The variable name that was requested.
        expected: String,
        /// The variable names that are available.
        available: Vec<String>,
    },
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Other error with a descriptive message.
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results with RaytraceError.
pub type Result<T> = std::result::Result<T, RaytraceError>;
