// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! A parallel shortest-path-method (SPM) traveltime and raypath solver.
//!
//! The slowness field is defined at the vertices of a mesh. Secondary nodes
//! are inserted on cell edges (and faces in 3D), and a Dijkstra-like front
//! propagation over the resulting graph yields first-arrival travel times.
//! Raypaths and per-cell path lengths are reconstructed from the parent
//! links recorded during propagation.
//!
//! A [`Raytracer`] owns one mesh and several independent lanes, so that
//! distinct source gathers can be traced concurrently.

#![warn(missing_docs)]

/// Core node types and the mesh trait.
pub mod core;
mod engine;
/// Error types for the library.
pub mod error;
/// File I/O for slowness fields, points and results.
pub mod io;
/// Geometric kernels: distances, stencil and interpolation weights.
pub mod kernels;
/// Augmented mesh implementations.
pub mod mesh;
mod raypath;
/// Multi-lane raytracer.
pub mod solver;

pub use crate::core::{Mesh, Node, Point, SlownessInterpolation, NO_PARENT, UNREACHED};
pub use crate::error::{PointRole, RaytraceError, Result};
pub use crate::mesh::{NodeGraph, RectMesh2D, TetMesh};
pub use crate::raypath::CellLength;
pub use crate::solver::{RayRequest, Rays, Raytracer, Shot, DEFAULT_TOLERANCE};
