// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::Result;
use crate::kernels;
use crate::mesh::NodeGraph;

/// A point in N-dimensional space. 2D points are `[x, z]`, 3D points `[x, y, z]`.
pub type Point<const N: usize> = [f64; N];

/// Travel time of a node the wavefront has not reached.
///
/// This is a finite sentinel, so relaxation tests must use strict `<`.
pub const UNREACHED: f64 = f64::MAX;

/// Parent index of a node that has no parent (a source, or an unreached node).
pub const NO_PARENT: usize = usize::MAX;

/// Space in which slowness is interpolated between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlownessInterpolation {
    /// Interpolate slowness values linearly.
    #[default]
    Slowness,
    /// Interpolate velocities (inverse slowness) linearly and invert back.
    Velocity,
}

/// A node of the propagation graph.
///
/// The node's position in the mesh node array is its graph vertex id. Primary
/// nodes sit on mesh vertices; secondary nodes are inserted on edges and faces.
#[derive(Debug, Clone)]
pub struct Node<const N: usize> {
    /// Node coordinates.
    pub coords: Point<N>,
    /// Cells whose boundary contains this node.
    pub owners: Vec<usize>,
    /// Slowness at the node.
    pub slowness: f64,
    /// True for mesh vertices, false for inserted nodes.
    pub primary: bool,
}

impl<const N: usize> Node<N> {
    /// Create a node with no owners yet.
    pub fn new(coords: Point<N>, slowness: f64, primary: bool) -> Self {
        Node {
            coords,
            owners: Vec::new(),
            slowness,
            primary,
        }
    }

    /// Whether `p` coincides with this node within `tol` on every axis.
    #[inline]
    pub fn coincides(&self, p: &Point<N>, tol: f64) -> bool {
        self.coords
            .iter()
            .zip(p.iter())
            .all(|(a, b)| (a - b).abs() < tol)
    }
}

/// Mesh capability consumed by the propagation engine and the ray
/// reconstructor.
///
/// Dimensionality and mesh kind (structured or unstructured) live entirely in
/// the implementation; the engine only sees nodes, cells, the stencil and the
/// corner interpolation.
pub trait Mesh<const N: usize>: Send + Sync {
    /// The node graph: nodes, adjacency and secondary-node recipes.
    fn graph(&self) -> &NodeGraph<N>;

    /// Mutable access to the node graph, used for slowness updates.
    fn graph_mut(&mut self) -> &mut NodeGraph<N>;

    /// Index of a cell containing `p` (its closure), if any.
    fn locate(&self, p: &Point<N>) -> Option<usize>;

    /// Interpolation weights of `p` over the primary corners of `cell`, as
    /// `(node index, weight)` pairs.
    fn corner_weights(&self, cell: usize, p: &Point<N>) -> Vec<(usize, f64)>;

    /// Whether `p` lies inside the mesh.
    fn contains(&self, p: &Point<N>) -> bool {
        self.locate(p).is_some()
    }

    /// Slowness at an arbitrary point of `cell`, interpolated from its corners.
    fn interpolate_slowness(&self, cell: usize, p: &Point<N>) -> f64 {
        self.graph().blend_at(&self.corner_weights(cell, p))
    }

    /// Local stencil: travel time increment between `a` and `b`.
    fn local_dt(&self, a: &Point<N>, s_a: f64, b: &Point<N>, s_b: f64) -> f64 {
        kernels::mean_slowness_dt(a, s_a, b, s_b)
    }

    /// All nodes of the augmented mesh.
    fn nodes(&self) -> &[Node<N>] {
        self.graph().nodes()
    }

    /// Cells owning `node`.
    fn cells_of(&self, node: usize) -> &[usize] {
        &self.graph().nodes()[node].owners
    }

    /// Nodes on the boundary of `cell`.
    fn nodes_of(&self, cell: usize) -> &[usize] {
        self.graph().cell_nodes(cell)
    }

    /// Number of cells.
    fn num_cells(&self) -> usize {
        self.graph().num_cells()
    }

    /// Number of primary nodes (the length of a slowness vector).
    fn num_primary(&self) -> usize {
        self.graph().num_primary()
    }

    /// Replace the primary slowness field and re-interpolate secondary nodes.
    ///
    /// # Errors
    /// Returns an error if `slowness` does not have one value per primary
    /// node or contains a non-positive or non-finite value.
    fn set_slowness(&mut self, slowness: &[f64]) -> Result<()> {
        self.graph_mut().set_primary_slowness(slowness)
    }

    /// Index of a node coinciding with `p` within `tol`, if any.
    fn find_node(&self, p: &Point<N>, tol: f64) -> Option<usize> {
        let cell = self.locate(p)?;
        self.node_in_cell(cell, p, tol)
    }

    /// Node of `cell` coinciding with `p` within `tol` on every axis, for a
    /// point already located in `cell`.
    fn node_in_cell(&self, cell: usize, p: &Point<N>, tol: f64) -> Option<usize> {
        let nodes = self.nodes();
        self.nodes_of(cell)
            .iter()
            .copied()
            .find(|&n| nodes[n].coincides(p, tol))
    }
}
