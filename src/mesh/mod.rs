// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Augmented meshes: primary nodes, synthesized secondary nodes and the static
//! cell-to-node adjacency shared by every lane.

use std::collections::HashMap;
use std::ops::Range;

use crate::core::{Node, Point, SlownessInterpolation};
use crate::error::{RaytraceError, Result};
use crate::kernels;

/// Rectilinear 2D mesh.
pub mod rect2d;
/// Unstructured tetrahedral 3D mesh.
pub mod tet3d;

pub use rect2d::RectMesh2D;
pub use tet3d::TetMesh;

/// How a secondary node's slowness is derived from primary nodes.
///
/// Edge nodes use two supports (the third weight is zero), face nodes use the
/// three face corners.
#[derive(Debug, Clone, Copy)]
struct Recipe {
    support: [usize; 3],
    weights: [f64; 3],
}

/// Nodes of an augmented mesh together with the cell adjacency.
///
/// Primary nodes occupy indices `0..num_primary()`, in the order of the mesh
/// vertices; secondary nodes follow.
#[derive(Debug, Clone)]
pub struct NodeGraph<const N: usize> {
    nodes: Vec<Node<N>>,
    n_primary: usize,
    cell_nodes: Vec<Vec<usize>>,
    recipes: Vec<Recipe>,
    interpolation: SlownessInterpolation,
}

impl<const N: usize> NodeGraph<N> {
    /// All nodes, primary first.
    pub fn nodes(&self) -> &[Node<N>] {
        &self.nodes
    }

    /// Total number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of primary nodes.
    pub fn num_primary(&self) -> usize {
        self.n_primary
    }

    /// Number of secondary nodes.
    pub fn num_secondary(&self) -> usize {
        self.nodes.len() - self.n_primary
    }

    /// Number of cells.
    pub fn num_cells(&self) -> usize {
        self.cell_nodes.len()
    }

    /// Nodes (primary and secondary) on the boundary of `cell`.
    pub fn cell_nodes(&self, cell: usize) -> &[usize] {
        &self.cell_nodes[cell]
    }

    /// Interpolation space used for secondary nodes and corner interpolation.
    pub fn interpolation(&self) -> SlownessInterpolation {
        self.interpolation
    }

    /// Replace primary slowness and recompute every secondary node.
    ///
    /// # Errors
    /// Returns an error if the length differs from the primary node count or
    /// any value is not positive and finite.
    pub fn set_primary_slowness(&mut self, slowness: &[f64]) -> Result<()> {
        if slowness.len() != self.n_primary {
            return Err(RaytraceError::SlownessSizeMismatch {
                expected: self.n_primary,
                got: slowness.len(),
            });
        }
        for (index, &value) in slowness.iter().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(RaytraceError::InvalidSlowness { index, value });
            }
        }
        for (node, &s) in self.nodes.iter_mut().zip(slowness) {
            node.slowness = s;
        }
        self.interpolate_secondary();
        Ok(())
    }

    /// Switch the interpolation space and recompute every secondary node.
    pub fn set_interpolation(&mut self, interpolation: SlownessInterpolation) {
        self.interpolation = interpolation;
        self.interpolate_secondary();
    }

    /// Slowness blended from `(node, weight)` pairs in the configured space.
    pub fn blend_at(&self, weights: &[(usize, f64)]) -> f64 {
        kernels::blend(
            weights.iter().map(|&(n, w)| (self.nodes[n].slowness, w)),
            self.interpolation,
        )
    }

    fn interpolate_secondary(&mut self) {
        let mode = self.interpolation;
        let (primary, secondary) = self.nodes.split_at_mut(self.n_primary);
        for (node, recipe) in secondary.iter_mut().zip(&self.recipes) {
            let samples = recipe
                .support
                .iter()
                .zip(recipe.weights.iter())
                .map(|(&n, &w)| (primary[n].slowness, w));
            node.slowness = kernels::blend(samples, mode);
        }
    }
}

/// Incremental construction of a [`NodeGraph`].
///
/// Meshes register, cell by cell, their corners, edges and faces. Edges and
/// faces are keyed by their sorted primary node indices, so an edge or face
/// shared by several cells creates its secondary nodes once and every cell is
/// registered as an owner.
pub(crate) struct NodeGraphBuilder<const N: usize> {
    nodes: Vec<Node<N>>,
    n_primary: usize,
    cell_nodes: Vec<Vec<usize>>,
    recipes: Vec<Recipe>,
    edges: HashMap<[usize; 2], Range<usize>>,
    faces: HashMap<[usize; 3], Range<usize>>,
}

impl<const N: usize> NodeGraphBuilder<N> {
    pub(crate) fn new(primary: Vec<Point<N>>, num_cells: usize) -> Self {
        let nodes: Vec<Node<N>> = primary
            .into_iter()
            .map(|p| Node::new(p, 0.0, true))
            .collect();
        NodeGraphBuilder {
            n_primary: nodes.len(),
            nodes,
            cell_nodes: vec![Vec::new(); num_cells],
            recipes: Vec::new(),
            edges: HashMap::new(),
            faces: HashMap::new(),
        }
    }

    fn attach(&mut self, cell: usize, node: usize) {
        self.nodes[node].owners.push(cell);
        self.cell_nodes[cell].push(node);
    }

    fn push_secondary(&mut self, coords: Point<N>, recipe: Recipe) -> usize {
        self.nodes.push(Node::new(coords, 0.0, false));
        self.recipes.push(recipe);
        self.nodes.len() - 1
    }

    /// Register primary node `node` as a corner of `cell`.
    pub(crate) fn add_corner(&mut self, cell: usize, node: usize) {
        self.attach(cell, node);
    }

    /// Register the edge `a-b` of `cell`, inserting `count` equally spaced
    /// secondary nodes on first sight.
    pub(crate) fn add_edge(&mut self, cell: usize, a: usize, b: usize, count: usize) {
        if count == 0 {
            return;
        }
        let key = if a < b { [a, b] } else { [b, a] };
        let ids = match self.edges.get(&key) {
            Some(range) => range.clone(),
            None => {
                let [lo, hi] = key;
                let p_lo = self.nodes[lo].coords;
                let p_hi = self.nodes[hi].coords;
                let start = self.nodes.len();
                for k in 1..=count {
                    let t = k as f64 / (count + 1) as f64;
                    let mut p = p_lo;
                    for d in 0..N {
                        p[d] += t * (p_hi[d] - p_lo[d]);
                    }
                    self.push_secondary(
                        p,
                        Recipe {
                            support: [lo, hi, lo],
                            weights: [1.0 - t, t, 0.0],
                        },
                    );
                }
                let range = start..self.nodes.len();
                self.edges.insert(key, range.clone());
                range
            }
        };
        for id in ids {
            self.attach(cell, id);
        }
    }

    /// Register the triangular face `a-b-c` of `cell`, inserting the interior
    /// points of a triangular lattice with `count + 1` segments per side on
    /// first sight. That is `count * (count - 1) / 2` nodes.
    pub(crate) fn add_face(&mut self, cell: usize, a: usize, b: usize, c: usize, count: usize) {
        if count < 2 {
            return;
        }
        let mut key = [a, b, c];
        key.sort_unstable();
        let ids = match self.faces.get(&key) {
            Some(range) => range.clone(),
            None => {
                let corners = key.map(|n| self.nodes[n].coords);
                let m = (count + 1) as f64;
                let start = self.nodes.len();
                for i in 1..count {
                    for j in 1..(count + 1 - i) {
                        let wb = i as f64 / m;
                        let wc = j as f64 / m;
                        let wa = 1.0 - wb - wc;
                        let mut p = [0.0; N];
                        for d in 0..N {
                            p[d] = wa * corners[0][d] + wb * corners[1][d] + wc * corners[2][d];
                        }
                        self.push_secondary(
                            p,
                            Recipe {
                                support: key,
                                weights: [wa, wb, wc],
                            },
                        );
                    }
                }
                let range = start..self.nodes.len();
                self.faces.insert(key, range.clone());
                range
            }
        };
        for id in ids {
            self.attach(cell, id);
        }
    }

    /// Finish construction and assign the initial slowness field.
    ///
    /// # Errors
    /// Returns an error if the slowness field is invalid.
    pub(crate) fn finish(
        self,
        slowness: &[f64],
        interpolation: SlownessInterpolation,
    ) -> Result<NodeGraph<N>> {
        let mut graph = NodeGraph {
            nodes: self.nodes,
            n_primary: self.n_primary,
            cell_nodes: self.cell_nodes,
            recipes: self.recipes,
            interpolation,
        };
        graph.set_primary_slowness(slowness)?;
        log::debug!(
            "node graph: {} primary + {} secondary nodes, {} cells",
            graph.num_primary(),
            graph.num_secondary(),
            graph.num_cells()
        );
        Ok(graph)
    }
}
