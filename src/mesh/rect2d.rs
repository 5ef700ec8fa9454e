// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::core::{Mesh, Point, SlownessInterpolation};
use crate::error::{RaytraceError, Result};
use crate::kernels::bilinear_weights;
use crate::mesh::{NodeGraph, NodeGraphBuilder};

/// A rectilinear 2D mesh in the `(x, z)` plane with slowness defined at the
/// cell corners.
///
/// Primary node `(i, k)` has index `i * (ncz + 1) + k` and cell `(i, k)` has
/// index `i * ncz + k`. Secondary nodes are inserted on every cell edge:
/// `secondary[0]` on edges parallel to x, `secondary[1]` on edges parallel to z.
#[derive(Debug, Clone)]
pub struct RectMesh2D {
    graph: NodeGraph<2>,
    cells: [usize; 2],
    spacing: [f64; 2],
    origin: Point<2>,
    secondary: [usize; 2],
}

impl RectMesh2D {
    /// Create a mesh with `cells` cells along x and z, without secondary nodes.
    ///
    /// # Parameters
    /// - `cells`: Number of cells along each axis (each must be >= 1)
    /// - `spacing`: Cell size along each axis (must be positive and finite)
    /// - `origin`: Coordinates of primary node `(0, 0)`
    /// - `slowness`: One value per primary node, in primary index order
    ///
    /// # Errors
    /// Returns an error if any parameter is invalid or if the slowness vector
    /// length does not equal `(ncx + 1) * (ncz + 1)`.
    pub fn new(
        cells: [usize; 2],
        spacing: [f64; 2],
        origin: Point<2>,
        slowness: &[f64],
    ) -> Result<Self> {
        for (axis, &n) in cells.iter().enumerate() {
            if n == 0 {
                return Err(RaytraceError::InvalidGridShape { axis, cells: n });
            }
        }
        for &h in &spacing {
            if !h.is_finite() || h <= 0.0 {
                return Err(RaytraceError::InvalidGridSpacing(h));
            }
        }
        let graph = build_graph(
            cells,
            spacing,
            origin,
            [0, 0],
            slowness,
            SlownessInterpolation::Slowness,
        )?;
        Ok(RectMesh2D {
            graph,
            cells,
            spacing,
            origin,
            secondary: [0, 0],
        })
    }

    /// Insert `secondary[0]` nodes on edges parallel to x and `secondary[1]`
    /// on edges parallel to z (builder method). The primary slowness is kept.
    ///
    /// # Errors
    /// Propagates slowness validation errors from rebuilding the node graph.
    pub fn with_secondary(mut self, secondary: [usize; 2]) -> Result<Self> {
        let slowness = self.primary_slowness();
        self.graph = build_graph(
            self.cells,
            self.spacing,
            self.origin,
            secondary,
            &slowness,
            self.graph.interpolation(),
        )?;
        self.secondary = secondary;
        Ok(self)
    }

    /// Choose the interpolation space for secondary nodes and off-node points
    /// (builder method).
    pub fn with_interpolation(mut self, interpolation: SlownessInterpolation) -> Self {
        self.graph.set_interpolation(interpolation);
        self
    }

    /// Number of cells along x and z.
    pub fn cells(&self) -> [usize; 2] {
        self.cells
    }

    /// Cell size along x and z.
    pub fn spacing(&self) -> [f64; 2] {
        self.spacing
    }

    /// Coordinates of the first primary node.
    pub fn origin(&self) -> Point<2> {
        self.origin
    }

    /// Secondary nodes per edge along x and z.
    pub fn secondary(&self) -> [usize; 2] {
        self.secondary
    }

    /// Coordinates of the last primary node.
    pub fn max_corner(&self) -> Point<2> {
        [
            self.origin[0] + self.cells[0] as f64 * self.spacing[0],
            self.origin[1] + self.cells[1] as f64 * self.spacing[1],
        ]
    }

    /// Index of primary node `(i, k)`.
    pub fn primary_index(&self, i: usize, k: usize) -> usize {
        i * (self.cells[1] + 1) + k
    }

    /// Index of cell `(i, k)`.
    pub fn cell_index(&self, i: usize, k: usize) -> usize {
        i * self.cells[1] + k
    }

    fn primary_slowness(&self) -> Vec<f64> {
        self.graph.nodes()[..self.graph.num_primary()]
            .iter()
            .map(|n| n.slowness)
            .collect()
    }
}

fn build_graph(
    cells: [usize; 2],
    spacing: [f64; 2],
    origin: Point<2>,
    secondary: [usize; 2],
    slowness: &[f64],
    interpolation: SlownessInterpolation,
) -> Result<NodeGraph<2>> {
    let [ncx, ncz] = cells;
    let mut primary = Vec::with_capacity((ncx + 1) * (ncz + 1));
    for i in 0..=ncx {
        for k in 0..=ncz {
            primary.push([
                origin[0] + i as f64 * spacing[0],
                origin[1] + k as f64 * spacing[1],
            ]);
        }
    }
    if slowness.len() != primary.len() {
        return Err(RaytraceError::SlownessSizeMismatch {
            expected: primary.len(),
            got: slowness.len(),
        });
    }

    let node = |i: usize, k: usize| i * (ncz + 1) + k;
    let mut builder = NodeGraphBuilder::new(primary, ncx * ncz);
    for i in 0..ncx {
        for k in 0..ncz {
            let cell = i * ncz + k;
            let (p00, p10, p01, p11) = (node(i, k), node(i + 1, k), node(i, k + 1), node(i + 1, k + 1));
            for p in [p00, p10, p01, p11] {
                builder.add_corner(cell, p);
            }
            builder.add_edge(cell, p00, p10, secondary[0]);
            builder.add_edge(cell, p01, p11, secondary[0]);
            builder.add_edge(cell, p00, p01, secondary[1]);
            builder.add_edge(cell, p10, p11, secondary[1]);
        }
    }
    builder.finish(slowness, interpolation)
}

impl Mesh<2> for RectMesh2D {
    fn graph(&self) -> &NodeGraph<2> {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut NodeGraph<2> {
        &mut self.graph
    }

    fn locate(&self, p: &Point<2>) -> Option<usize> {
        let mut idx = [0usize; 2];
        for d in 0..2 {
            let tol = 1e-9 * self.spacing[d];
            let max = self.origin[d] + self.cells[d] as f64 * self.spacing[d];
            if !(p[d] >= self.origin[d] - tol && p[d] <= max + tol) {
                return None;
            }
            let f = ((p[d] - self.origin[d]) / self.spacing[d]).floor();
            idx[d] = (f.max(0.0) as usize).min(self.cells[d] - 1);
        }
        Some(self.cell_index(idx[0], idx[1]))
    }

    fn corner_weights(&self, cell: usize, p: &Point<2>) -> Vec<(usize, f64)> {
        let i = cell / self.cells[1];
        let k = cell % self.cells[1];
        let lo = [
            self.origin[0] + i as f64 * self.spacing[0],
            self.origin[1] + k as f64 * self.spacing[1],
        ];
        let w = bilinear_weights(p, &lo, &self.spacing);
        let corners = [
            self.primary_index(i, k),
            self.primary_index(i + 1, k),
            self.primary_index(i, k + 1),
            self.primary_index(i + 1, k + 1),
        ];
        corners.into_iter().zip(w).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(cells: [usize; 2], s: f64) -> RectMesh2D {
        let n = (cells[0] + 1) * (cells[1] + 1);
        RectMesh2D::new(cells, [1.0, 1.0], [0.0, 0.0], &vec![s; n]).unwrap()
    }

    #[test]
    fn node_and_cell_counts() {
        let mesh = uniform([4, 3], 1.0).with_secondary([2, 1]).unwrap();
        let g = mesh.graph();
        assert_eq!(g.num_primary(), 5 * 4);
        // x-parallel edges: 4 * 4, z-parallel edges: 3 * 5
        assert_eq!(g.num_secondary(), 4 * 4 * 2 + 3 * 5);
        assert_eq!(g.num_cells(), 12);
        for cell in 0..12 {
            assert_eq!(mesh.nodes_of(cell).len(), 4 + 2 * 2 + 2 * 1);
        }
    }

    #[test]
    fn primary_coordinates_and_owners() {
        let mesh = RectMesh2D::new([2, 2], [2.0, 0.5], [10.0, -1.0], &[1.0; 9]).unwrap();
        let n = mesh.primary_index(1, 2);
        assert_eq!(mesh.nodes()[n].coords, [12.0, 0.0]);
        // interior node touches 4 cells, corner node 1
        assert_eq!(mesh.cells_of(mesh.primary_index(1, 1)).len(), 4);
        assert_eq!(mesh.cells_of(mesh.primary_index(0, 0)), &[0]);
        assert_eq!(mesh.max_corner(), [14.0, 0.0]);
    }

    #[test]
    fn locate_inside_on_boundary_and_outside() {
        let mesh = uniform([3, 2], 1.0);
        assert_eq!(mesh.locate(&[0.5, 0.5]), Some(0));
        assert_eq!(mesh.locate(&[1.5, 0.5]), Some(mesh.cell_index(1, 0)));
        assert_eq!(mesh.locate(&[3.0, 2.0]), Some(mesh.cell_index(2, 1)));
        assert_eq!(mesh.locate(&[0.0, 0.0]), Some(0));
        assert_eq!(mesh.locate(&[3.1, 1.0]), None);
        assert_eq!(mesh.locate(&[1.0, -0.01]), None);
        assert!(mesh.contains(&[2.999, 1.999]));
    }

    #[test]
    fn find_node_matches_primary_and_secondary() {
        let mesh = uniform([2, 2], 1.0).with_secondary([1, 1]).unwrap();
        let n = mesh.find_node(&[1.0, 1.0], 1e-6).unwrap();
        assert_eq!(n, mesh.primary_index(1, 1));
        let n = mesh.find_node(&[0.5, 1.0], 1e-6).unwrap();
        assert!(!mesh.nodes()[n].primary);
        assert!(mesh.find_node(&[0.4, 0.4], 1e-6).is_none());
    }

    #[test]
    fn bilinear_interpolation_reproduces_linear_field() {
        // s = 1 + 0.1 x + 0.2 z
        let cells = [3, 3];
        let mut s = Vec::new();
        for i in 0..=3 {
            for k in 0..=3 {
                s.push(1.0 + 0.1 * i as f64 + 0.2 * k as f64);
            }
        }
        let mesh = RectMesh2D::new(cells, [1.0, 1.0], [0.0, 0.0], &s).unwrap();
        let p = [1.3, 2.6];
        let cell = mesh.locate(&p).unwrap();
        let v = mesh.interpolate_slowness(cell, &p);
        assert!((v - (1.0 + 0.13 + 0.52)).abs() < 1e-12);
    }

    #[test]
    fn with_secondary_keeps_slowness() {
        let mut s = vec![1.0; 9];
        s[4] = 3.0;
        let mesh = RectMesh2D::new([2, 2], [1.0, 1.0], [0.0, 0.0], &s)
            .unwrap()
            .with_secondary([1, 1])
            .unwrap();
        assert_eq!(mesh.nodes()[4].slowness, 3.0);
        let mid = mesh.find_node(&[1.0, 0.5], 1e-6).unwrap();
        assert!((mesh.nodes()[mid].slowness - 2.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_construction() {
        assert!(matches!(
            RectMesh2D::new([0, 2], [1.0, 1.0], [0.0, 0.0], &[1.0; 3]),
            Err(RaytraceError::InvalidGridShape { axis: 0, .. })
        ));
        assert!(matches!(
            RectMesh2D::new([2, 2], [1.0, -1.0], [0.0, 0.0], &[1.0; 9]),
            Err(RaytraceError::InvalidGridSpacing(_))
        ));
        assert!(matches!(
            RectMesh2D::new([2, 2], [1.0, 1.0], [0.0, 0.0], &[1.0; 8]),
            Err(RaytraceError::SlownessSizeMismatch { expected: 9, got: 8 })
        ));
    }
}
