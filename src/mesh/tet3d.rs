// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::core::{Mesh, Point, SlownessInterpolation};
use crate::error::{RaytraceError, Result};
use crate::kernels::{tet_barycentric, tet_volume6};
use crate::mesh::{NodeGraph, NodeGraphBuilder};

/// Local node pairs of the six edges of a tetrahedron.
const TET_EDGES: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];

/// Local node triples of the four faces of a tetrahedron.
const TET_FACES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];

/// Barycentric slack allowed when testing whether a point is inside a cell.
const INSIDE_TOL: f64 = 1e-9;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy)]
struct Aabb {
    lo: Point<3>,
    hi: Point<3>,
}

impl Aabb {
    fn of<'a>(points: impl IntoIterator<Item = &'a Point<3>>) -> Self {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for p in points {
            for d in 0..3 {
                lo[d] = lo[d].min(p[d]);
                hi[d] = hi[d].max(p[d]);
            }
        }
        Aabb { lo, hi }
    }

    fn contains(&self, p: &Point<3>, tol: f64) -> bool {
        (0..3).all(|d| p[d] >= self.lo[d] - tol && p[d] <= self.hi[d] + tol)
    }
}

/// An unstructured 3D mesh of tetrahedra with slowness defined at the
/// vertices.
///
/// With a secondary density `ns`, every edge carries `ns` evenly spaced nodes
/// and every face `ns * (ns - 1) / 2` nodes on a triangular lattice.
#[derive(Debug, Clone)]
pub struct TetMesh {
    graph: NodeGraph<3>,
    tets: Vec<[usize; 4]>,
    cell_boxes: Vec<Aabb>,
    bounds: Aabb,
    tol: f64,
    secondary: usize,
}

impl TetMesh {
    /// Create a mesh from vertex coordinates and tetrahedron connectivity,
    /// without secondary nodes.
    ///
    /// # Errors
    /// Returns an error if the mesh is empty, a tetrahedron references a
    /// missing vertex or is degenerate, or the slowness vector is invalid.
    pub fn new(points: Vec<Point<3>>, tets: Vec<[usize; 4]>, slowness: &[f64]) -> Result<Self> {
        if points.is_empty() || tets.is_empty() {
            return Err(RaytraceError::InvalidMesh(
                "mesh needs at least one vertex and one tetrahedron".to_string(),
            ));
        }
        if slowness.len() != points.len() {
            return Err(RaytraceError::SlownessSizeMismatch {
                expected: points.len(),
                got: slowness.len(),
            });
        }
        for (cell, tet) in tets.iter().enumerate() {
            if let Some(&bad) = tet.iter().find(|&&n| n >= points.len()) {
                return Err(RaytraceError::InvalidMesh(format!(
                    "tetrahedron {} references vertex {} but the mesh has {} vertices",
                    cell,
                    bad,
                    points.len()
                )));
            }
            let corners = tet.map(|n| points[n]);
            if tet_barycentric(&corners[0], &corners).is_none() {
                return Err(RaytraceError::InvalidMesh(format!(
                    "tetrahedron {} is degenerate",
                    cell
                )));
            }
        }

        let bounds = Aabb::of(&points);
        let extent = (0..3)
            .map(|d| bounds.hi[d] - bounds.lo[d])
            .fold(0.0, f64::max);
        let cell_boxes = tets
            .iter()
            .map(|tet| Aabb::of(tet.iter().map(|&n| &points[n])))
            .collect();
        let graph = build_graph(
            points,
            &tets,
            0,
            slowness,
            SlownessInterpolation::Slowness,
        )?;
        Ok(TetMesh {
            graph,
            tets,
            cell_boxes,
            bounds,
            tol: INSIDE_TOL * extent.max(1.0),
            secondary: 0,
        })
    }

    /// Build a box of `cells[0] x cells[1] x cells[2]` hexahedra, each split
    /// into six tetrahedra sharing the hexahedron's main diagonal.
    ///
    /// Vertex `(i, j, k)` has index `(i * (ny + 1) + j) * (nz + 1) + k`, which
    /// is also the order of `slowness`.
    ///
    /// # Errors
    /// Returns an error for an empty shape, a bad spacing, or an invalid
    /// slowness vector.
    pub fn from_box(
        cells: [usize; 3],
        spacing: [f64; 3],
        origin: Point<3>,
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
        let [nx, ny, nz] = cells;
        let index = |i: usize, j: usize, k: usize| (i * (ny + 1) + j) * (nz + 1) + k;

        let mut points = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
        for i in 0..=nx {
            for j in 0..=ny {
                for k in 0..=nz {
                    points.push([
                        origin[0] + i as f64 * spacing[0],
                        origin[1] + j as f64 * spacing[1],
                        origin[2] + k as f64 * spacing[2],
                    ]);
                }
            }
        }

        const AXIS_ORDERS: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        let mut tets = Vec::with_capacity(6 * nx * ny * nz);
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    for order in AXIS_ORDERS {
                        let mut step = [0usize; 3];
                        let mut tet = [index(i, j, k); 4];
                        for (v, &axis) in order.iter().enumerate() {
                            step[axis] = 1;
                            tet[v + 1] = index(i + step[0], j + step[1], k + step[2]);
                        }
                        tets.push(tet);
                    }
                }
            }
        }
        TetMesh::new(points, tets, slowness)
    }

    /// Insert `secondary` nodes on every edge and the matching face lattice
    /// (builder method). The primary slowness is kept.
    ///
    /// # Errors
    /// Propagates slowness validation errors from rebuilding the node graph.
    pub fn with_secondary(mut self, secondary: usize) -> Result<Self> {
        let primary = &self.graph.nodes()[..self.graph.num_primary()];
        let points = primary.iter().map(|n| n.coords).collect();
        let slowness: Vec<f64> = primary.iter().map(|n| n.slowness).collect();
        self.graph = build_graph(
            points,
            &self.tets,
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

    /// Tetrahedron connectivity.
    pub fn tetrahedra(&self) -> &[[usize; 4]] {
        &self.tets
    }

    /// Secondary nodes per edge.
    pub fn secondary(&self) -> usize {
        self.secondary
    }

    /// Lower and upper corners of the mesh bounding box.
    pub fn bounds(&self) -> (Point<3>, Point<3>) {
        (self.bounds.lo, self.bounds.hi)
    }

    fn corners(&self, cell: usize) -> [Point<3>; 4] {
        let nodes = self.graph.nodes();
        self.tets[cell].map(|n| nodes[n].coords)
    }

    /// Volume of tetrahedron `cell`.
    pub fn volume(&self, cell: usize) -> f64 {
        let [a, b, c, d] = self.corners(cell);
        tet_volume6(&a, &b, &c, &d).abs() / 6.0
    }
}

fn build_graph(
    points: Vec<Point<3>>,
    tets: &[[usize; 4]],
    secondary: usize,
    slowness: &[f64],
    interpolation: SlownessInterpolation,
) -> Result<NodeGraph<3>> {
    let mut builder = NodeGraphBuilder::new(points, tets.len());
    for (cell, tet) in tets.iter().enumerate() {
        for &n in tet {
            builder.add_corner(cell, n);
        }
        for [a, b] in TET_EDGES {
            builder.add_edge(cell, tet[a], tet[b], secondary);
        }
        for [a, b, c] in TET_FACES {
            builder.add_face(cell, tet[a], tet[b], tet[c], secondary);
        }
    }
    builder.finish(slowness, interpolation)
}

impl Mesh<3> for TetMesh {
    fn graph(&self) -> &NodeGraph<3> {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut NodeGraph<3> {
        &mut self.graph
    }

    fn locate(&self, p: &Point<3>) -> Option<usize> {
        if !self.bounds.contains(p, self.tol) {
            return None;
        }
        (0..self.tets.len()).find(|&cell| {
            self.cell_boxes[cell].contains(p, self.tol)
                && tet_barycentric(p, &self.corners(cell))
                    .is_some_and(|w| w.iter().all(|&wi| wi >= -INSIDE_TOL))
        })
    }

    fn corner_weights(&self, cell: usize, p: &Point<3>) -> Vec<(usize, f64)> {
        let tet = self.tets[cell];
        match tet_barycentric(p, &self.corners(cell)) {
            Some(w) => tet.into_iter().zip(w).collect(),
            None => tet.into_iter().map(|n| (n, 0.25)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tet() -> TetMesh {
        TetMesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            vec![[0, 1, 2, 3]],
            &[1.0; 4],
        )
        .unwrap()
    }

    #[test]
    fn box_subdivision_fills_the_volume() {
        let cells = [2, 3, 1];
        let mesh = TetMesh::from_box(cells, [1.0, 0.5, 2.0], [0.0, 0.0, 0.0], &[1.0; 3 * 4 * 2]).unwrap();
        assert_eq!(mesh.tetrahedra().len(), 6 * 6);
        let total: f64 = (0..mesh.num_cells()).map(|c| mesh.volume(c)).sum();
        assert!((total - 2.0 * 1.5 * 2.0).abs() < 1e-12);
        let (lo, hi) = mesh.bounds();
        assert_eq!(lo, [0.0, 0.0, 0.0]);
        assert_eq!(hi, [2.0, 1.5, 2.0]);
    }

    #[test]
    fn locate_finds_the_cell_of_each_centroid() {
        let mesh = TetMesh::from_box([2, 2, 2], [1.0; 3], [0.0; 3], &[1.0; 27]).unwrap();
        for cell in 0..mesh.num_cells() {
            let corners = mesh.corners(cell);
            let mut c = [0.0; 3];
            for p in &corners {
                for d in 0..3 {
                    c[d] += 0.25 * p[d];
                }
            }
            assert_eq!(mesh.locate(&c), Some(cell));
        }
        assert!(mesh.contains(&[2.0, 2.0, 2.0]));
        assert!(mesh.contains(&[0.0, 1.0, 0.5]));
        assert!(!mesh.contains(&[2.1, 1.0, 1.0]));
    }

    #[test]
    fn single_tet_secondary_counts() {
        let mesh = unit_tet().with_secondary(2).unwrap();
        // 6 edges * 2 + 4 faces * 1
        assert_eq!(mesh.graph().num_secondary(), 16);
        assert_eq!(mesh.nodes_of(0).len(), 20);
        assert_eq!(mesh.secondary(), 2);
    }

    #[test]
    fn cube_secondary_nodes_are_shared() {
        let mesh = TetMesh::from_box([1, 1, 1], [1.0; 3], [0.0; 3], &[1.0; 8])
            .unwrap()
            .with_secondary(2)
            .unwrap();
        // 19 distinct edges (12 cube edges, 6 face diagonals, 1 main diagonal)
        // and 18 distinct triangles (12 on the boundary, 6 interior)
        assert_eq!(mesh.graph().num_secondary(), 19 * 2 + 18);
        for cell in 0..6 {
            assert_eq!(mesh.nodes_of(cell).len(), 4 + 6 * 2 + 4);
        }
    }

    #[test]
    fn linear_field_is_reproduced() {
        let cells = [2, 2, 2];
        let mut s = Vec::new();
        for i in 0..=2 {
            for j in 0..=2 {
                for k in 0..=2 {
                    s.push(1.0 + 0.1 * i as f64 + 0.05 * j as f64 + 0.2 * k as f64);
                }
            }
        }
        let mesh = TetMesh::from_box(cells, [1.0; 3], [0.0; 3], &s)
            .unwrap()
            .with_secondary(3)
            .unwrap();
        let field = |p: &Point<3>| 1.0 + 0.1 * p[0] + 0.05 * p[1] + 0.2 * p[2];
        for node in mesh.nodes() {
            assert!((node.slowness - field(&node.coords)).abs() < 1e-12);
        }
        let p = [0.3, 1.7, 1.1];
        let cell = mesh.locate(&p).unwrap();
        assert!((mesh.interpolate_slowness(cell, &p) - field(&p)).abs() < 1e-12);
    }

    #[test]
    fn velocity_interpolation_on_edges() {
        let mesh = TetMesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            vec![[0, 1, 2, 3]],
            &[1.0, 0.25, 1.0, 1.0],
        )
        .unwrap()
        .with_secondary(1)
        .unwrap()
        .with_interpolation(SlownessInterpolation::Velocity);
        let mid = mesh.find_node(&[0.5, 0.0, 0.0], 1e-6).unwrap();
        // velocities 1 and 4 average to 2.5
        assert!((mesh.nodes()[mid].slowness - 0.4).abs() < 1e-12);
    }

    #[test]
    fn velocity_interpolation_on_face_lattice() {
        let velocity = |p: &Point<3>| 1.0 + p[0] + 2.0 * p[1] + 3.0 * p[2];
        let corners = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let slowness: Vec<f64> = corners.iter().map(|c| 1.0 / velocity(c)).collect();
        let mesh = TetMesh::new(corners.to_vec(), vec![[0, 1, 2, 3]], &slowness)
            .unwrap()
            .with_secondary(3)
            .unwrap()
            .with_interpolation(SlownessInterpolation::Velocity);

        let mut face_nodes = 0;
        for node in &mesh.nodes()[4..] {
            let [x, y, z] = node.coords;
            let zeros = [1.0 - x - y - z, x, y, z]
                .iter()
                .filter(|b| b.abs() < 1e-12)
                .count();
            if zeros == 1 {
                face_nodes += 1;
            }
            // a field linear in velocity is reproduced on edges and faces
            assert!((node.slowness - 1.0 / velocity(&node.coords)).abs() < 1e-12);
        }
        // 3 interior lattice nodes on each of the 4 faces
        assert_eq!(face_nodes, 12);
    }

    #[test]
    fn invalid_meshes() {
        let pts = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ];
        assert!(matches!(
            TetMesh::new(pts.clone(), vec![[0, 1, 2, 3]], &[1.0; 4]),
            Err(RaytraceError::InvalidMesh(_))
        ));
        assert!(matches!(
            TetMesh::new(pts.clone(), vec![[0, 1, 2, 7]], &[1.0; 4]),
            Err(RaytraceError::InvalidMesh(_))
        ));
        assert!(matches!(
            TetMesh::new(pts, vec![], &[1.0; 4]),
            Err(RaytraceError::InvalidMesh(_))
        ));
    }
}
