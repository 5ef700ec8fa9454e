// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Pure geometric and interpolation kernels used by the meshes and the
//! propagation engine.

use crate::core::{Point, SlownessInterpolation};

/// Euclidean distance between two points.
#[inline]
pub fn distance<const N: usize>(a: &Point<N>, b: &Point<N>) -> f64 {
    let mut sum = 0.0;
    for d in 0..N {
        let diff = a[d] - b[d];
        sum += diff * diff;
    }
    sum.sqrt()
}

/// Average slowness along an edge between two nodes.
#[inline]
pub fn edge_slowness(s_a: f64, s_b: f64) -> f64 {
    0.5 * (s_a + s_b)
}

/// Local stencil between two nodes: travel time along the straight segment
/// `a -> b` with the slowness averaged over the two endpoints.
///
/// This is the edge cost of the propagation graph. It is symmetric in its
/// endpoints and exact for a homogeneous medium.
#[inline]
pub fn mean_slowness_dt<const N: usize>(a: &Point<N>, s_a: f64, b: &Point<N>, s_b: f64) -> f64 {
    distance(a, b) * edge_slowness(s_a, s_b)
}

/// Combine `(slowness, weight)` samples into one slowness value.
///
/// In [`SlownessInterpolation::Slowness`] mode the weights are applied to the
/// slowness values directly; in [`SlownessInterpolation::Velocity`] mode they
/// are applied to the velocities and the result is inverted back. Weights are
/// expected to sum to one.
pub fn blend<I>(samples: I, mode: SlownessInterpolation) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    match mode {
        SlownessInterpolation::Slowness => samples.into_iter().map(|(s, w)| w * s).sum(),
        SlownessInterpolation::Velocity => {
            let v: f64 = samples.into_iter().map(|(s, w)| w / s).sum();
            1.0 / v
        }
    }
}

/// Bilinear weights of point `p` inside the rectangle starting at `lo` with
/// side lengths `size`.
///
/// Corner order: `(x0, z0)`, `(x1, z0)`, `(x0, z1)`, `(x1, z1)`.
pub fn bilinear_weights(p: &Point<2>, lo: &Point<2>, size: &Point<2>) -> [f64; 4] {
    let u = ((p[0] - lo[0]) / size[0]).clamp(0.0, 1.0);
    let v = ((p[1] - lo[1]) / size[1]).clamp(0.0, 1.0);
    [
        (1.0 - u) * (1.0 - v),
        u * (1.0 - v),
        (1.0 - u) * v,
        u * v,
    ]
}

/// Six times the signed volume of tetrahedron `(a, b, c, d)`.
#[inline]
pub fn tet_volume6(a: &Point<3>, b: &Point<3>, c: &Point<3>, d: &Point<3>) -> f64 {
    let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let ac = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let ad = [d[0] - a[0], d[1] - a[1], d[2] - a[2]];
    ab[0] * (ac[1] * ad[2] - ac[2] * ad[1]) - ab[1] * (ac[0] * ad[2] - ac[2] * ad[0])
        + ab[2] * (ac[0] * ad[1] - ac[1] * ad[0])
}

/// Barycentric coordinates of `p` with respect to tetrahedron `corners`.
///
/// Returns `None` for a degenerate (flat) tetrahedron. Coordinates of points
/// outside the tetrahedron are returned unclamped (some are negative).
pub fn tet_barycentric(p: &Point<3>, corners: &[Point<3>; 4]) -> Option<[f64; 4]> {
    let [a, b, c, d] = corners;
    let vol = tet_volume6(a, b, c, d);
    if vol.abs() <= f64::EPSILON * scale3(corners).powi(3) {
        return None;
    }
    Some([
        tet_volume6(p, b, c, d) / vol,
        tet_volume6(a, p, c, d) / vol,
        tet_volume6(a, b, p, d) / vol,
        tet_volume6(a, b, c, p) / vol,
    ])
}

/// Largest coordinate extent of a set of corners, used to scale tolerances.
fn scale3(corners: &[Point<3>; 4]) -> f64 {
    let mut extent: f64 = 0.0;
    for d in 0..3 {
        let lo = corners.iter().map(|c| c[d]).fold(f64::INFINITY, f64::min);
        let hi = corners.iter().map(|c| c[d]).fold(f64::NEG_INFINITY, f64::max);
        extent = extent.max(hi - lo);
    }
    extent
}
