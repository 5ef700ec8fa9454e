// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use proptest::prelude::*;

use spm_raytrace::kernels::distance;
use spm_raytrace::{Mesh, Point, Raytracer, RectMesh2D};

const NC: usize = 5;

fn mesh_from(slowness: &[f64], secondary: usize) -> RectMesh2D {
    RectMesh2D::new([NC, NC], [1.0, 1.0], [0.0, 0.0], slowness)
        .unwrap()
        .with_secondary([secondary, secondary])
        .unwrap()
}

fn slowness_field() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.2f64..5.0, (NC + 1) * (NC + 1))
}

fn point() -> impl Strategy<Value = Point<2>> {
    (0.0f64..=NC as f64, 0.0f64..=NC as f64).prop_map(|(x, z)| [x, z])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn traveltime_bounded_by_extreme_slowness(
        slowness in slowness_field(),
        src in point(),
        rx in point(),
    ) {
        prop_assume!(distance(&src, &rx) > 1e-3);
        let rt = Raytracer::new(mesh_from(&slowness, 1), 1).unwrap();
        let t = rt.raytrace(&[src], &[0.0], &[rx], 0).unwrap()[0];
        let s_min = slowness.iter().copied().fold(f64::INFINITY, f64::min);
        prop_assert!(t.is_finite());
        prop_assert!(t >= s_min * distance(&src, &rx) - 1e-9);
    }

    #[test]
    fn path_is_consistent_with_lengths(
        slowness in slowness_field(),
        src in point(),
        rx in point(),
    ) {
        let rt = Raytracer::new(mesh_from(&slowness, 2), 1).unwrap();
        let rays = rt.raytrace_with_lengths(&[src], &[0.0], &[rx], 0).unwrap();
        let path = &rays.paths[0];
        prop_assert_eq!(path.last(), Some(&rx));

        let poly: f64 = path.windows(2).map(|w| distance(&w[0], &w[1])).sum();
        let total: f64 = rays.lengths[0].iter().map(|l| l.length).sum();
        prop_assert!((poly - total).abs() < 1e-9);
        prop_assert!(rays.lengths[0].windows(2).all(|w| w[0].cell < w[1].cell));
        prop_assert!(rays.lengths[0].iter().all(|l| l.length >= 0.0));
    }

    #[test]
    fn seed_time_shifts_all_arrivals(
        slowness in slowness_field(),
        src in point(),
        t0 in 0.0f64..10.0,
    ) {
        let rt = Raytracer::new(mesh_from(&slowness, 1), 1).unwrap();
        rt.raytrace(&[src], &[0.0], &[], 0).unwrap();
        let base = rt.node_traveltimes(0).unwrap();
        rt.raytrace(&[src], &[t0], &[], 0).unwrap();
        let shifted = rt.node_traveltimes(0).unwrap();
        for (a, b) in base.iter().zip(&shifted) {
            prop_assert!((b - a - t0).abs() < 1e-9);
        }
    }

    #[test]
    fn node_to_node_reciprocity(
        slowness in slowness_field(),
        a in (0..=NC, 0..=NC),
        b in (0..=NC, 0..=NC),
    ) {
        let mesh = mesh_from(&slowness, 1);
        let pa = mesh.nodes()[mesh.primary_index(a.0, a.1)].coords;
        let pb = mesh.nodes()[mesh.primary_index(b.0, b.1)].coords;
        let rt = Raytracer::new(mesh, 1).unwrap();
        let ab = rt.raytrace(&[pa], &[0.0], &[pb], 0).unwrap()[0];
        let ba = rt.raytrace(&[pb], &[0.0], &[pa], 0).unwrap()[0];
        prop_assert!((ab - ba).abs() < 1e-9);
    }
}
