// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use spm_raytrace::io;
use spm_raytrace::{
    Mesh, Point, RayRequest, Rays, Raytracer, RectMesh2D, SlownessInterpolation, TetMesh,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MeshKind {
    /// Rectilinear 2D mesh in the (x, z) plane
    Rect2d,
    /// 3D box of hexahedra, each split into six tetrahedra
    Tetbox,
}

#[derive(Parser)]
#[command(name = "spm-raytrace", about = "Shortest-path-method traveltime and raypath solver")]
struct Cli {
    /// Mesh kind
    #[arg(long, value_enum, default_value = "rect2d")]
    mesh: MeshKind,

    /// Number of cells per axis, comma-separated (e.g., 100,50 or 20,20,20)
    #[arg(short = 'c', long)]
    cells: String,

    /// Cell size, one value for all axes or comma-separated per axis
    #[arg(long, default_value = "1.0")]
    spacing: String,

    /// Coordinates of the first mesh vertex, comma-separated
    #[arg(long)]
    origin: Option<String>,

    /// Secondary nodes per cell edge
    #[arg(long, default_value = "0")]
    secondary: usize,

    /// Slowness field: "uniform:<val>", "gradient:<v0>,<g>",
    /// "slowness-file:<path>", or "velocity-file:<path>"
    #[arg(long, default_value = "uniform:1.0")]
    slowness: String,

    /// Interpolate velocity instead of slowness between nodes
    #[arg(long)]
    velocity_interp: bool,

    /// Source coordinates, comma-separated, with optional seed time as
    /// "@t0" (repeatable for multiple sources)
    #[arg(long, num_args = 1)]
    source: Vec<String>,

    /// Receiver coordinates, comma-separated (repeatable)
    #[arg(long, num_args = 1)]
    receiver: Vec<String>,

    /// Receivers as an (n, dim) .npy array
    #[arg(long)]
    receivers_file: Option<PathBuf>,

    /// Node coincidence tolerance
    #[arg(short = 't', long, default_value = "1e-4")]
    tolerance: f64,

    /// Integrate receiver times along the reconstructed raypaths
    #[arg(long)]
    raypath_traveltimes: bool,

    /// Output file for receiver travel times (.npy)
    #[arg(short = 'o', long, default_value = "traveltimes.npy")]
    output: PathBuf,

    /// Output file for raypaths (.npy)
    #[arg(long)]
    rays: Option<PathBuf>,

    /// Output file for per-cell path lengths (.npy)
    #[arg(long)]
    lengths: Option<PathBuf>,

    /// Output file for travel times at the mesh vertices (.npy)
    #[arg(long)]
    field: Option<PathBuf>,
}

fn parse_list<T: FromStr>(s: &str, what: &str, len: usize) -> Result<Vec<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let parts: Vec<T> = s
        .split(',')
        .map(|p| p.trim().parse::<T>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid --{}: '{}'", what, s))?;
    if parts.len() != len {
        bail!("--{} has {} components, expected {}", what, parts.len(), len);
    }
    Ok(parts)
}

fn parse_point<const N: usize>(s: &str, what: &str) -> Result<Point<N>> {
    let coords: Vec<f64> = parse_list(s, what, N)?;
    let mut p = [0.0; N];
    p.copy_from_slice(&coords);
    Ok(p)
}

fn parse_source<const N: usize>(s: &str) -> Result<(Point<N>, f64)> {
    match s.split_once('@') {
        Some((coords, t0)) => {
            let t0: f64 = t0
                .trim()
                .parse()
                .with_context(|| format!("invalid seed time in --source '{}'", s))?;
            Ok((parse_point(coords, "source")?, t0))
        }
        None => Ok((parse_point(s, "source")?, 0.0)),
    }
}

fn parse_spacing(s: &str, dim: usize) -> Result<Vec<f64>> {
    if s.contains(',') {
        parse_list(s, "spacing", dim)
    } else {
        let h: f64 = s.trim().parse().context("invalid --spacing")?;
        Ok(vec![h; dim])
    }
}

/// Slowness at the mesh vertices, in row-major order of `shape`.
///
/// The gradient mode varies velocity linearly along the last axis (depth).
fn build_slowness_field(mode: &str, shape: &[usize], spacing: &[f64]) -> Result<Vec<f64>> {
    let num: usize = shape.iter().product();

    if let Some(val_str) = mode.strip_prefix("uniform:") {
        let val: f64 = val_str.parse().context("invalid uniform slowness value")?;
        if !val.is_finite() || val <= 0.0 {
            bail!("uniform slowness must be positive and finite, got {}", val);
        }
        return Ok(vec![val; num]);
    }

    if let Some(params) = mode.strip_prefix("gradient:") {
        let parts: Vec<f64> = parse_list(params, "slowness gradient", 2)?;
        let (v0, g) = (parts[0], parts[1]);
        let depth_axis = shape.len() - 1;
        let depth_max = (shape[depth_axis] - 1) as f64 * spacing[depth_axis];
        let v_max = v0 + g * depth_max;
        if !v0.is_finite() || v0 <= 0.0 {
            bail!("gradient: v0={} must be positive and finite", v0);
        }
        if !v_max.is_finite() || v_max <= 0.0 {
            bail!(
                "gradient: velocity at depth {} is {} (v0={}, g={})",
                depth_max,
                v_max,
                v0,
                g
            );
        }
        let nk = shape[depth_axis];
        return Ok((0..num)
            .map(|i| {
                let depth = (i % nk) as f64 * spacing[depth_axis];
                1.0 / (v0 + g * depth)
            })
            .collect());
    }

    if let Some(path_str) = mode.strip_prefix("slowness-file:") {
        return Ok(io::load_slowness(Path::new(path_str), shape)?);
    }

    if let Some(path_str) = mode.strip_prefix("velocity-file:") {
        return Ok(io::load_velocity_as_slowness(Path::new(path_str), shape)?);
    }

    bail!(
        "unknown --slowness mode: '{}'. Expected 'uniform:<val>', 'gradient:<v0>,<g>', \
         'slowness-file:<path>', or 'velocity-file:<path>'",
        mode
    );
}

fn run<M: Mesh<N>, const N: usize>(cli: &Cli, mesh: M, vertex_shape: &[usize]) -> Result<()> {
    let mut sources = Vec::with_capacity(cli.source.len());
    let mut times = Vec::with_capacity(cli.source.len());
    for s in &cli.source {
        let (p, t0) = parse_source::<N>(s)?;
        sources.push(p);
        times.push(t0);
    }

    let mut receivers: Vec<Point<N>> = cli
        .receiver
        .iter()
        .map(|s| parse_point(s, "receiver"))
        .collect::<Result<_>>()?;
    if let Some(path) = &cli.receivers_file {
        receivers.extend(
            io::load_points::<N>(path)
                .with_context(|| format!("reading receivers from {}", path.display()))?,
        );
    }

    let request = if cli.lengths.is_some() {
        RayRequest::PathsAndLengths
    } else if cli.rays.is_some() {
        RayRequest::Paths
    } else {
        RayRequest::Traveltimes
    };

    let raytracer = Raytracer::new(mesh, 1)?
        .with_tolerance(cli.tolerance)?
        .with_traveltime_from_raypath(cli.raypath_traveltimes);
    let start = Instant::now();
    let rays: Rays<N> = match request {
        RayRequest::Traveltimes => Rays {
            traveltimes: raytracer.raytrace(&sources, &times, &receivers, 0)?,
            ..Rays::default()
        },
        RayRequest::Paths => raytracer.raytrace_with_paths(&sources, &times, &receivers, 0)?,
        RayRequest::PathsAndLengths => {
            raytracer.raytrace_with_lengths(&sources, &times, &receivers, 0)?
        }
    };
    log::info!(
        "{} sources, {} receivers traced in {:?}",
        sources.len(),
        receivers.len(),
        start.elapsed()
    );

    io::save_traveltimes(&cli.output, &rays.traveltimes)?;
    if let Some(path) = &cli.rays {
        io::save_rays(path, &rays.paths)?;
    }
    if let Some(path) = &cli.lengths {
        io::save_lengths(path, &rays.lengths)?;
    }
    if let Some(path) = &cli.field {
        let tt = raytracer.node_traveltimes(0)?;
        io::save_field(path, vertex_shape, &tt[..raytracer.mesh().num_primary()])?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.source.is_empty() {
        bail!("at least one --source must be specified");
    }
    if cli.receiver.is_empty() && cli.receivers_file.is_none() {
        bail!("at least one --receiver or a --receivers-file must be specified");
    }

    let interpolation = if cli.velocity_interp {
        SlownessInterpolation::Velocity
    } else {
        SlownessInterpolation::Slowness
    };

    match cli.mesh {
        MeshKind::Rect2d => {
            let cells: Vec<usize> = parse_list(&cli.cells, "cells", 2)?;
            let spacing = parse_spacing(&cli.spacing, 2)?;
            let origin: Point<2> = match &cli.origin {
                Some(s) => parse_point(s, "origin")?,
                None => [0.0; 2],
            };
            let shape = [cells[0] + 1, cells[1] + 1];
            let slowness = build_slowness_field(&cli.slowness, &shape, &spacing)?;
            let mesh = RectMesh2D::new([cells[0], cells[1]], [spacing[0], spacing[1]], origin, &slowness)?
                .with_secondary([cli.secondary; 2])?
                .with_interpolation(interpolation);
            run(&cli, mesh, &shape)
        }
        MeshKind::Tetbox => {
            let cells: Vec<usize> = parse_list(&cli.cells, "cells", 3)?;
            let spacing = parse_spacing(&cli.spacing, 3)?;
            let origin: Point<3> = match &cli.origin {
                Some(s) => parse_point(s, "origin")?,
                None => [0.0; 3],
            };
            let shape = [cells[0] + 1, cells[1] + 1, cells[2] + 1];
            let slowness = build_slowness_field(&cli.slowness, &shape, &spacing)?;
            let mesh = TetMesh::from_box(
                [cells[0], cells[1], cells[2]],
                [spacing[0], spacing[1], spacing[2]],
                origin,
                &slowness,
            )?
            .with_secondary(cli.secondary)?
            .with_interpolation(interpolation);
            run(&cli, mesh, &shape)
        }
    }
}
