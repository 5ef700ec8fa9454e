// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::Path;

use ndarray::{Array2, ArrayD, IxDyn, ShapeBuilder};

use crate::core::Point;
use crate::error::{RaytraceError, Result};
use crate::raypath::CellLength;

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// NumPy .npy format.
    Npy,
    /// MATLAB .mat format (Level 5), read only.
    Mat,
}

/// Infer file format from extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(FileFormat::Npy),
        Some("mat") => Ok(FileFormat::Mat),
        Some(ext) => Err(RaytraceError::UnsupportedFileFormat(ext.to_string())),
        None => Err(RaytraceError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

fn read_npy_f64(path: &Path) -> Result<ArrayD<f64>> {
    match ndarray_npy::read_npy(path) {
        Ok(a) => Ok(a),
        Err(_) => {
            let arr32: ArrayD<f32> = ndarray_npy::read_npy(path)
                .map_err(|e| RaytraceError::UnsupportedDtype(format!("{}", e)))?;
            Ok(arr32.mapv(|v| v as f64))
        }
    }
}

fn write_npy(path: &Path, shape: &[usize], data: Vec<f64>) -> Result<()> {
    if infer_format(path)? != FileFormat::Npy {
        return Err(RaytraceError::UnsupportedFileFormat(format!(
            "{} (only .npy output is supported)",
            path.display()
        )));
    }
    let arr = ArrayD::from_shape_vec(IxDyn(shape), data)
        .map_err(|e| RaytraceError::Other(format!("shape error: {}", e)))?;
    ndarray_npy::write_npy(path, &arr)
        .map_err(|e| RaytraceError::Other(format!("npy write error: {}", e)))
}

/// Load a node field from a .npy file (f64, or f32 promoted to f64).
///
/// The array must have `expected_shape`; values are returned in row-major
/// order, which is the primary node order of the structured meshes.
pub fn load_npy_field(path: &Path, expected_shape: &[usize]) -> Result<Vec<f64>> {
    let arr = read_npy_f64(path)?;
    if arr.shape() != expected_shape {
        return Err(RaytraceError::FieldShapeMismatch {
            expected: expected_shape.to_vec(),
            got: arr.shape().to_vec(),
        });
    }
    // Fortran-order files would otherwise come out column-major.
    Ok(arr.as_standard_layout().to_owned().into_raw_vec())
}

/// Load a node field from a .mat file.
///
/// MAT arrays are column-major; the stored shape may be `expected_shape` or
/// its reverse. Values are returned in row-major order of `expected_shape`.
pub fn load_mat_field(
    path: &Path,
    variable_name: &str,
    expected_shape: &[usize],
) -> Result<Vec<f64>> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mat = matfile::MatFile::parse(&mut reader)
        .map_err(|e| RaytraceError::Other(format!("MAT parse error: {}", e)))?;

    let available: Vec<String> = mat.arrays().iter().map(|a| a.name().to_string()).collect();
    let array = mat
        .find_by_name(variable_name)
        .ok_or_else(|| RaytraceError::MatVariableNotFound {
            expected: variable_name.to_string(),
            available,
        })?;

    let data: Vec<f64> = match array.data() {
        matfile::NumericData::Double { real, imag: _ } => real.clone(),
        matfile::NumericData::Single { real, imag: _ } => real.iter().map(|&v| v as f64).collect(),
        _ => {
            return Err(RaytraceError::UnsupportedDtype(
                "MAT file array is not f64 or f32".to_string(),
            ))
        }
    };

    let mat_shape: Vec<usize> = array.size().to_vec();
    let reversed: Vec<usize> = expected_shape.iter().rev().copied().collect();
    let same = mat_shape == expected_shape;
    if !same && mat_shape != reversed {
        return Err(RaytraceError::FieldShapeMismatch {
            expected: expected_shape.to_vec(),
            got: mat_shape,
        });
    }

    let arr = ArrayD::from_shape_vec(IxDyn(&mat_shape).f(), data)
        .map_err(|e| RaytraceError::Other(format!("shape error: {}", e)))?;
    let arr = if same {
        arr
    } else {
        let permutation: Vec<usize> = (0..mat_shape.len()).rev().collect();
        arr.permuted_axes(IxDyn(&permutation))
    };
    Ok(arr.as_standard_layout().to_owned().into_raw_vec())
}

/// Convert velocity field to slowness (element-wise 1/v).
pub fn velocity_to_slowness(velocity: &[f64]) -> Result<Vec<f64>> {
    velocity
        .iter()
        .enumerate()
        .map(|(index, &v)| {
            if !v.is_finite() || v <= 0.0 {
                Err(RaytraceError::InvalidVelocity { index, value: v })
            } else {
                Ok(1.0 / v)
            }
        })
        .collect()
}

/// Load a slowness field, inferring format from extension. MAT files must
/// hold a variable named `slowness`.
pub fn load_slowness(path: &Path, expected_shape: &[usize]) -> Result<Vec<f64>> {
    match infer_format(path)? {
        FileFormat::Npy => load_npy_field(path, expected_shape),
        FileFormat::Mat => load_mat_field(path, "slowness", expected_shape),
    }
}

/// Load a velocity field and convert it to slowness. MAT files must hold a
/// variable named `velocity`.
pub fn load_velocity_as_slowness(path: &Path, expected_shape: &[usize]) -> Result<Vec<f64>> {
    let velocity = match infer_format(path)? {
        FileFormat::Npy => load_npy_field(path, expected_shape)?,
        FileFormat::Mat => load_mat_field(path, "velocity", expected_shape)?,
    };
    velocity_to_slowness(&velocity)
}

/// Load points from an `(n, N)` .npy array.
pub fn load_points<const N: usize>(path: &Path) -> Result<Vec<Point<N>>> {
    let arr = read_npy_f64(path)?;
    let shape = arr.shape().to_vec();
    if shape.len() != 2 || shape[1] != N {
        return Err(RaytraceError::FieldShapeMismatch {
            expected: vec![shape.first().copied().unwrap_or(0), N],
            got: shape,
        });
    }
    let flat = arr.as_standard_layout().to_owned().into_raw_vec();
    Ok(flat
        .chunks_exact(N)
        .map(|row| {
            let mut p = [0.0; N];
            p.copy_from_slice(row);
            p
        })
        .collect())
}

/// Save travel times to a 1D .npy array.
pub fn save_traveltimes(path: &Path, traveltimes: &[f64]) -> Result<()> {
    write_npy(path, &[traveltimes.len()], traveltimes.to_vec())
}

/// Save a node field with the given shape to a .npy array.
pub fn save_field(path: &Path, shape: &[usize], values: &[f64]) -> Result<()> {
    write_npy(path, shape, values.to_vec())
}

/// Save raypaths as rows `(ray, x, [y,] z)` of an `(points, 1 + N)` .npy array.
pub fn save_rays<const N: usize>(path: &Path, paths: &[Vec<Point<N>>]) -> Result<()> {
    let rows: usize = paths.iter().map(Vec::len).sum();
    let mut data = Vec::with_capacity(rows * (N + 1));
    for (ray, points) in paths.iter().enumerate() {
        for p in points {
            data.push(ray as f64);
            data.extend_from_slice(p);
        }
    }
    write_npy(path, &[rows, N + 1], data)
}

/// Save per-cell path lengths as sensitivity triplets `(row, cell, length)`
/// of an `(entries, 3)` .npy array. Row is the receiver index.
pub fn save_lengths(path: &Path, lengths: &[Vec<CellLength>]) -> Result<()> {
    let triplets: Vec<[f64; 3]> = lengths
        .iter()
        .enumerate()
        .flat_map(|(row, cells)| {
            cells
                .iter()
                .map(move |l| [row as f64, l.cell as f64, l.length])
        })
        .collect();
    let arr = Array2::from(triplets);
    let (rows, cols) = arr.dim();
    write_npy(path, &[rows, cols], arr.into_raw_vec())
}
