// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Receiver arrivals and raypath reconstruction from the parent chain.

use std::collections::BTreeMap;

use crate::core::{Mesh, Point, NO_PARENT, UNREACHED};
use crate::engine::LaneState;
use crate::error::{RaytraceError, Result};
use crate::kernels::distance;

/// Length of a raypath inside one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellLength {
    /// Cell index.
    pub cell: usize,
    /// Accumulated path length within the cell.
    pub length: f64,
}

/// Travel time at a receiver and the link from which its ray is traced back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Arrival {
    pub(crate) time: f64,
    pub(crate) parent: usize,
    pub(crate) cell: usize,
}

impl Arrival {
    const UNREACHED: Arrival = Arrival {
        time: UNREACHED,
        parent: NO_PARENT,
        cell: NO_PARENT,
    };
}

/// What [`backtrack`] accumulates besides the path itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Accumulate {
    pub(crate) lengths: bool,
    pub(crate) traveltime: bool,
}

/// A reconstructed ray.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Backtrace<const N: usize> {
    /// Waypoints from the source to the receiver.
    pub(crate) path: Vec<Point<N>>,
    /// Per-cell lengths sorted by cell, empty unless accumulated.
    pub(crate) lengths: Vec<CellLength>,
    /// Seed time plus the slowness integrated along the path, or
    /// [`UNREACHED`] unless accumulated.
    pub(crate) traveltime: f64,
}

/// Travel time at receiver `rx`, located in `cell`, after propagation.
///
/// A receiver on a node takes that node's time and parent link. Otherwise
/// the receiver is connected to every reached node of its cell, and to any
/// ephemeral source in that cell, through the local stencil; the fastest
/// connection wins.
pub(crate) fn arrival<M: Mesh<N>, const N: usize>(
    mesh: &M,
    lane: &LaneState<N>,
    rx: &Point<N>,
    cell: usize,
    tol: f64,
) -> Arrival {
    if let Some(n) = mesh.node_in_cell(cell, rx, tol) {
        return Arrival {
            time: lane.time[n],
            parent: lane.parent[n],
            cell: lane.parent_cell[n],
        };
    }
    let s_rx = mesh.interpolate_slowness(cell, rx);
    let nodes = mesh.nodes();

    let mut best = Arrival::UNREACHED;
    let mut consider = |idx: usize, t: f64, coords: &Point<N>, s: f64| {
        let candidate = t + mesh.local_dt(coords, s, rx, s_rx);
        if candidate < best.time {
            best = Arrival {
                time: candidate,
                parent: idx,
                cell,
            };
        }
    };
    for &n in mesh.nodes_of(cell) {
        if lane.time[n] != UNREACHED {
            consider(n, lane.time[n], &nodes[n].coords, nodes[n].slowness);
        }
    }
    let offset = lane.num_nodes();
    for (k, src) in lane.sources.iter().enumerate() {
        if src.cell == cell {
            consider(offset + k, src.time, &src.coords, src.slowness);
        }
    }
    best
}

/// Walk the parent chain from receiver `rx` back to a source.
///
/// The path is ordered source to receiver. Lengths are merged per cell and
/// sorted by cell index. The integrated travel time samples the slowness
/// field at the midpoint of each segment, inside the cell the segment
/// crosses. A receiver that is itself a seed node yields the single point
/// `rx` and its seed time.
///
/// # Errors
/// Returns [`RaytraceError::UnreachableReceiver`] if no source reaches the
/// receiver, and [`RaytraceError::ParentChainOverrun`] if the chain is longer
/// than the number of nodes.
pub(crate) fn backtrack<M: Mesh<N>, const N: usize>(
    mesh: &M,
    lane: &LaneState<N>,
    rx: &Point<N>,
    arrival: &Arrival,
    receiver: usize,
    accumulate: Accumulate,
) -> Result<Backtrace<N>> {
    if arrival.parent == NO_PARENT {
        if arrival.time == UNREACHED {
            return Err(RaytraceError::UnreachableReceiver { index: receiver });
        }
        return Ok(Backtrace {
            path: vec![*rx],
            lengths: Vec::new(),
            traveltime: if accumulate.traveltime { arrival.time } else { UNREACHED },
        });
    }

    let limit = lane.num_nodes() + lane.sources.len();
    let mut path = vec![*rx];
    let mut lengths: BTreeMap<usize, f64> = BTreeMap::new();
    let mut integral = 0.0;
    let (mut current, mut cell, mut child) = (arrival.parent, arrival.cell, *rx);

    for _ in 0..limit {
        let (coords, parent, parent_cell) = lane.link(mesh, current);
        let segment = distance(&coords, &child);
        if accumulate.lengths {
            *lengths.entry(cell).or_insert(0.0) += segment;
        }
        if accumulate.traveltime {
            let mut mid = coords;
            for (m, c) in mid.iter_mut().zip(child.iter()) {
                *m = 0.5 * (*m + c);
            }
            integral += segment * mesh.interpolate_slowness(cell, &mid);
        }
        path.push(coords);
        if parent == NO_PARENT {
            path.reverse();
            let lengths = lengths
                .into_iter()
                .map(|(cell, length)| CellLength { cell, length })
                .collect();
            let traveltime = if accumulate.traveltime {
                lane.time_of(current) + integral
            } else {
                UNREACHED
            };
            return Ok(Backtrace {
                path,
                lengths,
                traveltime,
            });
        }
        current = parent;
        cell = parent_cell;
        child = coords;
    }
    Err(RaytraceError::ParentChainOverrun { receiver, limit })
}
