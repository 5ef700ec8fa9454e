// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Front propagation: a Dijkstra-style relaxation over the augmented mesh
//! with the mesh's local stencil as edge cost.
//!
//! Node indices below `num_nodes` refer to mesh nodes; indices from
//! `num_nodes` upwards refer to the ephemeral source nodes of the current
//! call, in creation order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::core::{Mesh, Point, NO_PARENT, UNREACHED};

/// Propagation state of a mesh node within one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    /// Not reached yet.
    Far,
    /// Has a provisional time and at least one queue entry.
    Considered,
    /// Time is final.
    Frozen,
}

/// A travel time ordered with `total_cmp`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Time(f64);

impl Eq for Time {}

impl PartialOrd for Time {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Min-queue entry. Ordering depends only on the entry itself: time first,
/// node index second.
type Entry = Reverse<(Time, usize)>;

/// A source that does not coincide with any mesh node.
#[derive(Debug, Clone)]
pub(crate) struct SourceNode<const N: usize> {
    pub(crate) coords: Point<N>,
    pub(crate) slowness: f64,
    pub(crate) cell: usize,
    pub(crate) time: f64,
}

/// Counters collected while draining the queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PropagationStats {
    /// Entries popped from the queue.
    pub(crate) pops: usize,
    /// Popped entries discarded because the node was already final.
    pub(crate) stale: usize,
    /// Successful relaxations.
    pub(crate) relaxations: usize,
}

/// Private solve state of one lane: per-node travel time and parent links,
/// plus the scratch space of a call.
#[derive(Debug)]
pub(crate) struct LaneState<const N: usize> {
    pub(crate) time: Vec<f64>,
    pub(crate) parent: Vec<usize>,
    pub(crate) parent_cell: Vec<usize>,
    pub(crate) sources: Vec<SourceNode<N>>,
    state: Vec<NodeState>,
    expanded: Vec<bool>,
    queue: BinaryHeap<Entry>,
}

impl<const N: usize> LaneState<N> {
    pub(crate) fn new(num_nodes: usize) -> Self {
        LaneState {
            time: vec![UNREACHED; num_nodes],
            parent: vec![NO_PARENT; num_nodes],
            parent_cell: vec![NO_PARENT; num_nodes],
            sources: Vec::new(),
            state: vec![NodeState::Far; num_nodes],
            expanded: vec![false; num_nodes],
            queue: BinaryHeap::new(),
        }
    }

    /// Forget everything from the previous call.
    pub(crate) fn reset(&mut self) {
        self.time.fill(UNREACHED);
        self.parent.fill(NO_PARENT);
        self.parent_cell.fill(NO_PARENT);
        self.state.fill(NodeState::Far);
        self.expanded.fill(false);
        self.sources.clear();
        self.queue.clear();
    }

    /// Number of mesh nodes; ephemeral sources start at this index.
    pub(crate) fn num_nodes(&self) -> usize {
        self.time.len()
    }

    /// Travel time of node `idx` in either arena.
    pub(crate) fn time_of(&self, idx: usize) -> f64 {
        match idx.checked_sub(self.num_nodes()) {
            None => self.time[idx],
            Some(k) => self.sources[k].time,
        }
    }

    /// Coordinates, parent node and parent cell of node `idx` in either arena.
    pub(crate) fn link<M: Mesh<N>>(&self, mesh: &M, idx: usize) -> (Point<N>, usize, usize) {
        match idx.checked_sub(self.num_nodes()) {
            None => (mesh.nodes()[idx].coords, self.parent[idx], self.parent_cell[idx]),
            Some(k) => (self.sources[k].coords, NO_PARENT, NO_PARENT),
        }
    }

    #[cfg(test)]
    pub(crate) fn node_state(&self, idx: usize) -> NodeState {
        self.state[idx]
    }
}

/// Seed the queue from the sources.
///
/// `cells[i]` is the cell containing `sources[i]`. A source coinciding with
/// a node of that cell (within `tol`) freezes the node at the seed time. Any
/// other source becomes an ephemeral node whose slowness is interpolated
/// from the corners of its cell.
pub(crate) fn seed<M: Mesh<N>, const N: usize>(
    mesh: &M,
    lane: &mut LaneState<N>,
    sources: &[Point<N>],
    cells: &[usize],
    times: &[f64],
    tol: f64,
) {
    for ((p, &cell), &t0) in sources.iter().zip(cells).zip(times) {
        if let Some(n) = mesh.node_in_cell(cell, p, tol) {
            if t0 < lane.time[n] {
                lane.time[n] = t0;
                lane.state[n] = NodeState::Frozen;
                lane.queue.push(Reverse((Time(t0), n)));
            }
            continue;
        }
        let id = lane.num_nodes() + lane.sources.len();
        lane.sources.push(SourceNode {
            coords: *p,
            slowness: mesh.interpolate_slowness(cell, p),
            cell,
            time: t0,
        });
        lane.queue.push(Reverse((Time(t0), id)));
    }
}

/// Drain the queue, freezing nodes in increasing time order.
///
/// Entries left behind by earlier relaxations of a node are skipped when
/// popped.
pub(crate) fn propagate<M: Mesh<N>, const N: usize>(
    mesh: &M,
    lane: &mut LaneState<N>,
) -> PropagationStats {
    let n_nodes = lane.num_nodes();
    let nodes = mesh.nodes();
    let mut stats = PropagationStats::default();

    while let Some(Reverse((Time(t), idx))) = lane.queue.pop() {
        stats.pops += 1;

        let (coords, slowness, owners): (Point<N>, f64, &[usize]) = if idx < n_nodes {
            if lane.expanded[idx] || t > lane.time[idx] {
                stats.stale += 1;
                continue;
            }
            lane.expanded[idx] = true;
            lane.state[idx] = NodeState::Frozen;
            let node = &nodes[idx];
            (node.coords, node.slowness, &node.owners)
        } else {
            let src = &lane.sources[idx - n_nodes];
            (src.coords, src.slowness, std::slice::from_ref(&src.cell))
        };

        for &cell in owners {
            for &nb in mesh.nodes_of(cell) {
                if nb == idx || lane.state[nb] == NodeState::Frozen {
                    continue;
                }
                let target = &nodes[nb];
                let candidate = t + mesh.local_dt(&coords, slowness, &target.coords, target.slowness);
                if candidate < lane.time[nb] {
                    debug_assert!(!lane.expanded[nb], "expanded node {} relaxed again", nb);
                    lane.time[nb] = candidate;
                    lane.parent[nb] = idx;
                    lane.parent_cell[nb] = cell;
                    lane.state[nb] = NodeState::Considered;
                    lane.queue.push(Reverse((Time(candidate), nb)));
                    stats.relaxations += 1;
                }
            }
        }
    }

    log::trace!(
        "propagation: {} pops, {} stale, {} relaxations, {} ephemeral sources",
        stats.pops,
        stats.stale,
        stats.relaxations,
        lane.sources.len()
    );
    stats
}
