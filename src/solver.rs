// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Instant;

use crossbeam_queue::SegQueue;

use crate::core::{Mesh, Point, UNREACHED};
use crate::engine::{self, LaneState};
use crate::error::{PointRole, RaytraceError, Result};
use crate::raypath::{self, Accumulate, CellLength};

/// Default tolerance for matching points to nodes and receivers to sources.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// What a raytrace call returns for each receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayRequest {
    /// Travel times only.
    Traveltimes,
    /// Travel times and raypaths.
    Paths,
    /// Travel times, raypaths and per-cell path lengths.
    PathsAndLengths,
}

impl RayRequest {
    fn wants_paths(self) -> bool {
        self != RayRequest::Traveltimes
    }

    fn wants_lengths(self) -> bool {
        self == RayRequest::PathsAndLengths
    }
}

/// Results for one receiver set, in receiver order.
///
/// `paths` and `lengths` are empty unless requested. Each path runs from the
/// source to the receiver; lengths are sorted by cell index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rays<const N: usize> {
    /// First-arrival travel time per receiver.
    pub traveltimes: Vec<f64>,
    /// Raypath polyline per receiver.
    pub paths: Vec<Vec<Point<N>>>,
    /// Per-cell path lengths per receiver.
    pub lengths: Vec<Vec<CellLength>>,
}

/// One independent raytracing job for [`Raytracer::raytrace_batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Shot<const N: usize> {
    /// Source coordinates.
    pub sources: Vec<Point<N>>,
    /// Seed time per source.
    pub times: Vec<f64>,
    /// Receiver coordinates.
    pub receivers: Vec<Point<N>>,
}

impl<const N: usize> Shot<N> {
    /// A shot with explicit seed times.
    pub fn new(sources: Vec<Point<N>>, times: Vec<f64>, receivers: Vec<Point<N>>) -> Self {
        Shot {
            sources,
            times,
            receivers,
        }
    }

    /// A single source fired at time zero.
    pub fn point_source(source: Point<N>, receivers: Vec<Point<N>>) -> Self {
        Shot::new(vec![source], vec![0.0], receivers)
    }
}

/// Cells of the points of one request.
struct Located {
    sources: Vec<usize>,
    receivers: Vec<Vec<usize>>,
}

/// Shortest-path raytracer over an augmented mesh.
///
/// The mesh is shared by all lanes; each lane owns the travel time and
/// parent arrays of one solve. Calls on distinct lanes may run concurrently
/// from different threads. A lane is held for the duration of a call, and a
/// second call on the same lane fails with [`RaytraceError::LaneBusy`].
/// Slowness updates take `&mut self` and therefore cannot overlap a solve.
pub struct Raytracer<M, const N: usize> {
    mesh: M,
    lanes: Box<[Mutex<LaneState<N>>]>,
    tolerance: f64,
    traveltime_from_raypath: bool,
}

impl<M: Mesh<N>, const N: usize> Raytracer<M, N> {
    /// Create a raytracer with `lanes` independent solve lanes.
    ///
    /// # Errors
    /// Returns an error if `lanes` is zero.
    pub fn new(mesh: M, lanes: usize) -> Result<Self> {
        if lanes == 0 {
            return Err(RaytraceError::InvalidLaneCount(lanes));
        }
        let n = mesh.nodes().len();
        let lanes: Box<[Mutex<LaneState<N>>]> =
            (0..lanes).map(|_| Mutex::new(LaneState::new(n))).collect();
        log::debug!(
            "raytracer: {} nodes, {} cells, {} lanes",
            n,
            mesh.num_cells(),
            lanes.len()
        );
        Ok(Raytracer {
            mesh,
            lanes,
            tolerance: DEFAULT_TOLERANCE,
            traveltime_from_raypath: false,
        })
    }

    /// Set the coincidence tolerance (builder method). Default is 1e-4.
    ///
    /// # Errors
    /// Returns an error if the tolerance is not positive and finite.
    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(RaytraceError::InvalidTolerance(tolerance));
        }
        self.tolerance = tolerance;
        Ok(self)
    }

    /// Report receiver times integrated along the reconstructed raypaths
    /// (builder method). Default is off.
    ///
    /// When on, every receiver is traced back to its source and its time is
    /// the seed time plus the slowness interpolated at the midpoint of each
    /// path segment times the segment length. Otherwise the time is the
    /// stencil estimate of the propagation.
    pub fn with_traveltime_from_raypath(mut self, enabled: bool) -> Self {
        self.traveltime_from_raypath = enabled;
        self
    }

    /// Whether receiver times are integrated along raypaths.
    pub fn traveltime_from_raypath(&self) -> bool {
        self.traveltime_from_raypath
    }

    /// Get a reference to the mesh.
    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    /// Consume the raytracer and return the mesh.
    pub fn into_mesh(self) -> M {
        self.mesh
    }

    /// Number of lanes.
    pub fn num_lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Coincidence tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Replace the slowness of the primary nodes and re-interpolate the
    /// secondary nodes.
    ///
    /// # Errors
    /// Returns an error if the vector length differs from the number of
    /// primary nodes or a value is not positive and finite. The previous
    /// field is kept in that case.
    pub fn set_slowness(&mut self, slowness: &[f64]) -> Result<()> {
        self.mesh.set_slowness(slowness)
    }

    /// First-arrival travel times at `receivers`.
    ///
    /// A receiver no source reaches gets [`crate::UNREACHED`], also when
    /// times are integrated along raypaths.
    ///
    /// # Errors
    /// Returns an error for invalid inputs or a busy lane.
    pub fn raytrace(
        &self,
        sources: &[Point<N>],
        times: &[f64],
        receivers: &[Point<N>],
        lane: usize,
    ) -> Result<Vec<f64>> {
        let rays = self.trace_one(sources, times, receivers, lane, RayRequest::Traveltimes)?;
        Ok(rays.traveltimes)
    }

    /// Travel times and raypaths at `receivers`.
    ///
    /// # Errors
    /// As [`Raytracer::raytrace`], plus [`RaytraceError::UnreachableReceiver`]
    /// when a receiver has no ray.
    pub fn raytrace_with_paths(
        &self,
        sources: &[Point<N>],
        times: &[f64],
        receivers: &[Point<N>],
        lane: usize,
    ) -> Result<Rays<N>> {
        self.trace_one(sources, times, receivers, lane, RayRequest::Paths)
    }

    /// Travel times, raypaths and per-cell path lengths at `receivers`.
    ///
    /// # Errors
    /// As [`Raytracer::raytrace_with_paths`].
    pub fn raytrace_with_lengths(
        &self,
        sources: &[Point<N>],
        times: &[f64],
        receivers: &[Point<N>],
        lane: usize,
    ) -> Result<Rays<N>> {
        self.trace_one(sources, times, receivers, lane, RayRequest::PathsAndLengths)
    }

    /// Propagate once and answer several receiver sets.
    ///
    /// # Errors
    /// As [`Raytracer::raytrace_with_paths`]. Every receiver of every set is
    /// checked before propagation starts.
    pub fn raytrace_multi(
        &self,
        sources: &[Point<N>],
        times: &[f64],
        receiver_sets: &[Vec<Point<N>>],
        lane: usize,
        request: RayRequest,
    ) -> Result<Vec<Rays<N>>> {
        let sets: Vec<&[Point<N>]> = receiver_sets.iter().map(Vec::as_slice).collect();
        self.run(sources, times, &sets, lane, request)
    }

    /// Travel time of every mesh node from the last call on `lane`.
    ///
    /// # Errors
    /// Returns an error for an invalid or busy lane.
    pub fn node_traveltimes(&self, lane: usize) -> Result<Vec<f64>> {
        Ok(self.acquire(lane)?.time.clone())
    }

    /// Run independent shots over all lanes and return their travel times
    /// in shot order.
    ///
    /// # Errors
    /// Returns the error of the lowest-indexed failing shot. Remaining shots
    /// are abandoned once a shot fails.
    pub fn raytrace_batch(&self, shots: &[Shot<N>]) -> Result<Vec<Vec<f64>>> {
        let rays = self.raytrace_batch_request(shots, RayRequest::Traveltimes)?;
        Ok(rays.into_iter().map(|r| r.traveltimes).collect())
    }

    /// Run independent shots over all lanes with paths and per-cell lengths.
    ///
    /// # Errors
    /// As [`Raytracer::raytrace_batch`].
    pub fn raytrace_batch_with_lengths(&self, shots: &[Shot<N>]) -> Result<Vec<Rays<N>>> {
        self.raytrace_batch_request(shots, RayRequest::PathsAndLengths)
    }

    /// Run independent shots over the idle lanes.
    ///
    /// Each worker thread claims one lane that no other call holds and pulls
    /// shots from a shared queue until it is empty. Lanes held by concurrent
    /// calls are left alone; they only reduce the number of workers.
    ///
    /// # Errors
    /// As [`Raytracer::raytrace_batch`], plus [`RaytraceError::NoIdleLane`]
    /// when every lane is held by another call.
    pub fn raytrace_batch_request(
        &self,
        shots: &[Shot<N>],
        request: RayRequest,
    ) -> Result<Vec<Rays<N>>> {
        if shots.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.num_lanes().min(shots.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| RaytraceError::Other(e.to_string()))?;

        let pending = SegQueue::new();
        for i in 0..shots.len() {
            pending.push(i);
        }
        let finished = SegQueue::new();
        let failed = AtomicBool::new(false);
        let claimed = AtomicUsize::new(0);
        let start_time = Instant::now();

        pool.scope(|s| {
            for worker in 0..workers {
                let (pending, finished, failed, claimed) = (&pending, &finished, &failed, &claimed);
                s.spawn(move |_| {
                    let Some((lane, mut state)) = self.claim_idle_lane(worker) else {
                        return;
                    };
                    claimed.fetch_add(1, Ordering::AcqRel);
                    while !failed.load(Ordering::Acquire) {
                        let Some(i) = pending.pop() else {
                            break;
                        };
                        let shot: &Shot<N> = &shots[i];
                        let receivers: &[Point<N>] = &shot.receivers;
                        let result = self
                            .locate_request(&shot.sources, &shot.times, &[receivers])
                            .and_then(|located| {
                                self.solve(&mut state, &shot.sources, &shot.times, &[receivers], &located, request)
                            })
                            .map(|mut rays| rays.pop().unwrap_or_default());
                        if let Err(e) = &result {
                            log::trace!("lane {}: shot {} failed: {}", lane, i, e);
                            failed.store(true, Ordering::Release);
                        }
                        finished.push((i, result));
                    }
                });
            }
        });
        let claimed = claimed.into_inner();
        if claimed == 0 {
            return Err(RaytraceError::NoIdleLane);
        }

        let mut results: Vec<Option<Rays<N>>> = vec![None; shots.len()];
        let mut first_error: Option<(usize, RaytraceError)> = None;
        while let Some((i, result)) = finished.pop() {
            match result {
                Ok(rays) => results[i] = Some(rays),
                Err(e) => {
                    if first_error.as_ref().map_or(true, |(j, _)| i < *j) {
                        first_error = Some((i, e));
                    }
                }
            }
        }
        if let Some((i, e)) = first_error {
            log::debug!("batch aborted: shot {} failed: {}", i, e);
            return Err(e);
        }
        log::debug!(
            "batch: {} shots on {} lanes in {:?}",
            shots.len(),
            claimed,
            start_time.elapsed()
        );
        results
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.ok_or_else(|| RaytraceError::Other(format!("shot {} was not processed", i))))
            .collect()
    }

    fn trace_one(
        &self,
        sources: &[Point<N>],
        times: &[f64],
        receivers: &[Point<N>],
        lane: usize,
        request: RayRequest,
    ) -> Result<Rays<N>> {
        let mut rays = self.run(sources, times, &[receivers], lane, request)?;
        Ok(rays.pop().unwrap_or_default())
    }

    fn run(
        &self,
        sources: &[Point<N>],
        times: &[f64],
        receiver_sets: &[&[Point<N>]],
        lane: usize,
        request: RayRequest,
    ) -> Result<Vec<Rays<N>>> {
        let located = self.locate_request(sources, times, receiver_sets)?;
        let mut state = self.acquire(lane)?;
        log::trace!("lane {}: {} sources, {} receiver sets", lane, sources.len(), receiver_sets.len());
        self.solve(&mut state, sources, times, receiver_sets, &located, request)
    }

    /// Validate a request and locate each of its points once.
    fn locate_request(
        &self,
        sources: &[Point<N>],
        times: &[f64],
        receiver_sets: &[&[Point<N>]],
    ) -> Result<Located> {
        let sources = self.check_sources(sources, times)?;
        let receivers = receiver_sets
            .iter()
            .map(|receivers| self.locate_all(receivers, PointRole::Receiver))
            .collect::<Result<Vec<_>>>()?;
        Ok(Located { sources, receivers })
    }

    fn solve(
        &self,
        state: &mut LaneState<N>,
        sources: &[Point<N>],
        times: &[f64],
        receiver_sets: &[&[Point<N>]],
        located: &Located,
        request: RayRequest,
    ) -> Result<Vec<Rays<N>>> {
        state.reset();
        engine::seed(&self.mesh, state, sources, &located.sources, times, self.tolerance);
        let stats = engine::propagate(&self.mesh, state);
        log::trace!("{} nodes frozen", stats.pops - stats.stale);
        let state: &LaneState<N> = state;
        receiver_sets
            .iter()
            .zip(&located.receivers)
            .map(|(receivers, cells)| self.collect(state, sources, times, receivers, cells, request))
            .collect()
    }

    fn collect(
        &self,
        state: &LaneState<N>,
        sources: &[Point<N>],
        times: &[f64],
        receivers: &[Point<N>],
        cells: &[usize],
        request: RayRequest,
    ) -> Result<Rays<N>> {
        let accumulate = Accumulate {
            lengths: request.wants_lengths(),
            traveltime: self.traveltime_from_raypath,
        };
        let mut rays = Rays {
            traveltimes: Vec::with_capacity(receivers.len()),
            ..Rays::default()
        };
        for (index, (rx, &cell)) in receivers.iter().zip(cells).enumerate() {
            if let Some(t0) = self.seed_time_at(sources, times, rx) {
                rays.traveltimes.push(t0);
                if request.wants_paths() {
                    rays.paths.push(vec![*rx]);
                }
                if request.wants_lengths() {
                    rays.lengths.push(Vec::new());
                }
                continue;
            }
            let arrival = raypath::arrival(&self.mesh, state, rx, cell, self.tolerance);
            // unreachable receivers only fail when a path is requested
            if !request.wants_paths() && (!accumulate.traveltime || arrival.time == UNREACHED) {
                rays.traveltimes.push(arrival.time);
                continue;
            }
            let ray = raypath::backtrack(&self.mesh, state, rx, &arrival, index, accumulate)?;
            rays.traveltimes.push(if accumulate.traveltime {
                ray.traveltime
            } else {
                arrival.time
            });
            if request.wants_paths() {
                rays.paths.push(ray.path);
            }
            if request.wants_lengths() {
                rays.lengths.push(ray.lengths);
            }
        }
        Ok(rays)
    }

    /// Smallest seed time among the sources coinciding with `rx`.
    fn seed_time_at(&self, sources: &[Point<N>], times: &[f64], rx: &Point<N>) -> Option<f64> {
        sources
            .iter()
            .zip(times)
            .filter(|(src, _)| {
                src.iter()
                    .zip(rx.iter())
                    .all(|(a, b)| (a - b).abs() < self.tolerance)
            })
            .map(|(_, &t)| t)
            .reduce(f64::min)
    }

    /// Validate the sources and return the cell of each.
    fn check_sources(&self, sources: &[Point<N>], times: &[f64]) -> Result<Vec<usize>> {
        if sources.is_empty() {
            return Err(RaytraceError::NoSources);
        }
        if times.len() != sources.len() {
            return Err(RaytraceError::ShapeMismatch {
                what: "seed times",
                expected: sources.len(),
                got: times.len(),
            });
        }
        if let Some((index, &value)) = times
            .iter()
            .enumerate()
            .find(|(_, t)| !t.is_finite() || **t < 0.0)
        {
            return Err(RaytraceError::InvalidSeedTime { index, value });
        }
        self.locate_all(sources, PointRole::Source)
    }

    /// Cell of every point, located once per call.
    fn locate_all(&self, points: &[Point<N>], role: PointRole) -> Result<Vec<usize>> {
        points
            .iter()
            .enumerate()
            .map(|(index, p)| {
                self.mesh.locate(p).ok_or_else(|| RaytraceError::OutsideDomain {
                    role,
                    index,
                    coord: p.to_vec(),
                })
            })
            .collect()
    }

    fn acquire(&self, lane: usize) -> Result<MutexGuard<'_, LaneState<N>>> {
        let slot = self.lanes.get(lane).ok_or(RaytraceError::InvalidLane {
            lane,
            lanes: self.lanes.len(),
        })?;
        try_claim(slot).ok_or(RaytraceError::LaneBusy(lane))
    }

    /// Claim the first idle lane at or after `start`, wrapping around.
    fn claim_idle_lane(&self, start: usize) -> Option<(usize, MutexGuard<'_, LaneState<N>>)> {
        let n = self.lanes.len();
        (0..n)
            .map(|k| (start + k) % n)
            .find_map(|lane| try_claim(&self.lanes[lane]).map(|guard| (lane, guard)))
    }
}

fn try_claim<T>(slot: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match slot.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::WouldBlock) => None,
        // every call resets the lane before use
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UNREACHED;
    use crate::mesh::{NodeGraph, RectMesh2D, TetMesh};

    fn tracer(cells: [usize; 2], secondary: [usize; 2], lanes: usize) -> Raytracer<RectMesh2D, 2> {
        let n = (cells[0] + 1) * (cells[1] + 1);
        let mesh = RectMesh2D::new(cells, [1.0, 1.0], [0.0, 0.0], &vec![1.0; n])
            .unwrap()
            .with_secondary(secondary)
            .unwrap();
        Raytracer::new(mesh, lanes).unwrap()
    }

    #[test]
    fn three_by_three_example() {
        let rt = tracer([2, 2], [0, 0], 1);
        let rays = rt
            .raytrace_with_lengths(&[[0.0, 0.0]], &[0.0], &[[2.0, 2.0]], 0)
            .unwrap();
        assert!((rays.traveltimes[0] - 2.0 * 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(rays.paths[0], vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]);
        let cells: Vec<usize> = rays.lengths[0].iter().map(|l| l.cell).collect();
        assert_eq!(cells, vec![0, 3]);
    }

    #[test]
    fn modes_agree_on_traveltimes() {
        let rt = tracer([4, 3], [2, 2], 1);
        let rx = [[4.0, 3.0], [2.5, 0.7], [0.0, 3.0]];
        let tt = rt.raytrace(&[[0.3, 0.2]], &[0.0], &rx, 0).unwrap();
        let with_paths = rt.raytrace_with_paths(&[[0.3, 0.2]], &[0.0], &rx, 0).unwrap();
        let with_lengths = rt.raytrace_with_lengths(&[[0.3, 0.2]], &[0.0], &rx, 0).unwrap();
        assert_eq!(tt, with_paths.traveltimes);
        assert_eq!(tt, with_lengths.traveltimes);
        assert_eq!(with_paths.paths, with_lengths.paths);
        assert!(with_paths.lengths.is_empty());
        assert_eq!(with_lengths.lengths.len(), 3);
    }

    #[test]
    fn receiver_at_source_reports_seed_time() {
        let rt = tracer([3, 3], [1, 1], 1);
        let src = [1.2, 1.7];
        let rays = rt
            .raytrace_with_lengths(&[src, [0.0, 0.0]], &[0.25, 0.0], &[src], 0)
            .unwrap();
        assert_eq!(rays.traveltimes, vec![0.25]);
        assert_eq!(rays.paths[0], vec![src]);
        assert!(rays.lengths[0].is_empty());
    }

    #[test]
    fn multi_receiver_sets_share_one_propagation() {
        let rt = tracer([3, 3], [1, 1], 1);
        let sets = vec![vec![[3.0, 3.0]], vec![[1.0, 2.0], [2.0, 1.0]]];
        let out = rt
            .raytrace_multi(&[[0.0, 0.0]], &[0.0], &sets, 0, RayRequest::Paths)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].traveltimes.len(), 2);
        let single = rt.raytrace(&[[0.0, 0.0]], &[0.0], &sets[1], 0).unwrap();
        assert_eq!(out[1].traveltimes, single);
    }

    #[test]
    fn node_traveltimes_reflect_last_call() {
        let rt = tracer([2, 2], [0, 0], 2);
        rt.raytrace(&[[0.0, 0.0]], &[0.0], &[], 1).unwrap();
        let tt = rt.node_traveltimes(1).unwrap();
        assert_eq!(tt[0], 0.0);
        assert!(tt.iter().all(|t| t.is_finite()));
        assert!(rt.node_traveltimes(0).unwrap().iter().all(|&t| t == UNREACHED));
    }

    #[test]
    fn set_slowness_changes_times_and_keeps_on_error() {
        let mut rt = tracer([2, 2], [0, 0], 1);
        let before = rt.raytrace(&[[0.0, 0.0]], &[0.0], &[[2.0, 0.0]], 0).unwrap();
        assert!(matches!(
            rt.set_slowness(&[1.0; 4]),
            Err(RaytraceError::SlownessSizeMismatch { expected: 9, got: 4 })
        ));
        assert_eq!(rt.raytrace(&[[0.0, 0.0]], &[0.0], &[[2.0, 0.0]], 0).unwrap(), before);
        rt.set_slowness(&[2.0; 9]).unwrap();
        let after = rt.raytrace(&[[0.0, 0.0]], &[0.0], &[[2.0, 0.0]], 0).unwrap();
        assert!((after[0] - 2.0 * before[0]).abs() < 1e-12);
    }

    #[test]
    fn input_validation() {
        let rt = tracer([2, 2], [0, 0], 1);
        let rx = [[1.0, 1.0]];
        assert!(matches!(rt.raytrace(&[], &[], &rx, 0), Err(RaytraceError::NoSources)));
        assert!(matches!(
            rt.raytrace(&[[0.0, 0.0]], &[0.0, 1.0], &rx, 0),
            Err(RaytraceError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            rt.raytrace(&[[0.0, 0.0]], &[-1.0], &rx, 0),
            Err(RaytraceError::InvalidSeedTime { index: 0, .. })
        ));
        assert!(matches!(
            rt.raytrace(&[[0.0, 5.0]], &[0.0], &rx, 0),
            Err(RaytraceError::OutsideDomain { role: PointRole::Source, .. })
        ));
        assert!(matches!(
            rt.raytrace(&[[0.0, 0.0]], &[0.0], &[[1.0, 1.0], [-1.0, 0.0]], 0),
            Err(RaytraceError::OutsideDomain { role: PointRole::Receiver, index: 1, .. })
        ));
        assert!(matches!(
            rt.raytrace(&[[0.0, 0.0]], &[0.0], &rx, 1),
            Err(RaytraceError::InvalidLane { lane: 1, lanes: 1 })
        ));
        assert!(matches!(
            Raytracer::new(rt.into_mesh(), 0),
            Err(RaytraceError::InvalidLaneCount(0))
        ));
    }

    #[test]
    fn busy_lane_is_rejected() {
        let rt = tracer([2, 2], [0, 0], 2);
        let _held = rt.acquire(0).unwrap();
        assert!(matches!(
            rt.raytrace(&[[0.0, 0.0]], &[0.0], &[[1.0, 1.0]], 0),
            Err(RaytraceError::LaneBusy(0))
        ));
        assert!(rt.raytrace(&[[0.0, 0.0]], &[0.0], &[[1.0, 1.0]], 1).is_ok());
    }

    #[test]
    fn batch_runs_on_idle_lanes_only() {
        let rt = tracer([4, 4], [1, 1], 3);
        let rx = vec![[4.0, 4.0], [0.5, 3.5]];
        let shots: Vec<Shot<2>> = (0..5)
            .map(|k| Shot::point_source([k as f64 * 0.8, 0.0], rx.clone()))
            .collect();
        let out = {
            let _held = rt.acquire(0).unwrap();
            rt.raytrace_batch(&shots).unwrap()
        };
        for (shot, tt) in shots.iter().zip(&out) {
            assert_eq!(tt, &rt.raytrace(&shot.sources, &shot.times, &rx, 0).unwrap());
        }

        let _held: Vec<_> = (0..3).map(|lane| rt.acquire(lane).unwrap()).collect();
        assert!(matches!(
            rt.raytrace_batch(&shots),
            Err(RaytraceError::NoIdleLane)
        ));
    }

    #[test]
    fn raypath_traveltimes_in_uniform_medium() {
        let rx = [[4.0, 3.0], [2.5, 0.7], [0.0, 3.0], [0.3, 0.2]];
        let stencil = tracer([4, 3], [2, 2], 1);
        let integrated = tracer([4, 3], [2, 2], 1).with_traveltime_from_raypath(true);
        assert!(integrated.traveltime_from_raypath());
        let a = stencil.raytrace(&[[0.3, 0.2]], &[0.5], &rx, 0).unwrap();
        let b = integrated.raytrace(&[[0.3, 0.2]], &[0.5], &rx, 0).unwrap();
        for (ta, tb) in a.iter().zip(&b) {
            assert!((ta - tb).abs() < 1e-12, "{} vs {}", ta, tb);
        }
        assert_eq!(b[3], 0.5);
        let rays = integrated
            .raytrace_with_lengths(&[[0.3, 0.2]], &[0.5], &rx, 0)
            .unwrap();
        assert_eq!(rays.traveltimes, b);
        assert_eq!(rays.paths.len(), 4);
    }

    #[test]
    fn raypath_traveltimes_keep_unreached_sentinel() {
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [5.0, 0.0, 0.0],
            [6.0, 0.0, 0.0],
            [5.0, 1.0, 0.0],
            [5.0, 0.0, 1.0],
        ];
        let mesh = TetMesh::new(points, vec![[0, 1, 2, 3], [4, 5, 6, 7]], &[1.0; 8]).unwrap();
        let rt = Raytracer::new(mesh, 1).unwrap().with_traveltime_from_raypath(true);
        let tt = rt
            .raytrace(&[[0.1, 0.1, 0.1]], &[0.0], &[[5.2, 0.2, 0.2], [1.0, 0.0, 0.0]], 0)
            .unwrap();
        assert_eq!(tt[0], UNREACHED);
        assert!((tt[1] - (0.81f64 + 0.01 + 0.01).sqrt()).abs() < 1e-12);
    }

    /// Rectangle mesh that counts point lookups.
    struct CountingMesh {
        inner: RectMesh2D,
        lookups: AtomicUsize,
    }

    impl Mesh<2> for CountingMesh {
        fn graph(&self) -> &NodeGraph<2> {
            self.inner.graph()
        }

        fn graph_mut(&mut self) -> &mut NodeGraph<2> {
            self.inner.graph_mut()
        }

        fn locate(&self, p: &Point<2>) -> Option<usize> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            self.inner.locate(p)
        }

        fn corner_weights(&self, cell: usize, p: &Point<2>) -> Vec<(usize, f64)> {
            self.inner.corner_weights(cell, p)
        }
    }

    #[test]
    fn each_point_is_located_once_per_call() {
        let inner = tracer([4, 4], [1, 1], 1).into_mesh();
        let mesh = CountingMesh {
            inner,
            lookups: AtomicUsize::new(0),
        };
        let rt = Raytracer::new(mesh, 1).unwrap().with_traveltime_from_raypath(true);
        let sources = [[0.3, 0.6], [4.0, 4.0]];
        let receivers = [[3.7, 1.2], [2.0, 2.0], [1.5, 3.5], [0.5, 0.0]];
        rt.raytrace_with_lengths(&sources, &[0.0, 0.2], &receivers, 0)
            .unwrap();
        assert_eq!(rt.mesh().lookups.load(Ordering::Relaxed), 6);

        let sets = vec![receivers.to_vec(), receivers[..2].to_vec()];
        rt.raytrace_multi(&sources, &[0.0, 0.2], &sets, 0, RayRequest::Traveltimes)
            .unwrap();
        assert_eq!(rt.mesh().lookups.load(Ordering::Relaxed), 6 + 8);
    }

    #[test]
    fn tolerance_must_be_positive() {
        let rt = tracer([1, 1], [0, 0], 1);
        assert!(matches!(
            rt.with_tolerance(0.0),
            Err(RaytraceError::InvalidTolerance(_))
        ));
    }

    #[test]
    fn unreachable_receiver_in_path_mode() {
        // two tetrahedra that share no node
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [5.0, 0.0, 0.0],
            [6.0, 0.0, 0.0],
            [5.0, 1.0, 0.0],
            [5.0, 0.0, 1.0],
        ];
        let mesh = TetMesh::new(points, vec![[0, 1, 2, 3], [4, 5, 6, 7]], &[1.0; 8]).unwrap();
        let rt = Raytracer::new(mesh, 1).unwrap();
        let rx = [[5.2, 0.2, 0.2]];
        let tt = rt.raytrace(&[[0.1, 0.1, 0.1]], &[0.0], &rx, 0).unwrap();
        assert_eq!(tt[0], UNREACHED);
        let field = rt.node_traveltimes(0).unwrap();
        assert!(field[..4].iter().all(|t| t.is_finite() && *t >= 0.0));
        assert!(field[4..].iter().all(|&t| t == UNREACHED));
        assert!(matches!(
            rt.raytrace_with_paths(&[[0.1, 0.1, 0.1]], &[0.0], &rx, 0),
            Err(RaytraceError::UnreachableReceiver { index: 0 })
        ));
    }

    #[test]
    fn batch_matches_sequential() {
        let rt = tracer([5, 5], [1, 1], 3);
        let receivers = vec![[5.0, 5.0], [0.0, 5.0], [2.5, 2.5]];
        let shots: Vec<Shot<2>> = (0..7)
            .map(|k| Shot::point_source([0.7 * k as f64, 0.3 * k as f64], receivers.clone()))
            .collect();
        let batch = rt.raytrace_batch_with_lengths(&shots).unwrap();
        assert_eq!(batch.len(), shots.len());
        for (shot, rays) in shots.iter().zip(&batch) {
            let seq = rt
                .raytrace_with_lengths(&shot.sources, &shot.times, &shot.receivers, 0)
                .unwrap();
            assert_eq!(&seq, rays);
        }
        let tt = rt.raytrace_batch(&shots).unwrap();
        assert_eq!(tt[3], batch[3].traveltimes);
    }

    #[test]
    fn batch_reports_first_failing_shot() {
        let rt = tracer([2, 2], [0, 0], 2);
        let shots = vec![
            Shot::point_source([0.0, 0.0], vec![[1.0, 1.0]]),
            Shot::point_source([9.0, 0.0], vec![[1.0, 1.0]]),
        ];
        assert!(matches!(
            rt.raytrace_batch(&shots),
            Err(RaytraceError::OutsideDomain { role: PointRole::Source, .. })
        ));
        assert!(rt.raytrace_batch(&[]).unwrap().is_empty());
    }
}
