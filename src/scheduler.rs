// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::core::{Rotation, ScanData, SearchGrid, SemblanceVolume, Vec3, EARTH_FIELD_AXIS};
use crate::error::{InversionError, Result};
use crate::kernels::{evaluate_voxel, score_samples, Normalization, ObservedBounds};

/// Progress information passed to the optional callback.
pub struct ProgressInfo {
    /// Number of voxels scored so far.
    pub voxels_processed: u64,
    /// Total number of voxels in the search grid.
    pub total_voxels: u64,
    /// Elapsed time since the run started.
    pub elapsed: Duration,
}

/// How voxels are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// One control flow visiting voxels in row-major `(ix, iy, iz)` order.
    #[default]
    Sequential,
    /// One rayon task per launch-grid cell, each with its own sample buffer.
    DataParallel,
}

/// Why a voxel could not be scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A scan point coincides with the voxel location.
    DegenerateGeometry,
    /// The simulated or observed range has zero width.
    NormalizationDegenerate,
}

/// A voxel whose output cell was set to `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelFault {
    /// Voxel index.
    pub index: [usize; 3],
    /// Fault category.
    pub kind: FaultKind,
}

impl VoxelFault {
    fn from_error(index: [usize; 3], err: &InversionError) -> Self {
        let kind = match err {
            InversionError::DegenerateGeometry { .. } => FaultKind::DegenerateGeometry,
            _ => FaultKind::NormalizationDegenerate,
        };
        VoxelFault { index, kind }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Strategy used.
    pub strategy: Strategy,
    /// Normalization applied to simulated samples.
    pub normalization: Normalization,
    /// Number of scan samples per voxel.
    pub num_samples: usize,
    /// Voxels that could not be scored, ordered by flat index.
    pub faults: Vec<VoxelFault>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Output of [`SemblanceSolver::solve`].
#[derive(Debug, Clone)]
pub struct Inversion {
    /// One semblance score per voxel; faulted voxels hold `NaN`.
    pub volume: SemblanceVolume,
    /// Run summary, including every faulted voxel.
    pub report: RunReport,
}

/// Data-parallel launch grid: the search grid shape rounded up to a multiple
/// of the block size on each axis. Cells outside the search grid do nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGrid {
    dims: [usize; 3],
}

impl LaunchGrid {
    /// Smallest block-aligned launch grid covering `shape`.
    #[allow(clippy::needless_range_loop)]
    pub fn covering(shape: [usize; 3], block: [usize; 3]) -> Self {
        let mut dims = [0usize; 3];
        for d in 0..3 {
            dims[d] = shape[d].div_ceil(block[d]) * block[d];
        }
        LaunchGrid { dims }
    }

    /// Launch dimensions.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Number of execution units.
    pub fn num_units(&self) -> usize {
        self.dims.iter().product()
    }

    /// Voxel index assigned to a unit.
    pub fn unit_to_nd(&self, unit: usize) -> [usize; 3] {
        let plane = self.dims[1] * self.dims[2];
        [
            unit / plane,
            (unit % plane) / self.dims[2],
            unit % self.dims[2],
        ]
    }
}

/// Scores every voxel of a search grid against an observed survey.
///
/// For each candidate voxel the dipole forward model is evaluated at every
/// scan point, the simulated curve is normalized, and its semblance with the
/// observed curve is written to the output volume. Voxels are independent.
pub struct SemblanceSolver {
    grid: SearchGrid,
    scan: ScanData,
    axis: Vec3,
    observed: ObservedBounds,
    strategy: Strategy,
    normalization: Normalization,
    rotation: Option<Rotation>,
    num_threads: Option<usize>,
    launch_block: [usize; 3],
    progress_interval: Duration,
    progress_callback: Option<Box<dyn Fn(ProgressInfo) + Send + Sync>>,
}

impl SemblanceSolver {
    /// Create a solver for the given grid and survey.
    ///
    /// Uses the earth-field axis, the survey's mean/max as observed bounds,
    /// min-max normalization and the sequential strategy.
    pub fn new(grid: SearchGrid, scan: ScanData) -> Self {
        let observed = ObservedBounds::from_scan(&scan);
        SemblanceSolver {
            grid,
            scan,
            axis: EARTH_FIELD_AXIS,
            observed,
            strategy: Strategy::Sequential,
            normalization: Normalization::MinMax,
            rotation: None,
            num_threads: None,
            launch_block: [1, 1, 1],
            progress_interval: Duration::from_millis(500),
            progress_callback: None,
        }
    }

    /// Set the execution strategy (builder method).
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the simulated-sample normalization (builder method).
    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Rotate candidate positions about a center before evaluation (builder
    /// method). Only the sequential strategy applies a rotation.
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// Override the dipole moment orientation (builder method).
    pub fn with_axis(mut self, axis: Vec3) -> Self {
        self.axis = axis;
        self
    }

    /// Override the observed normalization bounds (builder method).
    pub fn with_observed_bounds(mut self, observed: ObservedBounds) -> Self {
        self.observed = observed;
        self
    }

    /// Set the number of worker threads for the data-parallel strategy
    /// (builder method). Defaults to the number of available CPU cores.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Round the data-parallel launch grid up to a multiple of `block`
    /// (builder method). Default is `[1, 1, 1]`.
    ///
    /// # Errors
    /// Returns an error if any block size is zero.
    pub fn with_launch_block(mut self, block: [usize; 3]) -> Result<Self> {
        if let Some(axis) = block.iter().position(|&b| b == 0) {
            return Err(InversionError::InvalidLaunchBlock { axis, block: 0 });
        }
        self.launch_block = block;
        Ok(self)
    }

    /// Set a progress callback (builder method), invoked at most once per
    /// `interval` while solving.
    pub fn with_progress(
        mut self,
        interval: Duration,
        callback: Box<dyn Fn(ProgressInfo) + Send + Sync>,
    ) -> Self {
        self.progress_interval = interval;
        self.progress_callback = Some(callback);
        self
    }

    /// The search grid.
    pub fn grid(&self) -> &SearchGrid {
        &self.grid
    }

    /// The survey being matched.
    pub fn scan(&self) -> &ScanData {
        &self.scan
    }

    /// Observed normalization bounds in effect.
    pub fn observed_bounds(&self) -> ObservedBounds {
        self.observed
    }

    /// The data-parallel launch grid for the current configuration.
    pub fn launch_grid(&self) -> LaunchGrid {
        LaunchGrid::covering(self.grid.shape(), self.launch_block)
    }

    fn get_num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    fn voxel_location(&self, idx: [usize; 3]) -> Vec3 {
        let loc = self.grid.location(idx);
        match &self.rotation {
            Some(rot) => rot.apply(loc),
            None => loc,
        }
    }

    fn score_into(&self, idx: [usize; 3], buffer: &mut Vec<f64>) -> Result<f64> {
        evaluate_voxel(
            self.voxel_location(idx),
            self.scan.points(),
            self.axis,
            buffer,
        )?;
        score_samples(buffer, self.normalization, self.scan.values(), self.observed)
    }

    /// Score a single voxel, surfacing per-voxel errors directly.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` for an out-of-range index, `DegenerateGeometry`
    /// or `NormalizationDegenerate` when the voxel cannot be scored.
    pub fn score_voxel(&self, idx: [usize; 3]) -> Result<f64> {
        if !self.grid.contains(idx) {
            return Err(InversionError::ShapeMismatch {
                expected: self.grid.shape().to_vec(),
                got: idx.to_vec(),
            });
        }
        let mut buffer = Vec::with_capacity(self.scan.len());
        self.score_into(idx, &mut buffer)
    }

    /// Score every voxel with the configured strategy.
    ///
    /// Voxels that cannot be scored are set to `NaN` and listed in the report;
    /// they never abort the run.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid (rotation with the
    /// data-parallel strategy, zero threads) or the thread pool cannot be built.
    pub fn solve(&self) -> Result<Inversion> {
        if self.strategy == Strategy::DataParallel && self.rotation.is_some_and(|r| r.angle != 0.0) {
            return Err(InversionError::RotationUnsupported);
        }
        if self.num_threads == Some(0) {
            return Err(InversionError::InvalidThreadCount(0));
        }

        let shape = self.grid.shape();
        info!(
            shape = ?shape,
            samples = self.scan.len(),
            strategy = ?self.strategy,
            normalization = ?self.normalization,
            "starting semblance run"
        );
        debug!(
            observed_min = self.observed.min,
            observed_max = self.observed.max,
            axis = ?self.axis,
            "observed normalization bounds"
        );

        let start_time = Instant::now();
        let progress = ProgressTracker::new(self, start_time);
        let mut volume = SemblanceVolume::zeros(shape);
        let faults = match self.strategy {
            Strategy::Sequential => self.run_sequential(&mut volume, &progress),
            Strategy::DataParallel => self.run_data_parallel(&mut volume, &progress)?,
        };
        let elapsed = start_time.elapsed();

        if !faults.is_empty() {
            warn!(
                faulted = faults.len(),
                total = self.grid.num_voxels(),
                "some voxels could not be scored and were set to NaN"
            );
        }
        info!(elapsed_ms = elapsed.as_millis() as u64, "semblance run finished");

        Ok(Inversion {
            volume,
            report: RunReport {
                strategy: self.strategy,
                normalization: self.normalization,
                num_samples: self.scan.len(),
                faults,
                elapsed,
            },
        })
    }

    fn run_sequential(
        &self,
        volume: &mut SemblanceVolume,
        progress: &ProgressTracker<'_>,
    ) -> Vec<VoxelFault> {
        let [nx, ny, nz] = volume.shape();
        let mut buffer = Vec::with_capacity(self.scan.len());
        let mut faults = Vec::new();
        let values = volume.values_mut();
        let mut flat = 0;

        for ix in 0..nx {
            for iy in 0..ny {
                for iz in 0..nz {
                    let idx = [ix, iy, iz];
                    values[flat] = match self.score_into(idx, &mut buffer) {
                        Ok(s) => s,
                        Err(e) => {
                            debug!(index = ?idx, error = %e, "voxel faulted");
                            faults.push(VoxelFault::from_error(idx, &e));
                            f64::NAN
                        }
                    };
                    flat += 1;
                    progress.tick();
                }
            }
        }
        faults
    }

    fn run_data_parallel(
        &self,
        volume: &mut SemblanceVolume,
        progress: &ProgressTracker<'_>,
    ) -> Result<Vec<VoxelFault>> {
        let num_threads = self.get_num_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| InversionError::Other(e.to_string()))?;

        let launch = self.launch_grid();
        let num_samples = self.scan.len();
        let fault_queue = SegQueue::new();
        debug!(
            launch = ?launch.dims(),
            threads = num_threads,
            "launching data-parallel scoring"
        );

        let cells: Vec<Option<(usize, f64)>> = pool.install(|| {
            (0..launch.num_units())
                .into_par_iter()
                .map_init(
                    || Vec::with_capacity(num_samples),
                    |buffer, unit| {
                        let idx = launch.unit_to_nd(unit);
                        if !self.grid.contains(idx) {
                            return None;
                        }
                        let value = match self.score_into(idx, buffer) {
                            Ok(s) => s,
                            Err(e) => {
                                debug!(index = ?idx, error = %e, "voxel faulted");
                                fault_queue.push(VoxelFault::from_error(idx, &e));
                                f64::NAN
                            }
                        };
                        progress.tick();
                        Some((volume_flat(self.grid.shape(), idx), value))
                    },
                )
                .collect()
        });

        let values = volume.values_mut();
        for (flat, value) in cells.into_iter().flatten() {
            values[flat] = value;
        }

        let mut faults: Vec<VoxelFault> = std::iter::from_fn(|| fault_queue.pop()).collect();
        faults.sort_by_key(|f| volume_flat(self.grid.shape(), f.index));
        Ok(faults)
    }
}

fn volume_flat(shape: [usize; 3], idx: [usize; 3]) -> usize {
    (idx[0] * shape[1] + idx[1]) * shape[2] + idx[2]
}

struct ProgressTracker<'a> {
    callback: Option<&'a (dyn Fn(ProgressInfo) + Send + Sync)>,
    interval_ms: u64,
    total: u64,
    processed: AtomicU64,
    last_report: AtomicU64,
    start_time: Instant,
}

impl<'a> ProgressTracker<'a> {
    fn new(solver: &'a SemblanceSolver, start_time: Instant) -> Self {
        ProgressTracker {
            callback: solver.progress_callback.as_deref(),
            interval_ms: solver.progress_interval.as_millis() as u64,
            total: solver.grid.num_voxels() as u64,
            processed: AtomicU64::new(0),
            last_report: AtomicU64::new(0),
            start_time,
        }
    }

    fn tick(&self) {
        let Some(cb) = self.callback else {
            return;
        };
        let done = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        let elapsed_ms = self.start_time.elapsed().as_millis() as u64;
        let last = self.last_report.load(Ordering::Relaxed);
        // The unit that completes the grid always reports.
        let report = done == self.total
            || (elapsed_ms >= last + self.interval_ms
                && self
                    .last_report
                    .compare_exchange(last, elapsed_ms, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok());
        if report {
            cb(ProgressInfo {
                voxels_processed: done,
                total_voxels: self.total,
                elapsed: self.start_time.elapsed(),
            });
        }
    }
}
