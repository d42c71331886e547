// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::ops::{Range, RangeInclusive};

use ndarray::Array3;

use crate::error::{InversionError, Result};

/// A point or direction in survey coordinates (x, y, z).
pub type Vec3 = [f64; 3];

/// Approximate direction of the ambient (earth) field, used as the dipole
/// moment orientation. Not unit length.
pub const EARTH_FIELD_AXIS: Vec3 = [0.0, 1.0, -1.0];

/// Measured survey data: scan positions and the observed field at each.
///
/// Positions and values are parallel sequences of the same, non-zero length.
#[derive(Debug, Clone)]
pub struct ScanData {
    points: Vec<Vec3>,
    values: Vec<f64>,
}

impl ScanData {
    /// Create scan data from parallel position and value sequences.
    ///
    /// # Errors
    /// Returns `InputShapeMismatch` if the sequences differ in length, are
    /// empty, or hold a non-finite coordinate or value.
    pub fn new(points: Vec<Vec3>, values: Vec<f64>) -> Result<Self> {
        if points.len() != values.len() {
            return Err(InversionError::InputShapeMismatch {
                what: "scan data",
                detail: format!(
                    "{} scan points but {} scan values",
                    points.len(),
                    values.len()
                ),
            });
        }
        if points.is_empty() {
            return Err(InversionError::InputShapeMismatch {
                what: "scan data",
                detail: "no scan points".to_string(),
            });
        }
        if let Some(i) = points.iter().position(|p| p.iter().any(|c| !c.is_finite())) {
            return Err(InversionError::InputShapeMismatch {
                what: "scan data",
                detail: format!("scan point {} is not finite: {:?}", i, points[i]),
            });
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(InversionError::InputShapeMismatch {
                what: "scan data",
                detail: format!("scan value {} is not finite: {}", i, values[i]),
            });
        }
        Ok(ScanData { points, values })
    }

    /// Number of scan samples (N).
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for constructed scan data; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Scan positions.
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Observed field values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Largest observed value.
    pub fn max_value(&self) -> f64 {
        self.values
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Arithmetic mean of the observed values.
    pub fn mean_value(&self) -> f64 {
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}

/// Candidate source positions: three strictly increasing coordinate axes
/// spanning a voxel lattice of shape `(X, Y, Z)`.
#[derive(Debug, Clone)]
pub struct SearchGrid {
    axes: [Vec<f64>; 3],
}

const AXIS_NAMES: [&str; 3] = ["x", "y", "z"];

impl SearchGrid {
    /// Create a search grid from explicit coordinate sequences.
    ///
    /// # Errors
    /// Returns `GridRangeEmpty` if any axis is empty and `InputShapeMismatch`
    /// if any axis is not strictly increasing.
    pub fn new(search_x: Vec<f64>, search_y: Vec<f64>, search_z: Vec<f64>) -> Result<Self> {
        let axes = [search_x, search_y, search_z];
        for (&name, axis) in AXIS_NAMES.iter().zip(axes.iter()) {
            if axis.is_empty() {
                return Err(InversionError::GridRangeEmpty { axis: name });
            }
            if let Some(pos) = axis.windows(2).position(|w| !(w[1] > w[0])) {
                return Err(InversionError::InputShapeMismatch {
                    what: "search grid",
                    detail: format!(
                        "axis {} is not strictly increasing at position {} ({} then {})",
                        name,
                        pos,
                        axis[pos],
                        axis[pos + 1]
                    ),
                });
            }
        }
        Ok(SearchGrid { axes })
    }

    /// Create a unit-spaced grid from integer ranges. `x` and `y` are
    /// half-open, `z` is inclusive.
    pub fn from_ranges(x: Range<i64>, y: Range<i64>, z: RangeInclusive<i64>) -> Result<Self> {
        SearchGrid::new(
            x.map(|v| v as f64).collect(),
            y.map(|v| v as f64).collect(),
            z.map(|v| v as f64).collect(),
        )
    }

    /// Candidate x coordinates.
    pub fn search_x(&self) -> &[f64] {
        &self.axes[0]
    }

    /// Candidate y coordinates.
    pub fn search_y(&self) -> &[f64] {
        &self.axes[1]
    }

    /// Candidate z coordinates (depths).
    pub fn search_z(&self) -> &[f64] {
        &self.axes[2]
    }

    /// Lattice shape `(X, Y, Z)`.
    pub fn shape(&self) -> [usize; 3] {
        [self.axes[0].len(), self.axes[1].len(), self.axes[2].len()]
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    /// Whether the index lies inside the lattice.
    pub fn contains(&self, idx: [usize; 3]) -> bool {
        idx.iter().zip(self.shape().iter()).all(|(&i, &n)| i < n)
    }

    /// Physical location of a voxel. The index must be in range.
    pub fn location(&self, idx: [usize; 3]) -> Vec3 {
        [
            self.axes[0][idx[0]],
            self.axes[1][idx[1]],
            self.axes[2][idx[2]],
        ]
    }
}

/// In-plane rotation of candidate positions about a center point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    /// Rotation angle in radians.
    pub angle: f64,
    /// Center of rotation (x, y).
    pub center: [f64; 2],
}

impl Rotation {
    /// Rotate the x/y components of `p` about the center; z is untouched.
    /// A zero angle leaves the point exactly as given.
    pub fn apply(&self, p: Vec3) -> Vec3 {
        if self.angle == 0.0 {
            return p;
        }
        let (sin, cos) = self.angle.sin_cos();
        let dx = p[0] - self.center[0];
        let dy = p[1] - self.center[1];
        [
            dx * cos + dy * sin + self.center[0],
            -dx * sin + dy * cos + self.center[1],
            p[2],
        ]
    }
}

/// Output volume of semblance scores, one per voxel, in row-major order.
///
/// Cells that could not be scored hold `NaN`.
#[derive(Debug, Clone)]
pub struct SemblanceVolume {
    shape: [usize; 3],
    strides: [usize; 3],
    values: Box<[f64]>,
}

impl SemblanceVolume {
    /// Allocate a zero-initialized volume of the given shape.
    pub fn zeros(shape: [usize; 3]) -> Self {
        let strides = [shape[1] * shape[2], shape[2], 1];
        let num = shape.iter().product();
        SemblanceVolume {
            shape,
            strides,
            values: vec![0.0; num].into_boxed_slice(),
        }
    }

    /// Wrap existing row-major scores.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the value count does not match the shape.
    pub fn from_values(shape: [usize; 3], values: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(InversionError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![values.len()],
            });
        }
        let mut volume = SemblanceVolume::zeros(shape);
        volume.values = values.into_boxed_slice();
        Ok(volume)
    }

    /// Volume shape `(X, Y, Z)`.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Score at a voxel.
    pub fn get(&self, idx: [usize; 3]) -> f64 {
        self.values[self.nd_to_flat(idx)]
    }

    /// Raw row-major scores.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Convert a flat index to a voxel index.
    #[allow(clippy::needless_range_loop)]
    pub fn flat_to_nd(&self, flat: usize) -> [usize; 3] {
        let mut idx = [0usize; 3];
        let mut remainder = flat;
        for d in 0..3 {
            idx[d] = remainder / self.strides[d];
            remainder %= self.strides[d];
        }
        idx
    }

    /// Convert a voxel index to a flat index.
    pub fn nd_to_flat(&self, idx: [usize; 3]) -> usize {
        idx[0] * self.strides[0] + idx[1] * self.strides[1] + idx[2]
    }

    /// Number of cells holding `NaN`.
    pub fn invalid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    /// The highest-scoring valid voxel, if any.
    pub fn best_voxel(&self) -> Option<([usize; 3], f64)> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(flat, &v)| (self.flat_to_nd(flat), v))
    }

    /// Copy into an owned `ndarray` array.
    pub fn to_array(&self) -> Result<Array3<f64>> {
        Array3::from_shape_vec(
            (self.shape[0], self.shape[1], self.shape[2]),
            self.values.to_vec(),
        )
        .map_err(|e| InversionError::Other(format!("shape error: {}", e)))
    }

    /// Nested `[x][y][z]` representation, with invalid cells as `None`.
    pub fn to_nested(&self) -> Vec<Vec<Vec<Option<f64>>>> {
        let [nx, ny, nz] = self.shape;
        (0..nx)
            .map(|i| {
                (0..ny)
                    .map(|j| {
                        (0..nz)
                            .map(|k| {
                                let v = self.get([i, j, k]);
                                if v.is_nan() {
                                    None
                                } else {
                                    Some(v)
                                }
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }
}
