// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors that can occur during inversion setup, I/O, or per-voxel scoring.
#[derive(Debug)]
pub enum InversionError {
    /// Scan point and scan value sequences disagree, are empty, or a search
    /// axis is not strictly increasing.
    InputShapeMismatch {
        /// Which input was malformed.
        what: &'static str,
        /// Human-readable detail.
        detail: String,
    },
    /// A grid axis produces zero candidate positions.
    GridRangeEmpty {
        /// The axis name ("x", "y" or "z").
        axis: &'static str,
    },
    /// An observation point coincides with the candidate source location.
    DegenerateGeometry {
        /// The observation point.
        observation: [f64; 3],
        /// The candidate source location.
        source: [f64; 3],
    },
    /// A simulated or observed value range has zero width.
    NormalizationDegenerate {
        /// Which range collapsed ("simulated" or "observed").
        range: &'static str,
        /// Lower bound of the collapsed range.
        min: f64,
        /// Upper bound of the collapsed range.
        max: f64,
    },
    /// Rotation was requested with a strategy that does not apply it.
    RotationUnsupported,
    /// Worker thread count is zero.
    InvalidThreadCount(usize),
    /// Launch block size is zero on some axis.
    InvalidLaunchBlock {
        /// The axis index.
        axis: usize,
        /// The block size provided.
        block: usize,
    },
    /// A scan path parameter is out of range.
    InvalidScanParameter {
        /// The parameter name.
        name: &'static str,
        /// The value provided.
        value: f64,
    },
    /// Array shape does not match expected shape.
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// Unsupported data type in file.
    UnsupportedDtype(String),
    /// Unsupported file format (unrecognized extension).
    UnsupportedFileFormat(String),
    /// Expected MAT variable not found in file.
    MatVariableNotFound {
        /// The variable name that was requested.
        expected: String,
        /// The variable names that are available.
        available: Vec<String>,
    },
    /// JSON encoding or decoding failed.
    Json(serde_json::Error),
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl fmt::Display for InversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InversionError::InputShapeMismatch { what, detail } => {
                write!(f, "input shape mismatch in {}: {}", what, detail)
            }
            InversionError::GridRangeEmpty { axis } => {
                write!(f, "grid range is empty: axis {} has no positions", axis)
            }
            InversionError::DegenerateGeometry {
                observation,
                source,
            } => {
                write!(
                    f,
                    "degenerate geometry: observation point {:?} coincides with source at {:?}",
                    observation, source
                )
            }
            InversionError::NormalizationDegenerate { range, min, max } => {
                write!(
                    f,
                    "degenerate normalization: {} range [{}, {}] has zero width",
                    range, min, max
                )
            }
            InversionError::RotationUnsupported => {
                write!(f, "rotation is only supported by the sequential strategy")
            }
            InversionError::InvalidThreadCount(n) => {
                write!(f, "invalid thread count: {} (must be >= 1)", n)
            }
            InversionError::InvalidLaunchBlock { axis, block } => {
                write!(
                    f,
                    "invalid launch block: axis {} has block size {} (must be >= 1)",
                    axis, block
                )
            }
            InversionError::InvalidScanParameter { name, value } => {
                write!(
                    f,
                    "invalid scan parameter: {} = {} (must be positive and finite)",
                    name, value
                )
            }
            InversionError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            InversionError::UnsupportedDtype(dtype) => {
                write!(f, "unsupported dtype: {}", dtype)
            }
            InversionError::UnsupportedFileFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            InversionError::MatVariableNotFound {
                expected,
                available,
            } => {
                write!(
                    f,
                    "MAT variable '{}' not found; available variables: {:?}",
                    expected, available
                )
            }
            InversionError::Json(e) => write!(f, "JSON error: {}", e),
            InversionError::IoError(e) => write!(f, "I/O error: {}", e),
            InversionError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for InversionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InversionError::Json(e) => Some(e),
            InversionError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for InversionError {
    fn from(e: std::io::Error) -> Self {
        InversionError::IoError(e)
    }
}

impl From<serde_json::Error> for InversionError {
    fn from(e: serde_json::Error) -> Self {
        InversionError::Json(e)
    }
}

/// Convenience type alias for Results with InversionError.
pub type Result<T> = std::result::Result<T, InversionError>;
