// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Semblance inversion for locating buried magnetic dipoles.
//!
//! Given field magnitudes measured along a scan path, every voxel of a 3D
//! search grid is treated as a candidate dipole location. The dipole forward
//! model predicts the field at each scan point, and the semblance between the
//! normalized predicted and observed curves scores how well the voxel explains
//! the survey. Voxels are independent and can be scored sequentially or in
//! parallel with identical results.

#![warn(missing_docs)]

/// Survey data, search grids, and the output volume.
pub mod core;
/// Error types for the library.
pub mod error;
/// File I/O for surveys and semblance volumes.
pub mod io;
/// Dipole forward model, normalization, and semblance scoring.
pub mod kernels;
/// Request/response types of the inversion service.
pub mod request;
/// Semblance solver and voxel scheduling strategies.
pub mod scheduler;
/// Synthetic scan paths and source scenarios.
pub mod survey;

pub use crate::core::{Rotation, ScanData, SearchGrid, SemblanceVolume, Vec3};
pub use crate::error::{InversionError, Result};
pub use crate::kernels::{Normalization, ObservedBounds};
pub use crate::request::{GridRange, InversionRequest, InversionResponse};
pub use crate::scheduler::{Inversion, ProgressInfo, RunReport, SemblanceSolver, Strategy};
pub use crate::survey::{DipoleSource, Scenario, SourceId};
