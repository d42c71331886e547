// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Request/response contract of the inversion service.

use serde::{Deserialize, Serialize};

use crate::core::{ScanData, SearchGrid, SemblanceVolume, Vec3};
use crate::error::{InversionError, Result};
use crate::scheduler::SemblanceSolver;

/// Horizontal extent of the search grid. Upper bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridRange {
    /// First x position.
    pub x_min: i64,
    /// One past the last x position.
    pub x_max: i64,
    /// First y position.
    pub y_min: i64,
    /// One past the last y position.
    pub y_max: i64,
}

impl GridRange {
    /// Horizontal bounding box of `points`, padded by one unit on each side
    /// and widened outward to integers.
    ///
    /// # Errors
    /// Returns `InputShapeMismatch` if `points` is empty.
    pub fn covering(points: &[Vec3]) -> Result<GridRange> {
        if points.is_empty() {
            return Err(InversionError::InputShapeMismatch {
                what: "scan points",
                detail: "no scan points".to_string(),
            });
        }
        let (lo, hi) = points.iter().fold(
            ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]),
            |(lo, hi), p| {
                (
                    [lo[0].min(p[0]), lo[1].min(p[1])],
                    [hi[0].max(p[0]), hi[1].max(p[1])],
                )
            },
        );
        Ok(GridRange {
            x_min: (lo[0] - 1.0).floor() as i64,
            x_max: (hi[0] + 1.0).ceil() as i64,
            y_min: (lo[1] - 1.0).floor() as i64,
            y_max: (hi[1] + 1.0).ceil() as i64,
        })
    }
}

/// An inversion request: survey data plus the candidate search volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InversionRequest {
    /// Horizontal grid extent.
    pub grid_range: GridRange,
    /// Scan positions (x, y, height).
    pub scan_pts: Vec<Vec3>,
    /// Observed field at each scan position.
    pub scan_vals: Vec<f64>,
    /// Lowest candidate z (inclusive).
    pub z_min: i64,
    /// Highest candidate z (inclusive).
    pub z_max: i64,
}

impl InversionRequest {
    /// Search grid derived from the request: `x_min..x_max`, `y_min..y_max`
    /// and `z_min..=z_max` at unit spacing.
    ///
    /// # Errors
    /// Returns `GridRangeEmpty` if any axis range is empty.
    pub fn search_grid(&self) -> Result<SearchGrid> {
        let r = &self.grid_range;
        SearchGrid::from_ranges(r.x_min..r.x_max, r.y_min..r.y_max, self.z_min..=self.z_max)
    }

    /// Build a solver with the service defaults (earth-field axis, mean/max
    /// observed bounds). Shape and range checks run here, before any voxel
    /// is scored.
    pub fn into_solver(self) -> Result<SemblanceSolver> {
        let grid = self.search_grid()?;
        let scan = ScanData::new(self.scan_pts, self.scan_vals)?;
        Ok(SemblanceSolver::new(grid, scan))
    }
}

/// Inversion response: semblance scores nested as `[x][y][z]`. Voxels that
/// could not be scored are `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InversionResponse {
    /// Semblance scores.
    pub pt_cloud: Vec<Vec<Vec<Option<f64>>>>,
}

impl From<&SemblanceVolume> for InversionResponse {
    fn from(volume: &SemblanceVolume) -> Self {
        InversionResponse {
            pt_cloud: volume.to_nested(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "grid_range": {"x_min": -2, "x_max": 3, "y_min": 0, "y_max": 2},
        "scan_pts": [[0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [2.0, 0.5, 0.0]],
        "scan_vals": [4500000.0, 4500010.5, 4500002.0],
        "z_min": -3,
        "z_max": -1
    }"#;

    #[test]
    fn parse_request_json() {
        let req: InversionRequest = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(req.grid_range.x_min, -2);
        assert_eq!(req.scan_pts.len(), 3);
        let grid = req.search_grid().unwrap();
        assert_eq!(grid.shape(), [5, 2, 3]);
        assert_eq!(grid.search_x(), &[-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(grid.search_z(), &[-3.0, -2.0, -1.0]);
    }

    #[test]
    fn single_z_level_is_inclusive() {
        let mut req: InversionRequest = serde_json::from_str(SAMPLE).unwrap();
        req.z_min = -5;
        req.z_max = -5;
        assert_eq!(req.search_grid().unwrap().shape(), [5, 2, 1]);
    }

    #[test]
    fn empty_x_range_rejected() {
        let mut req: InversionRequest = serde_json::from_str(SAMPLE).unwrap();
        req.grid_range.x_max = req.grid_range.x_min;
        assert!(matches!(
            req.into_solver(),
            Err(InversionError::GridRangeEmpty { axis: "x" })
        ));
    }

    #[test]
    fn mismatched_scan_rejected() {
        let mut req: InversionRequest = serde_json::from_str(SAMPLE).unwrap();
        req.scan_vals.pop();
        assert!(matches!(
            req.into_solver(),
            Err(InversionError::InputShapeMismatch { .. })
        ));
    }

    #[test]
    fn covering_range_pads_and_rounds_outward() {
        let range = GridRange::covering(&[[0.5, 2.0, 0.0], [3.25, -1.0, 0.0]]).unwrap();
        assert_eq!(
            range,
            GridRange {
                x_min: -1,
                x_max: 5,
                y_min: -2,
                y_max: 3,
            }
        );
        assert!(GridRange::covering(&[]).is_err());
    }

    #[test]
    fn response_serializes_invalid_as_null() {
        let volume = SemblanceVolume::from_values([1, 2, 1], vec![0.25, f64::NAN]).unwrap();
        let json = serde_json::to_string(&InversionResponse::from(&volume)).unwrap();
        assert_eq!(json, r#"{"pt_cloud":[[[0.25],[null]]]}"#);
    }
}
