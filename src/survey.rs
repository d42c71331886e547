// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Synthetic surveys: scan path generators and a scenario of buried dipoles
//! whose combined field is sampled along the path.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::core::{Vec3, EARTH_FIELD_AXIS};
use crate::error::{InversionError, Result};
use crate::kernels::{dipole_field_with_permeability, VACUUM_PERMEABILITY};
use crate::request::{GridRange, InversionRequest};

/// Ambient field magnitude added at every scan point, in nanotesla.
pub const BASELINE_FIELD: f64 = 4.5e6;

fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(InversionError::InvalidScanParameter { name, value });
    }
    Ok(())
}

/// Every `(x, y)` pair of the two axes, x-major.
pub fn grid_scan(search_x: &[f64], search_y: &[f64]) -> Vec<[f64; 2]> {
    search_x
        .iter()
        .flat_map(|&x| search_y.iter().map(move |&y| [x, y]))
        .collect()
}

/// Archimedean spiral `r(θ) = line_dist/(2π)·θ` around `center`, sampled at
/// `θ = 0, res, 2·res, …` while `θ < 2π·num_lines`.
pub fn spiral_scan(
    center: [f64; 2],
    line_dist: f64,
    num_lines: usize,
    angle_resolution: f64,
) -> Result<Vec<[f64; 2]>> {
    check_positive("line_dist", line_dist)?;
    check_positive("angle_resolution", angle_resolution)?;

    let end = 2.0 * PI * num_lines as f64;
    let count = (end / angle_resolution).ceil() as usize;
    let growth = line_dist / (2.0 * PI);
    Ok((0..count)
        .map(|i| {
            let theta = i as f64 * angle_resolution;
            let r = growth * theta;
            [center[0] + r * theta.cos(), center[1] + r * theta.sin()]
        })
        .collect())
}

/// Back-and-forth strips starting at the top-left corner `start` and
/// advancing in -y, joined by connector segments at alternating ends.
pub fn strip_scan(
    start: [f64; 2],
    strip_length: f64,
    strips_dist: f64,
    num_strips: usize,
    sample_dist: f64,
) -> Result<Vec<[f64; 2]>> {
    check_positive("strip_length", strip_length)?;
    check_positive("strips_dist", strips_dist)?;
    check_positive("sample_dist", sample_dist)?;
    if num_strips == 0 {
        return Ok(Vec::new());
    }

    let per_strip = (strip_length / sample_dist).ceil() as usize;
    let per_connector = (strips_dist / sample_dist).ceil() as usize;
    let strip_at = |y: f64| -> Vec<[f64; 2]> {
        (0..per_strip)
            .map(|t| [start[0] + t as f64 * sample_dist, y])
            .collect()
    };

    let mut path = strip_at(start[1]);
    let mut prev = path.clone();
    for i in 0..num_strips - 1 {
        // Even connectors leave from the far end, odd ones from the near end.
        let end_pt = if i % 2 == 1 { prev[0] } else { prev[prev.len() - 1] };
        path.extend((1..per_connector).map(|t| [end_pt[0], end_pt[1] - sample_dist * t as f64]));

        let curr = strip_at(start[1] - strips_dist * (i + 1) as f64);
        if i % 2 == 1 {
            path.extend_from_slice(&curr);
        } else {
            path.extend(curr.iter().rev());
        }
        prev = curr;
    }
    Ok(path)
}

/// Caller-assigned identifier of a synthetic source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub u64);

/// A buried dipole aligned with the earth field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DipoleSource {
    /// Horizontal position (x, y).
    pub position: [f64; 2],
    /// z coordinate of the dipole (negative below the survey plane).
    pub depth: f64,
    /// Scalar moment; the moment vector is `moment · (0, 1, -1)`.
    pub moment: f64,
}

impl DipoleSource {
    /// Location of the dipole.
    pub fn location(&self) -> Vec3 {
        [self.position[0], self.position[1], self.depth]
    }

    /// Moment vector.
    pub fn moment_vector(&self) -> Vec3 {
        EARTH_FIELD_AXIS.map(|c| c * self.moment)
    }

    /// Field magnitude this source adds at each scan point.
    pub fn field_at(&self, scan_pts: &[Vec3]) -> Result<Vec<f64>> {
        let loc = self.location();
        let m = self.moment_vector();
        scan_pts
            .iter()
            .map(|&p| dipole_field_with_permeability(p, loc, m, VACUUM_PERMEABILITY))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct SourceEntry {
    source: DipoleSource,
    hidden: bool,
}

/// Scan path plus a set of synthetic sources. The simulated field is the
/// baseline plus the sum of every visible source's field.
#[derive(Debug, Clone)]
pub struct Scenario {
    scan_pts: Vec<Vec3>,
    grid_range: GridRange,
    sources: BTreeMap<SourceId, SourceEntry>,
}

impl Scenario {
    /// Create a scenario over a 2D scan path. Points are placed at height 0
    /// and the grid range pads the path's bounding box by one unit.
    ///
    /// # Errors
    /// Returns `InputShapeMismatch` if the path is empty.
    pub fn new(path: &[[f64; 2]]) -> Result<Self> {
        let scan_pts: Vec<Vec3> = path.iter().map(|p| [p[0], p[1], 0.0]).collect();
        let grid_range = GridRange::covering(&scan_pts)?;
        Ok(Scenario {
            scan_pts,
            grid_range,
            sources: BTreeMap::new(),
        })
    }

    /// Scan points (height 0).
    pub fn scan_pts(&self) -> &[Vec3] {
        &self.scan_pts
    }

    /// Search grid extent covering the scan path.
    pub fn grid_range(&self) -> GridRange {
        self.grid_range
    }

    /// Add or replace a source, returning the one it replaced.
    pub fn add_source(&mut self, id: SourceId, source: DipoleSource) -> Option<DipoleSource> {
        self.sources
            .insert(
                id,
                SourceEntry {
                    source,
                    hidden: false,
                },
            )
            .map(|e| e.source)
    }

    /// Remove a source.
    pub fn remove_source(&mut self, id: SourceId) -> Option<DipoleSource> {
        self.sources.remove(&id).map(|e| e.source)
    }

    /// Replace a source's properties, keeping its visibility. Returns false
    /// if the id is unknown.
    pub fn update_source(&mut self, id: SourceId, source: DipoleSource) -> bool {
        match self.sources.get_mut(&id) {
            Some(entry) => {
                entry.source = source;
                true
            }
            None => false,
        }
    }

    /// Flip a source between hidden and visible, returning the new hidden state.
    pub fn toggle_hidden(&mut self, id: SourceId) -> Option<bool> {
        self.sources.get_mut(&id).map(|entry| {
            entry.hidden = !entry.hidden;
            entry.hidden
        })
    }

    /// Ids of all sources, in ascending order.
    pub fn source_ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.keys().copied()
    }

    /// Simulated field at every scan point.
    ///
    /// # Errors
    /// Returns `DegenerateGeometry` if a visible source sits on a scan point.
    pub fn field(&self) -> Result<Vec<f64>> {
        let mut field = vec![BASELINE_FIELD; self.scan_pts.len()];
        for entry in self.sources.values().filter(|e| !e.hidden) {
            let contribution = entry.source.field_at(&self.scan_pts)?;
            for (f, c) in field.iter_mut().zip(contribution) {
                *f += c;
            }
        }
        Ok(field)
    }

    /// Inversion request for this scenario with depths `z_min..=z_max`.
    pub fn to_request(&self, z_min: i64, z_max: i64) -> Result<InversionRequest> {
        Ok(InversionRequest {
            grid_range: self.grid_range,
            scan_pts: self.scan_pts.clone(),
            scan_vals: self.field()?,
            z_min,
            z_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_scan_is_x_major() {
        let pts = grid_scan(&[0.0, 1.0], &[5.0, 6.0, 7.0]);
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[0], [0.0, 5.0]);
        assert_eq!(pts[2], [0.0, 7.0]);
        assert_eq!(pts[3], [1.0, 5.0]);
    }

    #[test]
    fn spiral_radius_grows_linearly() {
        let pts = spiral_scan([1.0, -1.0], 3.0, 2, 0.1).unwrap();
        assert_eq!(pts.len(), (4.0 * PI / 0.1).ceil() as usize);
        assert_eq!(pts[0], [1.0, -1.0]);
        for (i, p) in pts.iter().enumerate() {
            let theta = i as f64 * 0.1;
            let r = ((p[0] - 1.0).powi(2) + (p[1] + 1.0).powi(2)).sqrt();
            assert!((r - 3.0 / (2.0 * PI) * theta).abs() < 1e-9);
        }
    }

    #[test]
    fn spiral_rejects_zero_resolution() {
        assert!(matches!(
            spiral_scan([0.0, 0.0], 1.0, 3, 0.0),
            Err(InversionError::InvalidScanParameter {
                name: "angle_resolution",
                ..
            })
        ));
    }

    #[test]
    fn strip_scan_layout() {
        // 4 samples per strip, 3 connector samples between strips
        let pts = strip_scan([0.0, 0.0], 2.0, 2.0, 3, 0.5).unwrap();
        assert_eq!(pts.len(), 4 + 3 + 4 + 3 + 4);
        assert_eq!(pts[3], [1.5, 0.0]);
        // first connector runs down from the far end
        assert_eq!(pts[4], [1.5, -0.5]);
        assert_eq!(pts[6], [1.5, -1.5]);
        // second strip runs back toward x = 0
        assert_eq!(pts[7], [1.5, -2.0]);
        assert_eq!(pts[10], [0.0, -2.0]);
        // second connector leaves from the near end
        assert_eq!(pts[11], [0.0, -2.5]);
        // third strip runs forward again
        assert_eq!(pts[14], [0.0, -4.0]);
        assert_eq!(pts[17], [1.5, -4.0]);
    }

    #[test]
    fn strip_scan_single_strip() {
        let pts = strip_scan([2.0, 3.0], 1.0, 5.0, 1, 0.25).unwrap();
        assert_eq!(pts.len(), 4);
        assert!(pts.iter().all(|p| p[1] == 3.0));
    }

    #[test]
    fn scenario_grid_range_pads_bounding_box() {
        let scenario = Scenario::new(&[[0.2, -1.5], [4.7, 2.0]]).unwrap();
        assert_eq!(
            scenario.grid_range(),
            GridRange {
                x_min: -1,
                x_max: 6,
                y_min: -3,
                y_max: 3,
            }
        );
        assert!(scenario.scan_pts().iter().all(|p| p[2] == 0.0));
    }

    #[test]
    fn scenario_field_baseline_and_sources() {
        let path = grid_scan(&[0.0, 1.0, 2.0], &[0.0, 1.0]);
        let mut scenario = Scenario::new(&path).unwrap();
        assert!(scenario.field().unwrap().iter().all(|&v| v == BASELINE_FIELD));

        let src = DipoleSource {
            position: [1.0, 0.5],
            depth: -2.0,
            moment: 50.0,
        };
        assert!(scenario.add_source(SourceId(7), src).is_none());
        let expected = src.field_at(scenario.scan_pts()).unwrap();
        let field = scenario.field().unwrap();
        for (f, e) in field.iter().zip(expected.iter()) {
            assert!((f - (BASELINE_FIELD + e)).abs() < 1e-6);
        }

        assert_eq!(scenario.toggle_hidden(SourceId(7)), Some(true));
        assert!(scenario.field().unwrap().iter().all(|&v| v == BASELINE_FIELD));
        assert_eq!(scenario.toggle_hidden(SourceId(7)), Some(false));
        assert_eq!(scenario.toggle_hidden(SourceId(8)), None);

        assert_eq!(scenario.remove_source(SourceId(7)), Some(src));
        assert!(scenario.field().unwrap().iter().all(|&v| v == BASELINE_FIELD));
    }

    #[test]
    fn scenario_update_keeps_id() {
        let mut scenario = Scenario::new(&[[0.0, 0.0], [1.0, 0.0]]).unwrap();
        let src = DipoleSource {
            position: [0.5, 0.0],
            depth: -1.0,
            moment: 1.0,
        };
        scenario.add_source(SourceId(1), src);
        let deeper = DipoleSource { depth: -4.0, ..src };
        assert!(scenario.update_source(SourceId(1), deeper));
        assert!(!scenario.update_source(SourceId(2), deeper));
        assert_eq!(scenario.source_ids().collect::<Vec<_>>(), vec![SourceId(1)]);
    }

    #[test]
    fn scenario_request_shape() {
        let path = grid_scan(&[0.0, 1.0, 2.0, 3.0], &[0.0, 1.0, 2.0]);
        let scenario = Scenario::new(&path).unwrap();
        let req = scenario.to_request(-4, -1).unwrap();
        assert_eq!(req.scan_pts.len(), 12);
        assert_eq!(req.scan_vals.len(), 12);
        assert_eq!(req.search_grid().unwrap().shape(), [5, 4, 4]);
    }

    #[test]
    fn empty_path_rejected() {
        assert!(matches!(
            Scenario::new(&[]),
            Err(InversionError::InputShapeMismatch { .. })
        ));
    }
}
