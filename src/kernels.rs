// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::f64::consts::PI;

use crate::core::{ScanData, Vec3};
use crate::error::{InversionError, Result};

/// Permeability constant used by the scoring kernel.
pub const KERNEL_PERMEABILITY: f64 = 1.2566e-6;

/// Vacuum permeability used when synthesizing survey data.
pub const VACUUM_PERMEABILITY: f64 = 1.256637e-6;

const NANO: f64 = 1e-9;

/// Field magnitude in nanotesla at `observation` from a dipole of orientation
/// `axis` located at `source`.
///
/// Evaluates the magnetic dipole near-field equation
/// `B = m·1e-9 + μ0/(4π|r|³) · (3n(m·n) − m)` with `r = observation − source`
/// and `n = r/|r|`, and returns `|B|·1e9`. The axis does not need to be unit length.
///
/// # Errors
/// Returns `DegenerateGeometry` if the observation point coincides with the
/// source, or is so close that the field is not representable.
pub fn dipole_field(observation: Vec3, source: Vec3, axis: Vec3) -> Result<f64> {
    dipole_field_with_permeability(observation, source, axis, KERNEL_PERMEABILITY)
}

/// [`dipole_field`] with an explicit permeability constant.
#[allow(clippy::needless_range_loop)]
pub fn dipole_field_with_permeability(
    observation: Vec3,
    source: Vec3,
    axis: Vec3,
    permeability: f64,
) -> Result<f64> {
    let r = [
        observation[0] - source[0],
        observation[1] - source[1],
        observation[2] - source[2],
    ];
    let dist = (r[0] * r[0] + r[1] * r[1] + r[2] * r[2]).sqrt();
    if dist == 0.0 {
        return Err(InversionError::DegenerateGeometry {
            observation,
            source,
        });
    }

    let degenerate = || InversionError::DegenerateGeometry {
        observation,
        source,
    };

    let n = [r[0] / dist, r[1] / dist, r[2] / dist];
    // |r|³ underflows to 0 long before |r| does
    let k = permeability / (4.0 * PI * dist.powi(3));
    if !k.is_finite() {
        return Err(degenerate());
    }
    let proj = axis[0] * n[0] + axis[1] * n[1] + axis[2] * n[2];

    let mut sum_sq = 0.0;
    for d in 0..3 {
        let part = axis[d] * NANO + k * (3.0 * n[d] * proj - axis[d]);
        sum_sq += part * part;
    }
    let magnitude = sum_sq.sqrt() / NANO;
    if !magnitude.is_finite() {
        return Err(degenerate());
    }
    Ok(magnitude)
}

/// Fill `buffer` with the simulated field at every scan point for a source at
/// `location`. The buffer is resized to exactly the number of scan points.
///
/// # Errors
/// Propagates `DegenerateGeometry` from the first coinciding scan point; the
/// buffer contents are unspecified in that case.
pub fn evaluate_voxel(
    location: Vec3,
    scan_pts: &[Vec3],
    axis: Vec3,
    buffer: &mut Vec<f64>,
) -> Result<()> {
    buffer.clear();
    buffer.reserve(scan_pts.len());
    for &p in scan_pts {
        buffer.push(dipole_field(p, location, axis)?);
    }
    Ok(())
}

/// Lower and upper bounds of a simulated sample buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleBounds {
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
}

/// Reduce a sample buffer to its min and max.
///
/// # Errors
/// Returns `NormalizationDegenerate` if the buffer is empty or flat.
pub fn reduce_bounds(samples: &[f64]) -> Result<SampleBounds> {
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if samples.is_empty() || max == min {
        return Err(InversionError::NormalizationDegenerate {
            range: "simulated",
            min,
            max,
        });
    }
    Ok(SampleBounds { min, max })
}

/// Normalization bounds for the observed curve, computed once per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedBounds {
    /// Value mapped to 0.
    pub min: f64,
    /// Value mapped to 1.
    pub max: f64,
}

impl ObservedBounds {
    /// Bounds used by the survey service: the lower bound is the *mean* of
    /// the observed values, the upper bound their maximum.
    pub fn from_scan(scan: &ScanData) -> Self {
        ObservedBounds {
            min: scan.mean_value(),
            max: scan.max_value(),
        }
    }

    /// Check that the bounds are finite and have non-zero width.
    ///
    /// # Errors
    /// Returns `NormalizationDegenerate` if `max == min` or either bound is
    /// not finite.
    pub fn validate(self) -> Result<Self> {
        if self.max == self.min || !self.min.is_finite() || !self.max.is_finite() {
            return Err(InversionError::NormalizationDegenerate {
                range: "observed",
                min: self.min,
                max: self.max,
            });
        }
        Ok(self)
    }

    /// Map an observed value into normalized units.
    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }
}

/// How simulated samples are scaled before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Normalization {
    /// `(s - min) / (max - min)` over the voxel's own samples.
    #[default]
    MinMax,
    /// `s / max` over the voxel's own samples. This is the scaling the
    /// accelerator path of the survey service used; it differs from `MinMax`
    /// and is kept selectable until the owners decide which one is intended.
    PeakOnly,
    /// `(s - min) / (max - min)` with caller-supplied bounds shared by every voxel.
    Fixed(SampleBounds),
}

/// Affine map applied to simulated samples: `(s - offset) / range`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleScale {
    offset: f64,
    range: f64,
}

impl SampleScale {
    /// Scale mapping `bounds.min` to 0 and `bounds.max` to 1.
    ///
    /// # Errors
    /// Returns `NormalizationDegenerate` if the bounds have zero width.
    pub fn from_bounds(bounds: SampleBounds) -> Result<Self> {
        if bounds.max == bounds.min {
            return Err(InversionError::NormalizationDegenerate {
                range: "simulated",
                min: bounds.min,
                max: bounds.max,
            });
        }
        Ok(SampleScale {
            offset: bounds.min,
            range: bounds.max - bounds.min,
        })
    }

    /// Map a simulated sample into normalized units.
    pub fn normalize(&self, sample: f64) -> f64 {
        (sample - self.offset) / self.range
    }
}

impl Normalization {
    /// Derive the sample scale for one voxel's buffer.
    pub fn resolve(&self, samples: &[f64]) -> Result<SampleScale> {
        match *self {
            Normalization::MinMax => SampleScale::from_bounds(reduce_bounds(samples)?),
            Normalization::PeakOnly => {
                let max = samples.iter().copied().fold(0.0_f64, f64::max);
                if max == 0.0 {
                    return Err(InversionError::NormalizationDegenerate {
                        range: "simulated",
                        min: 0.0,
                        max,
                    });
                }
                Ok(SampleScale {
                    offset: 0.0,
                    range: max,
                })
            }
            Normalization::Fixed(bounds) => SampleScale::from_bounds(bounds),
        }
    }
}

/// Semblance between normalized simulated and observed curves:
/// `Σ(a+b)² / (2·(Σa² + Σb²))`, bounded in `[0, 1]`.
///
/// # Errors
/// Returns `InputShapeMismatch` if the curves differ in length, and
/// `NormalizationDegenerate` if the observed bounds have zero width or both
/// normalized curves are all zero.
pub fn semblance(
    samples: &[f64],
    scale: SampleScale,
    scan_vals: &[f64],
    observed: ObservedBounds,
) -> Result<f64> {
    if samples.len() != scan_vals.len() {
        return Err(InversionError::InputShapeMismatch {
            what: "semblance",
            detail: format!(
                "{} simulated samples but {} observed values",
                samples.len(),
                scan_vals.len()
            ),
        });
    }
    let observed = observed.validate()?;

    let mut numerator = 0.0;
    let mut sim_sq = 0.0;
    let mut obs_sq = 0.0;
    for (&sample, &value) in samples.iter().zip(scan_vals.iter()) {
        let a = observed.normalize(value);
        let b = scale.normalize(sample);
        numerator += (a + b) * (a + b);
        sim_sq += b * b;
        obs_sq += a * a;
    }

    let denominator = 2.0 * (sim_sq + obs_sq);
    if denominator == 0.0 {
        return Err(InversionError::NormalizationDegenerate {
            range: "combined",
            min: 0.0,
            max: 0.0,
        });
    }
    Ok(numerator / denominator)
}

/// Reduce and score one voxel's buffer.
pub fn score_samples(
    samples: &[f64],
    normalization: Normalization,
    scan_vals: &[f64],
    observed: ObservedBounds,
) -> Result<f64> {
    let observed = observed.validate()?;
    let scale = normalization.resolve(samples)?;
    semblance(samples, scale, scan_vals, observed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EARTH_FIELD_AXIS;

    #[test]
    fn dipole_field_directly_below() {
        let k = KERNEL_PERMEABILITY / (4.0 * PI);
        // r = (0,0,1), n = (0,0,1), proj = -1, 3n·proj - m = (0, -1, -2)
        let expected = ((1e-9 - k).powi(2) + (-1e-9 - 2.0 * k).powi(2)).sqrt() * 1e9;
        let got = dipole_field([0.0, 0.0, 0.0], [0.0, 0.0, -1.0], EARTH_FIELD_AXIS).unwrap();
        assert!(
            (got - expected).abs() < 1e-9 * expected,
            "got {} expected {}",
            got,
            expected
        );
    }

    #[test]
    fn dipole_field_far_source_tends_to_axis_norm() {
        let got = dipole_field([0.0, 0.0, 0.0], [0.0, 0.0, -1e4], EARTH_FIELD_AXIS).unwrap();
        assert!((got - 2.0_f64.sqrt()).abs() < 1e-6, "got {}", got);
    }

    #[test]
    fn dipole_field_decays_with_distance() {
        let near = dipole_field([0.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 0.0, 1.0]).unwrap();
        let far = dipole_field([0.0, 0.0, 0.0], [0.0, 0.0, -2.0], [0.0, 0.0, 1.0]).unwrap();
        // axis parallel to r: field = 1e-9 + 2k along z, so the excess over 1 scales as 1/r^3
        let ratio = (near - 1.0) / (far - 1.0);
        assert!((ratio - 8.0).abs() < 1e-6, "ratio {}", ratio);
    }

    #[test]
    fn dipole_field_coincident_is_degenerate() {
        let p = [3.0, -2.0, 0.0];
        let result = dipole_field(p, p, EARTH_FIELD_AXIS);
        assert!(matches!(
            result,
            Err(InversionError::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn dipole_field_near_coincident_is_degenerate() {
        // |r|³ underflows while |r| itself is still non-zero
        let result = dipole_field([1e-120, 0.0, -1.0], [0.0, 0.0, -1.0], EARTH_FIELD_AXIS);
        assert!(matches!(
            result,
            Err(InversionError::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn observed_bounds_reject_non_finite() {
        for (min, max) in [(f64::NAN, 5.0), (1.0, f64::INFINITY), (f64::NEG_INFINITY, 2.0)] {
            assert!(matches!(
                ObservedBounds { min, max }.validate(),
                Err(InversionError::NormalizationDegenerate {
                    range: "observed",
                    ..
                })
            ));
        }
        assert!(ObservedBounds { min: 1.0, max: 2.0 }.validate().is_ok());
    }

    #[test]
    fn semblance_rejects_length_mismatch() {
        let scale = SampleScale::from_bounds(SampleBounds { min: 0.0, max: 1.0 }).unwrap();
        let observed = ObservedBounds { min: 0.0, max: 1.0 };
        let result = semblance(&[0.2, 0.4, 0.9], scale, &[0.1, 0.8], observed);
        assert!(matches!(
            result,
            Err(InversionError::InputShapeMismatch { .. })
        ));
    }

    #[test]
    fn permeability_scales_anomaly() {
        let p = [1.0, 2.0, 0.0];
        let s = [0.0, 0.0, -3.0];
        let a =
            dipole_field_with_permeability(p, s, EARTH_FIELD_AXIS, KERNEL_PERMEABILITY).unwrap();
        let b =
            dipole_field_with_permeability(p, s, EARTH_FIELD_AXIS, VACUUM_PERMEABILITY).unwrap();
        assert!(a.is_finite() && b.is_finite());
        assert!((a - b).abs() < 1e-3 * a);
    }

    #[test]
    fn evaluate_voxel_fills_exactly_n() {
        let pts = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let mut buffer = vec![99.0; 10];
        evaluate_voxel([0.0, 0.0, -2.0], &pts, EARTH_FIELD_AXIS, &mut buffer).unwrap();
        assert_eq!(buffer.len(), 3);
        for (i, &p) in pts.iter().enumerate() {
            let expected = dipole_field(p, [0.0, 0.0, -2.0], EARTH_FIELD_AXIS).unwrap();
            assert_eq!(buffer[i], expected);
        }
    }

    #[test]
    fn evaluate_voxel_propagates_degenerate() {
        let pts = vec![[0.0, 0.0, 0.0], [1.0, 0.0, -2.0]];
        let mut buffer = Vec::new();
        let result = evaluate_voxel([1.0, 0.0, -2.0], &pts, EARTH_FIELD_AXIS, &mut buffer);
        assert!(matches!(
            result,
            Err(InversionError::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn reduce_bounds_min_max() {
        let b = reduce_bounds(&[3.0, -1.0, 7.5, 2.0]).unwrap();
        assert_eq!(b, SampleBounds { min: -1.0, max: 7.5 });
    }

    #[test]
    fn reduce_bounds_flat() {
        let result = reduce_bounds(&[4.0, 4.0, 4.0]);
        assert!(matches!(
            result,
            Err(InversionError::NormalizationDegenerate {
                range: "simulated",
                ..
            })
        ));
    }

    #[test]
    fn observed_bounds_use_mean() {
        let scan = ScanData::new(vec![[0.0; 3]; 3], vec![1.0, 2.0, 6.0]).unwrap();
        let b = ObservedBounds::from_scan(&scan);
        assert_eq!(b.min, 3.0);
        assert_eq!(b.max, 6.0);
    }

    #[test]
    fn observed_bounds_flat() {
        let scan = ScanData::new(vec![[0.0; 3]], vec![10.0]).unwrap();
        let observed = ObservedBounds::from_scan(&scan);
        let scale = SampleScale::from_bounds(SampleBounds { min: 0.0, max: 1.0 }).unwrap();
        assert!(matches!(
            semblance(&[0.5], scale, scan.values(), observed),
            Err(InversionError::NormalizationDegenerate {
                range: "observed",
                ..
            })
        ));
    }

    #[test]
    fn single_sample_identity() {
        let scale = SampleScale::from_bounds(SampleBounds {
            min: 0.0,
            max: 10.0,
        })
        .unwrap();
        let observed = ObservedBounds { min: 0.0, max: 10.0 };
        let s = semblance(&[5.0], scale, &[5.0], observed).unwrap();
        assert!((s - 1.0).abs() < 1e-12, "semblance {}", s);
    }

    #[test]
    fn identical_curves_score_one() {
        let samples = [1.0, 3.0, 2.0, 5.0];
        let observed = ObservedBounds { min: 1.0, max: 5.0 };
        let s = score_samples(&samples, Normalization::MinMax, &samples, observed).unwrap();
        assert!((s - 1.0).abs() < 1e-12);
    }

    #[test]
    fn anti_correlated_curves_score_zero() {
        let samples = [0.0, 1.0];
        let scale = SampleScale::from_bounds(SampleBounds { min: 0.0, max: 1.0 }).unwrap();
        let observed = ObservedBounds { min: 0.0, max: 1.0 };
        // a = (0, -1), b = (0, 1)
        let s = semblance(&samples, scale, &[0.0, -1.0], observed).unwrap();
        assert!(s.abs() < 1e-12);
    }

    #[test]
    fn semblance_bounded() {
        let observed = ObservedBounds { min: 2.0, max: 9.0 };
        let vals = [1.0, 9.0, 4.0, 2.5, 7.0];
        for shift in 0..5 {
            let samples: Vec<f64> = (0..5).map(|i| ((i + shift) % 5) as f64 * 1.7 + 0.3).collect();
            for norm in [Normalization::MinMax, Normalization::PeakOnly] {
                let s = score_samples(&samples, norm, &vals, observed).unwrap();
                assert!((0.0..=1.0).contains(&s), "semblance {} out of range", s);
            }
        }
    }

    #[test]
    fn peak_only_scale() {
        let scale = Normalization::PeakOnly.resolve(&[2.0, 4.0, 8.0]).unwrap();
        assert_eq!(scale.normalize(4.0), 0.5);
        assert_eq!(scale.normalize(8.0), 1.0);
    }

    #[test]
    fn peak_only_zero_peak() {
        let result = Normalization::PeakOnly.resolve(&[0.0, 0.0]);
        assert!(matches!(
            result,
            Err(InversionError::NormalizationDegenerate { .. })
        ));
    }

    #[test]
    fn fixed_bounds_ignore_buffer() {
        let norm = Normalization::Fixed(SampleBounds { min: 0.0, max: 4.0 });
        let scale = norm.resolve(&[7.0, 7.0]).unwrap();
        assert_eq!(scale.normalize(2.0), 0.5);
    }

    #[test]
    fn zero_denominator_is_degenerate() {
        let scale = SampleScale::from_bounds(SampleBounds { min: 1.0, max: 2.0 }).unwrap();
        let observed = ObservedBounds { min: 3.0, max: 4.0 };
        let result = semblance(&[1.0], scale, &[3.0], observed);
        assert!(matches!(
            result,
            Err(InversionError::NormalizationDegenerate {
                range: "combined",
                ..
            })
        ));
    }
}
