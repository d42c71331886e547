// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use crate::core::{SemblanceVolume, Vec3};
use crate::error::{InversionError, Result};
use crate::request::{GridRange, InversionRequest, InversionResponse};

/// MAT variable holding the N×3 scan positions.
pub const MAT_SCAN_PTS: &str = "scan_pts";
/// MAT variable holding the N scan values.
pub const MAT_SCAN_VALS: &str = "scan_vals";
/// MAT variable used when saving a semblance volume.
pub const MAT_VOLUME: &str = "pt_cloud";

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// NumPy .npy format.
    Npy,
    /// JSON (request or response body).
    Json,
    /// MATLAB .mat format (Level 5).
    Mat,
}

/// Infer file format from extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(FileFormat::Npy),
        Some("json") => Ok(FileFormat::Json),
        Some("mat") => Ok(FileFormat::Mat),
        Some(ext) => Err(InversionError::UnsupportedFileFormat(ext.to_string())),
        None => Err(InversionError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

/// Read an inversion request from a JSON file.
pub fn load_request_json(path: &Path) -> Result<InversionRequest> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write an inversion request as JSON.
pub fn save_request_json(request: &InversionRequest, path: &Path) -> Result<()> {
    let mut w = BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer(&mut w, request)?;
    w.flush()?;
    Ok(())
}

/// Load a survey from a file, inferring format from extension. MAT surveys
/// carry no grid range, so one is derived from the scan points.
pub fn load_survey(path: &Path, z_range: Option<(i64, i64)>) -> Result<InversionRequest> {
    match infer_format(path)? {
        FileFormat::Json => {
            let mut request = load_request_json(path)?;
            if let Some((z_min, z_max)) = z_range {
                request.z_min = z_min;
                request.z_max = z_max;
            }
            Ok(request)
        }
        FileFormat::Mat => {
            let (z_min, z_max) = z_range.ok_or_else(|| {
                InversionError::Other("a z range is required for MAT surveys".to_string())
            })?;
            load_mat_survey(path, z_min, z_max)
        }
        FileFormat::Npy => Err(InversionError::UnsupportedFileFormat(
            "npy (surveys are read from .json or .mat)".to_string(),
        )),
    }
}

/// Load a survey from a .mat file with `scan_pts` (N×3) and `scan_vals`
/// (N elements).
pub fn load_mat_survey(path: &Path, z_min: i64, z_max: i64) -> Result<InversionRequest> {
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mat = matfile::MatFile::parse(&mut reader)
        .map_err(|e| InversionError::Other(format!("MAT parse error: {}", e)))?;

    let (pts_shape, pts_data) = read_mat_variable(&mat, MAT_SCAN_PTS)?;
    let (_, scan_vals) = read_mat_variable(&mat, MAT_SCAN_VALS)?;

    let scan_pts = relayout_points(&pts_shape, &pts_data)?;
    if scan_pts.len() != scan_vals.len() {
        return Err(InversionError::InputShapeMismatch {
            what: "scan data",
            detail: format!(
                "{} points but {} values",
                scan_pts.len(),
                scan_vals.len()
            ),
        });
    }

    Ok(InversionRequest {
        grid_range: GridRange::covering(&scan_pts)?,
        scan_pts,
        scan_vals,
        z_min,
        z_max,
    })
}

fn read_mat_variable(mat: &matfile::MatFile, name: &str) -> Result<(Vec<usize>, Vec<f64>)> {
    let array = mat
        .find_by_name(name)
        .ok_or_else(|| InversionError::MatVariableNotFound {
            expected: name.to_string(),
            available: mat.arrays().iter().map(|a| a.name().to_string()).collect(),
        })?;

    let data = match array.data() {
        matfile::NumericData::Double { real, imag: _ } => real.clone(),
        matfile::NumericData::Single { real, imag: _ } => real.iter().map(|&v| v as f64).collect(),
        _ => {
            return Err(InversionError::UnsupportedDtype(format!(
                "MAT variable '{}' is not f64 or f32",
                name
            )))
        }
    };
    Ok((array.size().to_vec(), data))
}

// MAT data is column-major. Accept N×3 or its transpose 3×N.
fn relayout_points(mat_shape: &[usize], data: &[f64]) -> Result<Vec<Vec3>> {
    let n = data.len() / 3;
    let mismatch = || InversionError::ShapeMismatch {
        expected: vec![n, 3],
        got: mat_shape.to_vec(),
    };
    if mat_shape.len() != 2 || data.len() % 3 != 0 {
        return Err(mismatch());
    }

    let rows_are_points = mat_shape == [n, 3];
    if !rows_are_points && mat_shape != [3, n] {
        return Err(mismatch());
    }

    let arr = ArrayD::from_shape_vec(IxDyn(mat_shape).f(), data.to_vec())
        .map_err(|e| InversionError::Other(format!("shape error: {}", e)))?;
    let arr = if rows_are_points { arr } else { arr.reversed_axes() };

    let row_major = arr.as_standard_layout().to_owned().into_raw_vec();
    Ok(row_major
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect())
}

/// Save a semblance volume to a .npy file. Invalid voxels are stored as NaN.
pub fn save_npy(volume: &SemblanceVolume, path: &Path) -> Result<()> {
    let arr = volume.to_array()?;
    ndarray_npy::write_npy(path, &arr)
        .map_err(|e| InversionError::Other(format!("npy write error: {}", e)))?;
    Ok(())
}

/// Load a semblance volume from a .npy file.
pub fn load_npy_volume(path: &Path) -> Result<SemblanceVolume> {
    let arr: ArrayD<f64> = match ndarray_npy::read_npy(path) {
        Ok(a) => a,
        Err(_) => {
            let arr32: ArrayD<f32> = ndarray_npy::read_npy(path)
                .map_err(|e| InversionError::UnsupportedDtype(format!("{}", e)))?;
            arr32.mapv(|v| v as f64)
        }
    };

    let shape: [usize; 3] = arr
        .shape()
        .try_into()
        .map_err(|_| InversionError::ShapeMismatch {
            expected: vec![0, 0, 0],
            got: arr.shape().to_vec(),
        })?;

    // Fortran-order files would otherwise yield column-major data.
    let values = arr.as_standard_layout().to_owned().into_raw_vec();
    SemblanceVolume::from_values(shape, values)
}

/// Write the inversion response body (`{"pt_cloud": …}`).
pub fn save_json_response(volume: &SemblanceVolume, path: &Path) -> Result<()> {
    let mut w = BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer(&mut w, &InversionResponse::from(volume))?;
    w.flush()?;
    Ok(())
}

/// Save a semblance volume to a .mat file as variable `pt_cloud`.
pub fn save_mat_volume(volume: &SemblanceVolume, path: &Path) -> Result<()> {
    let arr = volume.to_array()?;
    // Column-major data is the row-major data of the transposed array.
    let data = arr.t().as_standard_layout().to_owned().into_raw_vec();
    write_mat_level5(
        path,
        &[MatVariable {
            name: MAT_VOLUME,
            dims: volume.shape().to_vec(),
            data,
        }],
    )
}

/// Save a survey to a .mat file with variables `scan_pts` and `scan_vals`.
pub fn save_mat_survey(request: &InversionRequest, path: &Path) -> Result<()> {
    let n = request.scan_pts.len();
    let pts_col_major: Vec<f64> = (0..3)
        .flat_map(|c| request.scan_pts.iter().map(move |p| p[c]))
        .collect();
    write_mat_level5(
        path,
        &[
            MatVariable {
                name: MAT_SCAN_PTS,
                dims: vec![n, 3],
                data: pts_col_major,
            },
            MatVariable {
                name: MAT_SCAN_VALS,
                dims: vec![n, 1],
                data: request.scan_vals.clone(),
            },
        ],
    )
}

/// Save a semblance volume, inferring format from extension.
pub fn save_volume(volume: &SemblanceVolume, path: &Path) -> Result<()> {
    match infer_format(path)? {
        FileFormat::Npy => save_npy(volume, path),
        FileFormat::Json => save_json_response(volume, path),
        FileFormat::Mat => save_mat_volume(volume, path),
    }
}

/// Save a survey, inferring format from extension.
pub fn save_survey(request: &InversionRequest, path: &Path) -> Result<()> {
    match infer_format(path)? {
        FileFormat::Json => save_request_json(request, path),
        FileFormat::Mat => save_mat_survey(request, path),
        FileFormat::Npy => Err(InversionError::UnsupportedFileFormat(
            "npy (surveys are written as .json or .mat)".to_string(),
        )),
    }
}

/// A column-major f64 array to store in a MAT file.
struct MatVariable<'a> {
    name: &'a str,
    dims: Vec<usize>,
    data: Vec<f64>,
}

// Level 5 data type and class codes.
const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MX_DOUBLE_CLASS: u32 = 6;

fn padded(len: usize) -> usize {
    len.div_ceil(8) * 8
}

fn write_element<W: Write>(w: &mut W, data_type: u32, bytes: &[u8]) -> Result<()> {
    w.write_all(&data_type.to_le_bytes())?;
    w.write_all(&(bytes.len() as u32).to_le_bytes())?;
    w.write_all(bytes)?;
    w.write_all(&vec![0u8; padded(bytes.len()) - bytes.len()])?;
    Ok(())
}

/// Minimal uncompressed MAT-File Level 5 writer for real f64 arrays. The
/// `matfile` crate only reads.
fn write_mat_level5(path: &Path, variables: &[MatVariable<'_>]) -> Result<()> {
    let mut w = BufWriter::new(std::fs::File::create(path)?);

    // 116 bytes of text, 8 bytes subsystem offset, version, endian marker
    let mut header = [b' '; 116];
    let desc = b"MATLAB 5.0 MAT-file, created by dipole-semblance";
    header[..desc.len()].copy_from_slice(desc);
    w.write_all(&header)?;
    w.write_all(&[0u8; 8])?;
    w.write_all(&0x0100u16.to_le_bytes())?;
    w.write_all(b"IM")?;

    for var in variables {
        let flags: Vec<u8> = [MX_DOUBLE_CLASS, 0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let dims: Vec<u8> = var
            .dims
            .iter()
            .flat_map(|&d| (d as i32).to_le_bytes())
            .collect();
        let real: Vec<u8> = var.data.iter().flat_map(|v| v.to_le_bytes()).collect();

        let body_len: usize = [flags.len(), dims.len(), var.name.len(), real.len()]
            .iter()
            .map(|&len| 8 + padded(len))
            .sum();

        w.write_all(&MI_MATRIX.to_le_bytes())?;
        w.write_all(&(body_len as u32).to_le_bytes())?;
        write_element(&mut w, MI_UINT32, &flags)?;
        write_element(&mut w, MI_INT32, &dims)?;
        write_element(&mut w, MI_INT8, var.name.as_bytes())?;
        write_element(&mut w, MI_DOUBLE, &real)?;
    }

    w.flush()?;
    Ok(())
}
