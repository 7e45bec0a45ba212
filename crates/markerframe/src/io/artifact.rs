//! Stacked point artifacts (`N x 3`, float64) as `.npy` or `.json`.

use super::npy::{read_npy_file, write_npy_f64_file, NpyError};
use nalgebra::Point3;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    #[error("failed to access artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Npy(#[from] NpyError),
    #[error("failed to (de)serialize artifact JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected an N x 3 array, got shape {0:?}")]
    BadShape(Vec<usize>),
    #[error("unsupported artifact extension '{0}' (use .npy or .json)")]
    UnsupportedExtension(String),
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Write points as one row each, format chosen by the file extension.
///
/// An empty point list still produces a valid `(0, 3)` array.
pub fn write_points(path: impl AsRef<Path>, points: &[Point3<f64>]) -> Result<(), ArtifactError> {
    let path = path.as_ref();
    match extension(path).as_str() {
        "npy" => {
            let flat: Vec<f64> = points.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
            write_npy_f64_file(path, &[points.len(), 3], &flat)?;
        }
        "json" => {
            let rows: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
            std::fs::write(path, serde_json::to_string_pretty(&rows)?)?;
        }
        other => return Err(ArtifactError::UnsupportedExtension(other.to_string())),
    }
    log::debug!("wrote {} rows to {}", points.len(), path.display());
    Ok(())
}

/// Read an `N x 3` point array written by [`write_points`] (or NumPy).
pub fn read_points(path: impl AsRef<Path>) -> Result<Vec<Point3<f64>>, ArtifactError> {
    let path = path.as_ref();
    match extension(path).as_str() {
        "npy" => {
            let arr = read_npy_file(path)?;
            let rows = match arr.shape.as_slice() {
                [n, 3] => *n,
                [0] => 0,
                _ => return Err(ArtifactError::BadShape(arr.shape)),
            };
            let flat = arr.to_f64();
            Ok((0..rows)
                .map(|i| Point3::new(flat[3 * i], flat[3 * i + 1], flat[3 * i + 2]))
                .collect())
        }
        "json" => {
            let rows: Vec<[f64; 3]> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            Ok(rows.into_iter().map(Point3::from).collect())
        }
        other => Err(ArtifactError::UnsupportedExtension(other.to_string())),
    }
}
