//! Camera calibration artifacts: NumPy `.npz` archives or JSON.
//!
//! An `.npz` archive must hold `K.npy` (3x3) and `D.npy` (any shape, flattened
//! to the OpenCV distortion vector). Members may be stored (`numpy.savez`) or
//! deflated (`numpy.savez_compressed`).
//!
//! The JSON form is `{ "K": [[fx, 0, cx], [0, fy, cy], [0, 0, 1]], "D": [k1, k2, p1, p2, k3] }`;
//! `D` may also be nested one level, as OpenCV dumps it.

use super::npy::{read_npy, NpyArray, NpyError};
use markerframe_core::{CameraError, CameraModel};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("failed to read calibration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to open calibration archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("bad array in calibration archive: {0}")]
    Npy(#[from] NpyError),
    #[error("failed to parse calibration JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("calibration archive has no '{0}' array")]
    MissingArray(&'static str),
    #[error("calibration matrix K has shape {0:?}, expected 3x3")]
    BadShape(Vec<usize>),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("unsupported calibration file extension: {0}")]
    UnsupportedExtension(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JsonDistortion {
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

#[derive(Serialize, Deserialize)]
struct JsonCalibration {
    #[serde(rename = "K")]
    k: Vec<Vec<f64>>,
    #[serde(rename = "D", default = "no_distortion")]
    d: JsonDistortion,
}

fn no_distortion() -> JsonDistortion {
    JsonDistortion::Flat(Vec::new())
}

impl JsonDistortion {
    fn flatten(self) -> Vec<f64> {
        match self {
            JsonDistortion::Flat(v) => v,
            JsonDistortion::Nested(rows) => rows.into_iter().flatten().collect(),
        }
    }
}

/// Load a camera model, picking the format from the file extension.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))
)]
pub fn load_calibration(path: impl AsRef<Path>) -> Result<CameraModel, CalibrationError> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let camera = match ext.as_str() {
        "npz" => read_npz_calibration(BufReader::new(File::open(path)?))?,
        "json" => calibration_from_json(&std::fs::read_to_string(path)?)?,
        _ => return Err(CalibrationError::UnsupportedExtension(ext)),
    };
    log::info!(
        "camera: fx={:.3} fy={:.3} cx={:.3} cy={:.3} D={:?}",
        camera.fx(),
        camera.fy(),
        camera.cx(),
        camera.cy(),
        camera.distortion.to_vec()
    );
    Ok(camera)
}

fn npz_member<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &'static str,
) -> Result<NpyArray, CalibrationError> {
    let member = archive
        .by_name(&format!("{name}.npy"))
        .map_err(|e| match e {
            zip::result::ZipError::FileNotFound => CalibrationError::MissingArray(name),
            other => CalibrationError::Zip(other),
        })?;
    Ok(read_npy(member)?)
}

/// Read `K` and `D` from an `.npz` stream.
pub fn read_npz_calibration<R: Read + Seek>(reader: R) -> Result<CameraModel, CalibrationError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let k = npz_member(&mut archive, "K")?;
    if k.shape != [3, 3] {
        return Err(CalibrationError::BadShape(k.shape));
    }
    let d = npz_member(&mut archive, "D")?;
    Ok(CameraModel::from_raw(&k.to_f64(), &d.to_f64())?)
}

pub fn calibration_from_json(raw: &str) -> Result<CameraModel, CalibrationError> {
    let parsed: JsonCalibration = serde_json::from_str(raw)?;
    if parsed.k.len() != 3 || parsed.k.iter().any(|row| row.len() != 3) {
        let shape = vec![parsed.k.len(), parsed.k.first().map_or(0, Vec::len)];
        return Err(CalibrationError::BadShape(shape));
    }
    let k: Vec<f64> = parsed.k.into_iter().flatten().collect();
    Ok(CameraModel::from_raw(&k, &parsed.d.flatten())?)
}

/// Write a camera model in the JSON calibration form.
pub fn save_calibration_json(
    path: impl AsRef<Path>,
    camera: &CameraModel,
) -> Result<(), CalibrationError> {
    let k = (0..3)
        .map(|r| (0..3).map(|c| camera.k[(r, c)]).collect())
        .collect();
    let doc = JsonCalibration {
        k,
        d: JsonDistortion::Flat(camera.distortion.to_vec()),
    };
    std::fs::write(path, serde_json::to_string_pretty(&doc)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::npy::write_npy_f64;
    use std::io::{Cursor, Write};

    fn npz_with(members: &[(&str, &[usize], &[f64])]) -> Vec<u8> {
        npz_compressed_with(zip::CompressionMethod::Stored, members)
    }

    fn npz_compressed_with(
        method: zip::CompressionMethod,
        members: &[(&str, &[usize], &[f64])],
    ) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default().compression_method(method);
        for (name, shape, data) in members {
            let mut buf = Vec::new();
            write_npy_f64(&mut buf, shape, data).expect("npy");
            zip.start_file(*name, opts).expect("start");
            zip.write_all(&buf).expect("write");
        }
        zip.finish().expect("finish").into_inner()
    }

    const K: [f64; 9] = [800.0, 0.0, 320.0, 0.0, 790.0, 240.0, 0.0, 0.0, 1.0];

    #[test]
    fn reads_k_and_row_vector_d_from_npz() {
        let d = [0.1, -0.05, 0.001, 0.002, 0.01];
        let bytes = npz_with(&[
            ("K.npy", &[3, 3][..], &K[..]),
            ("D.npy", &[1, 5][..], &d[..]),
        ]);
        let cam = read_npz_calibration(Cursor::new(bytes)).expect("calibration");
        assert_eq!(cam.fx(), 800.0);
        assert_eq!(cam.fy(), 790.0);
        assert_eq!(cam.cx(), 320.0);
        assert_eq!(cam.distortion.k1, 0.1);
        assert_eq!(cam.distortion.k3, 0.01);
    }

    #[test]
    fn reads_savez_compressed_archives() {
        let d = [0.0, 0.0, 0.0, 0.0, -0.02];
        let bytes = npz_compressed_with(
            zip::CompressionMethod::Deflated,
            &[("K.npy", &[3, 3][..], &K[..]), ("D.npy", &[5][..], &d[..])],
        );
        let cam = read_npz_calibration(Cursor::new(bytes)).expect("calibration");
        assert_eq!(cam.fy(), 790.0);
        assert_eq!(cam.distortion.k3, -0.02);
    }

    #[test]
    fn missing_distortion_array_is_named() {
        let bytes = npz_with(&[("K.npy", &[3, 3][..], &K[..])]);
        let err = read_npz_calibration(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, CalibrationError::MissingArray("D")));
    }

    #[test]
    fn json_accepts_flat_and_nested_distortion() {
        let flat = r#"{ "K": [[600, 0, 320], [0, 600, 240], [0, 0, 1]], "D": [0, 0, 0, 0, 0] }"#;
        let nested = r#"{ "K": [[600, 0, 320], [0, 600, 240], [0, 0, 1]], "D": [[0.2, 0, 0, 0]] }"#;
        let a = calibration_from_json(flat).expect("flat");
        let b = calibration_from_json(nested).expect("nested");
        assert!(a.distortion.is_zero());
        assert_eq!(b.distortion.k1, 0.2);
        assert_eq!(a.k, b.k);
    }

    #[test]
    fn json_rejects_wrong_matrix_shape() {
        let raw = r#"{ "K": [[600, 0], [0, 600]], "D": [] }"#;
        assert!(matches!(
            calibration_from_json(raw),
            Err(CalibrationError::BadShape(_))
        ));
    }

    #[test]
    fn saved_json_loads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cam.json");
        let cam = CameraModel::from_raw(&K, &[0.1, 0.0, 0.0, 0.0]).expect("camera");
        save_calibration_json(&path, &cam).expect("save");
        assert_eq!(load_calibration(&path).expect("load"), cam);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            load_calibration("calib.yaml"),
            Err(CalibrationError::UnsupportedExtension(e)) if e == "yaml"
        ));
    }
}
