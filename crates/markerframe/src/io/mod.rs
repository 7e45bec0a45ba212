//! File formats: NumPy arrays, calibration artifacts, point artifacts.

pub mod artifact;
pub mod calibration;
pub mod npy;

pub use artifact::{read_points, write_points, ArtifactError};
pub use calibration::{load_calibration, save_calibration_json, CalibrationError};
pub use npy::{
    read_npy, read_npy_file, write_npy_f64, write_npy_f64_file, NpyArray, NpyData, NpyError,
};
