//! Batch fiducial-marker pose estimation and 3D corner reconstruction.
//!
//! The pipeline has three stateless stages, each depending only on the
//! capability traits from [`core`]:
//!
//! 1. [`detect::detect_markers`] runs a [`core::MarkerDetector`] and returns
//!    observations sorted by marker id,
//! 2. [`estimate::PoseEstimator`] solves one (fast) or two (ranked) poses per
//!    observation with a [`core::PoseSolver`],
//! 3. [`reconstruct::CornerReconstructor`] turns poses into camera-frame
//!    corner points.
//!
//! [`batch::run_batch`] drives them over a folder of images and writes one
//! stacked `N x 3` artifact. Besides the pipeline the crate carries the file
//! formats ([`io`]), annotated visualizations ([`vis`]) and a depth image to
//! point cloud converter ([`depth`]).
//!
//! ## Quickstart
//!
//! ```no_run
//! use markerframe::aruco::ArucoDetector;
//! use markerframe::batch::{collect_images, run_batch, BatchConfig};
//! use markerframe::core::SquarePoseSolver;
//! use markerframe::estimate::MarkerSizes;
//! use markerframe::io::load_calibration;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = load_calibration("calib.npz")?;
//! let detector = ArucoDetector::from_config("DICT_4X4_50", None)?;
//! let images = collect_images(Path::new("shots"), "jpg")?;
//! let config = BatchConfig::new(images, MarkerSizes::Shared(0.05), "corners.npy");
//!
//! let report = run_batch(&config, &camera, &detector, &SquarePoseSolver::default())?;
//! println!("{} rows", report.points.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `markerframe::core`: geometry, camera model, capability traits, plane and rigid tools.
//! - `markerframe::aruco`: dictionary decoding and the shipped detector backend.
//! - `markerframe::io`: `.npy`, calibration and point artifacts.

pub use markerframe_aruco as aruco;
pub use markerframe_core as core;

pub mod batch;
pub mod depth;
pub mod detect;
pub mod estimate;
pub mod io;
pub mod reconstruct;
pub mod vis;

pub use batch::{collect_images, run_batch, BatchConfig, BatchError, BatchReport, ImageSummary};
pub use depth::{DepthError, DepthImage, DepthToPointCloud};
pub use estimate::{EstimateError, MarkerPoses, MarkerSizes, PoseEstimator};
pub use reconstruct::{CornerReconstructor, RowOrder};
