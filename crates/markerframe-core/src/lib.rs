//! Core types and geometry for fiducial marker pose pipelines.
//!
//! This crate is purely geometric. Marker detection and pose solving are
//! expressed as capabilities ([`MarkerDetector`], [`PoseSolver`]) so the
//! pipeline stages never depend on a concrete backend or image type.
//! [`SquarePoseSolver`] is the bundled solver.

mod camera;
mod corners;
mod homography;
mod image;
mod logger;
mod observation;
mod plane;
mod pose;
mod rigid;
mod square_pnp;

pub use camera::{CameraError, CameraModel, Distortion};
pub use corners::{
    marker_corner, marker_corners, top_left_corner, CornerSelection, MARKER_CORNER_SIGNS,
};
pub use homography::{homography_from_4pt, Homography};
pub use image::{GrayImage, GrayImageView};
pub use observation::{
    sort_detections, DetectError, Detections, MarkerDetector, MarkerObservation, Quad,
    RawDetections, RejectedCandidate,
};
pub use plane::{
    estimate_plane_frame, fit_plane, project_to_plane, project_to_xy, Plane, PlaneError,
};
pub use pose::{marker_object_points, PoseCandidate, PoseSolveError, PoseSolver, SolveMode};
pub use rigid::{
    align_rigid, euler_to_rotation, is_rotation_matrix, rotation_to_euler, RigidAlignment,
    RigidError,
};
pub use square_pnp::{SquarePoseParams, SquarePoseSolver};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
