//! Pose candidates and the pose-solver capability contract.

use crate::camera::CameraModel;
use nalgebra::{Matrix3, Matrix4, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// One rigid marker-to-camera transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseCandidate {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    /// Pixel RMS reprojection error; only filled in ranked mode.
    pub reprojection_error: Option<f64>,
}

impl PoseCandidate {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
            reprojection_error: None,
        }
    }

    pub fn identity_at(translation: Vector3<f64>) -> Self {
        Self::new(Matrix3::identity(), translation)
    }

    /// 4x4 homogeneous transform (marker → camera).
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// Map a marker-local point into the camera frame.
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }
}

/// How many pose hypotheses to compute per marker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMode {
    /// A single pose, no error value.
    #[default]
    Fast,
    /// Both planar-ambiguity poses, sorted by ascending reprojection error.
    Ranked,
}

impl SolveMode {
    pub fn expected_candidates(self) -> usize {
        match self {
            SolveMode::Fast => 1,
            SolveMode::Ranked => 2,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseSolveError {
    #[error("image corners could not be undistorted")]
    Undistort,
    #[error("object points must lie on the z = 0 plane")]
    NonPlanarObject,
    #[error("degenerate corner configuration")]
    Degenerate,
    #[error("numerical failure: {0}")]
    Numerical(&'static str),
    #[error("pose places the marker behind the camera (t.z = {0})")]
    BehindCamera(f64),
}

/// Capability: recover a planar square's pose from its four image corners.
pub trait PoseSolver {
    /// `image_points[i]` is the distorted pixel of `object_points[i]`.
    fn solve(
        &self,
        image_points: &[Point2<f64>; 4],
        object_points: &[Point3<f64>; 4],
        camera: &CameraModel,
        mode: SolveMode,
    ) -> Result<Vec<PoseCandidate>, PoseSolveError>;
}

impl<S: PoseSolver + ?Sized> PoseSolver for &S {
    fn solve(
        &self,
        image_points: &[Point2<f64>; 4],
        object_points: &[Point3<f64>; 4],
        camera: &CameraModel,
        mode: SolveMode,
    ) -> Result<Vec<PoseCandidate>, PoseSolveError> {
        (**self).solve(image_points, object_points, camera, mode)
    }
}

/// Marker-local corners of a square of side `size`, centred at the origin,
/// in observation winding (top-left, top-right, bottom-right, bottom-left).
pub fn marker_object_points(size: f64) -> [Point3<f64>; 4] {
    let h = size / 2.0;
    [
        Point3::new(-h, h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(-h, -h, 0.0),
    ]
}
