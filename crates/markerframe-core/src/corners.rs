//! Physical marker corners in the camera frame.

use crate::pose::PoseCandidate;
use nalgebra::{Point3, Vector4};
use serde::{Deserialize, Serialize};

/// Offsets of the four corners in units of half the marker side,
/// in observation winding (top-left first).
pub const MARKER_CORNER_SIGNS: [(f64, f64); 4] =
    [(-1.0, 1.0), (1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)];

/// Which corners to reconstruct per marker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerSelection {
    #[default]
    TopLeft,
    All,
}

impl CornerSelection {
    /// Corner indices into [`MARKER_CORNER_SIGNS`], in output order.
    pub fn indices(self) -> &'static [usize] {
        match self {
            CornerSelection::TopLeft => &[0],
            CornerSelection::All => &[0, 1, 2, 3],
        }
    }
}

/// Camera-frame position of corner `index` of a marker of side `size`.
pub fn marker_corner(pose: &PoseCandidate, size: f64, index: usize) -> Point3<f64> {
    let (sx, sy) = MARKER_CORNER_SIGNS[index % 4];
    let half = size / 2.0;
    let p = pose.to_matrix() * Vector4::new(sx * half, sy * half, 0.0, 1.0);
    Point3::new(p.x, p.y, p.z)
}

/// All four corners in winding order.
pub fn marker_corners(pose: &PoseCandidate, size: f64) -> [Point3<f64>; 4] {
    std::array::from_fn(|i| marker_corner(pose, size, i))
}

pub fn top_left_corner(pose: &PoseCandidate, size: f64) -> Point3<f64> {
    marker_corner(pose, size, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::marker_object_points;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Rotation3, Vector3};

    #[test]
    fn identity_pose_gives_canonical_corners() {
        let pose = PoseCandidate::new(Matrix3::identity(), Vector3::zeros());
        let corners = marker_corners(&pose, 0.1);
        assert_eq!(corners, marker_object_points(0.1));
        assert_eq!(top_left_corner(&pose, 0.1), Point3::new(-0.05, 0.05, 0.0));
    }

    #[test]
    fn translated_top_left_matches_reference_row() {
        let pose = PoseCandidate::identity_at(Vector3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(top_left_corner(&pose, 0.1), Point3::new(-0.05, 0.05, 1.0));
    }

    #[test]
    fn rotated_corners_keep_side_length() {
        let rot = *Rotation3::from_euler_angles(0.3, -0.5, 1.1).matrix();
        let pose = PoseCandidate::new(rot, Vector3::new(0.2, -0.1, 2.0));
        let c = marker_corners(&pose, 0.08);
        for i in 0..4 {
            let side = (c[(i + 1) % 4] - c[i]).norm();
            assert_relative_eq!(side, 0.08, epsilon = 1e-12);
        }
    }

    #[test]
    fn selection_indices() {
        assert_eq!(CornerSelection::TopLeft.indices(), &[0]);
        assert_eq!(CornerSelection::All.indices(), &[0, 1, 2, 3]);
    }
}
