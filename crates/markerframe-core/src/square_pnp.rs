//! Pose of a planar square from four corners.
//!
//! A homography between the square and the undistorted normalized corners
//! gives the initial rotation and translation. Orthogonal iteration
//! (Lu, Hager & Mjolsness) refines it by minimising object-space collinearity
//! error. The second planar-ambiguity pose is found by restarting the
//! iteration from the first rotation mirrored about the viewing ray.
//! Hypotheses that end up behind the camera are rejected.

use crate::camera::CameraModel;
use crate::homography::{homography_from_4pt, Homography};
use crate::pose::{PoseCandidate, PoseSolveError, PoseSolver, SolveMode};
use nalgebra::{Matrix3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parameters of [`SquarePoseSolver`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SquarePoseParams {
    /// Maximum orthogonal-iteration steps per hypothesis.
    pub max_iterations: usize,
    /// Stop once the object-space error changes by less than this.
    pub convergence_eps: f64,
}

impl Default for SquarePoseParams {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            convergence_eps: 1e-14,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SquarePoseSolver {
    pub params: SquarePoseParams,
}

impl SquarePoseSolver {
    pub fn new(params: SquarePoseParams) -> Self {
        Self { params }
    }
}

impl PoseSolver for SquarePoseSolver {
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(mode = ?mode)))]
    fn solve(
        &self,
        image_points: &[Point2<f64>; 4],
        object_points: &[Point3<f64>; 4],
        camera: &CameraModel,
        mode: SolveMode,
    ) -> Result<Vec<PoseCandidate>, PoseSolveError> {
        if object_points.iter().any(|p| p.z.abs() > 1e-12) {
            return Err(PoseSolveError::NonPlanarObject);
        }

        let mut normalized = [Point2::origin(); 4];
        for (dst, px) in normalized.iter_mut().zip(image_points) {
            *dst = camera
                .pixel_to_normalized(px)
                .ok_or(PoseSolveError::Undistort)?;
        }

        let plane = object_points.map(|p| Point2::new(p.x, p.y));
        let h = homography_from_4pt(&plane, &normalized).ok_or(PoseSolveError::Degenerate)?;
        let (r0, t0) = pose_from_homography(&h)?;

        let problem = Collinearity::new(&normalized, object_points)?;
        let (r1, t1) = in_front(problem.refine(r0, t0, &self.params)?)?;

        match mode {
            SolveMode::Fast => Ok(vec![PoseCandidate::new(r1, t1)]),
            SolveMode::Ranked => {
                let r_alt = reflect_about_ray(&r1, &t1).ok_or(PoseSolveError::Degenerate)?;
                let (r2, t2) = in_front(problem.refine(r_alt, t1, &self.params)?)?;

                let mut out = [(r1, t1), (r2, t2)].map(|(r, t)| PoseCandidate {
                    rotation: r,
                    translation: t,
                    reprojection_error: Some(reprojection_rms(
                        camera,
                        image_points,
                        object_points,
                        &r,
                        &t,
                    )),
                });
                out.sort_by(|a, b| {
                    let ea = a.reprojection_error.unwrap_or(f64::INFINITY);
                    let eb = b.reprojection_error.unwrap_or(f64::INFINITY);
                    ea.total_cmp(&eb)
                });
                Ok(out.to_vec())
            }
        }
    }
}

/// Decompose `H ~ [r1 r2 t]` into an initial rotation and translation.
fn pose_from_homography(h: &Homography) -> Result<(Matrix3<f64>, Vector3<f64>), PoseSolveError> {
    let h1 = h.column(0);
    let h2 = h.column(1);
    let h3 = h.column(2);

    let scale = 0.5 * (h1.norm() + h2.norm());
    if scale < 1e-12 {
        return Err(PoseSolveError::Degenerate);
    }
    let mut sign = 1.0 / scale;
    // marker must sit in front of the camera
    if h3.z * sign < 0.0 {
        sign = -sign;
    }

    let r1 = h1 * sign;
    let r2 = h2 * sign;
    let r3 = r1.cross(&r2);
    let t = h3 * sign;

    let r = project_to_so3(&Matrix3::from_columns(&[r1, r2, r3]))?;
    Ok((r, t))
}

/// Nearest rotation matrix in the Frobenius sense.
fn project_to_so3(m: &Matrix3<f64>) -> Result<Matrix3<f64>, PoseSolveError> {
    let svd = m.svd(true, true);
    let mut u = svd.u.ok_or(PoseSolveError::Numerical("svd failed"))?;
    let v_t = svd.v_t.ok_or(PoseSolveError::Numerical("svd failed"))?;

    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let k = svd.singular_values.imin();
        u.column_mut(k).neg_mut();
        r = u * v_t;
    }
    if r.iter().any(|v| !v.is_finite()) {
        return Err(PoseSolveError::Numerical("non-finite rotation"));
    }
    Ok(r)
}

/// `(2nnᵀ − I)·R·diag(-1, -1, 1)` with `n` the unit viewing ray through the
/// marker centre.
///
/// The half-turn about the ray also spins the marker in its own plane; the
/// trailing in-plane half-turn undoes that so corner `i` stays on corner `i`.
fn reflect_about_ray(r: &Matrix3<f64>, t: &Vector3<f64>) -> Option<Matrix3<f64>> {
    let n = t.try_normalize(1e-12)?;
    let half_turn = Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0));
    Some((2.0 * n * n.transpose() - Matrix3::identity()) * r * half_turn)
}

fn in_front(
    (r, t): (Matrix3<f64>, Vector3<f64>),
) -> Result<(Matrix3<f64>, Vector3<f64>), PoseSolveError> {
    if t.z > 0.0 {
        Ok((r, t))
    } else {
        Err(PoseSolveError::BehindCamera(t.z))
    }
}

fn reprojection_rms(
    camera: &CameraModel,
    image_points: &[Point2<f64>; 4],
    object_points: &[Point3<f64>; 4],
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
) -> f64 {
    let mut sum = 0.0;
    for (px, obj) in image_points.iter().zip(object_points) {
        let cam = Point3::from(r * obj.coords + t);
        let Some(proj) = camera.project(&cam) else {
            return f64::INFINITY;
        };
        sum += (proj - px).norm_squared();
    }
    let rms = (sum / 4.0).sqrt();
    if rms.is_finite() {
        rms
    } else {
        f64::INFINITY
    }
}

/// Precomputed line-of-sight projectors for orthogonal iteration.
struct Collinearity {
    projectors: [Matrix3<f64>; 4],
    points: [Vector3<f64>; 4],
    centered: [Vector3<f64>; 4],
    t_factor: Matrix3<f64>,
}

impl Collinearity {
    fn new(
        normalized: &[Point2<f64>; 4],
        object_points: &[Point3<f64>; 4],
    ) -> Result<Self, PoseSolveError> {
        let projectors = normalized.map(|p| {
            let v = Vector3::new(p.x, p.y, 1.0);
            v * v.transpose() / v.norm_squared()
        });
        let points = object_points.map(|p| p.coords);
        let mean = points.iter().sum::<Vector3<f64>>() / 4.0;
        let centered = points.map(|p| p - mean);

        let f_mean = projectors.iter().sum::<Matrix3<f64>>() / 4.0;
        let t_factor = (Matrix3::identity() - f_mean)
            .try_inverse()
            .ok_or(PoseSolveError::Degenerate)?;

        Ok(Self {
            projectors,
            points,
            centered,
            t_factor,
        })
    }

    /// Optimal translation for a fixed rotation.
    fn translation(&self, r: &Matrix3<f64>) -> Vector3<f64> {
        let mut acc = Vector3::zeros();
        for (f, p) in self.projectors.iter().zip(&self.points) {
            let rp = r * p;
            acc += f * rp - rp;
        }
        self.t_factor * (acc / 4.0)
    }

    fn error(&self, r: &Matrix3<f64>, t: &Vector3<f64>) -> f64 {
        self.projectors
            .iter()
            .zip(&self.points)
            .map(|(f, p)| {
                let q = r * p + t;
                (q - f * q).norm_squared()
            })
            .sum()
    }

    fn refine(
        &self,
        mut r: Matrix3<f64>,
        t_init: Vector3<f64>,
        params: &SquarePoseParams,
    ) -> Result<(Matrix3<f64>, Vector3<f64>), PoseSolveError> {
        let mut t = t_init;
        let mut prev_err = self.error(&r, &t);

        for _ in 0..params.max_iterations {
            t = self.translation(&r);

            let q = std::array::from_fn::<Vector3<f64>, 4, _>(|i| {
                self.projectors[i] * (r * self.points[i] + t)
            });
            let q_mean = q.iter().sum::<Vector3<f64>>() / 4.0;

            let mut m = Matrix3::zeros();
            for (qi, pi) in q.iter().zip(&self.centered) {
                m += (qi - q_mean) * pi.transpose();
            }
            r = project_to_so3(&m)?;

            let err = self.error(&r, &self.translation(&r));
            if (prev_err - err).abs() < params.convergence_eps {
                break;
            }
            prev_err = err;
        }

        t = self.translation(&r);
        if t.iter().any(|v| !v.is_finite()) {
            return Err(PoseSolveError::Numerical("non-finite translation"));
        }
        Ok((r, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::marker_object_points;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn camera() -> CameraModel {
        CameraModel::pinhole(800.0, 800.0, 320.0, 240.0)
    }

    fn project_all(
        cam: &CameraModel,
        r: &Matrix3<f64>,
        t: &Vector3<f64>,
        obj: &[Point3<f64>; 4],
    ) -> [Point2<f64>; 4] {
        obj.map(|p| {
            cam.project(&Point3::from(r * p.coords + t))
                .expect("in front")
        })
    }

    #[test]
    fn frontal_marker_is_recovered() {
        let cam = camera();
        let obj = marker_object_points(0.1);
        let t = Vector3::new(0.0, 0.0, 1.0);
        let img = project_all(&cam, &Matrix3::identity(), &t, &obj);
        assert_relative_eq!(img[0], Point2::new(280.0, 280.0), epsilon = 1e-9);

        let poses = SquarePoseSolver::default()
            .solve(&img, &obj, &cam, SolveMode::Fast)
            .expect("solve");
        assert_eq!(poses.len(), 1);
        assert!(poses[0].reprojection_error.is_none());
        assert_relative_eq!(poses[0].rotation, Matrix3::identity(), epsilon = 1e-9);
        assert_relative_eq!(poses[0].translation, t, epsilon = 1e-9);
    }

    #[test]
    fn oblique_marker_is_recovered() {
        let cam = camera();
        let obj = marker_object_points(0.2);
        let r = *Rotation3::from_euler_angles(0.2, 0.7, -0.1).matrix();
        let t = Vector3::new(0.1, -0.05, 3.0);
        let img = project_all(&cam, &r, &t, &obj);

        let poses = SquarePoseSolver::default()
            .solve(&img, &obj, &cam, SolveMode::Fast)
            .expect("solve");
        assert_relative_eq!(poses[0].rotation, r, epsilon = 1e-6);
        assert_relative_eq!(poses[0].translation, t, epsilon = 1e-6);
    }

    #[test]
    fn ranked_mode_returns_two_sorted_candidates() {
        let cam = camera();
        let obj = marker_object_points(0.15);
        let r = *Rotation3::from_euler_angles(-0.4, 0.3, 0.9).matrix();
        let t = Vector3::new(-0.05, 0.02, 1.2);
        let img = project_all(&cam, &r, &t, &obj);

        let poses = SquarePoseSolver::default()
            .solve(&img, &obj, &cam, SolveMode::Ranked)
            .expect("solve");
        assert_eq!(poses.len(), 2);
        let e0 = poses[0].reprojection_error.expect("ranked error");
        let e1 = poses[1].reprojection_error.expect("ranked error");
        assert!(e0 <= e1);
        assert!(e0 < 1e-6, "best error {e0}");
        assert!(e1.is_finite(), "second error {e1}");
        assert_relative_eq!(poses[0].translation, t, epsilon = 1e-6);
        let turn = (poses[0].rotation.transpose() * poses[1].rotation).trace();
        assert!(turn < 3.0 - 1e-6, "second pose repeats the first");
        for pose in &poses {
            assert!(pose.translation.z > 0.0);
            let rtr = pose.rotation.transpose() * pose.rotation;
            assert_relative_eq!(rtr, Matrix3::identity(), epsilon = 1e-9);
            assert!(pose.rotation.determinant() > 0.0);
        }
    }

    #[test]
    fn ambiguous_pose_stays_in_front_at_every_depth() {
        let cam = camera();
        let obj = marker_object_points(0.1);
        let r = *Rotation3::from_euler_angles(0.35, -0.25, 0.4).matrix();
        for z in [1.0, 2.0, 3.0, 4.0] {
            let t = Vector3::new(0.03, -0.02, z);
            let img = project_all(&cam, &r, &t, &obj);
            let poses = SquarePoseSolver::default()
                .solve(&img, &obj, &cam, SolveMode::Ranked)
                .expect("solve");
            let alt = &poses[1];
            assert!(alt.translation.z > 0.0, "z = {z}: {:?}", alt.translation);
            assert!((alt.translation.z - z).abs() < 0.05 * z);
            assert!(alt.reprojection_error.expect("ranked error").is_finite());
        }
    }

    #[test]
    fn mirrored_start_keeps_frontal_pose_in_place() {
        let r = Matrix3::identity();
        let t = Vector3::new(0.0, 0.0, 2.0);
        let alt = reflect_about_ray(&r, &t).expect("ray");
        assert_relative_eq!(alt, r, epsilon = 1e-12);
    }

    #[test]
    fn pose_behind_the_camera_is_rejected() {
        let behind = in_front((Matrix3::identity(), Vector3::new(0.0, 0.0, -1.0)));
        assert_eq!(behind, Err(PoseSolveError::BehindCamera(-1.0)));
    }

    #[test]
    fn collapsed_corners_are_rejected() {
        let cam = camera();
        let obj = marker_object_points(0.1);
        let img = [Point2::new(100.0, 100.0); 4];
        assert!(SquarePoseSolver::default()
            .solve(&img, &obj, &cam, SolveMode::Fast)
            .is_err());
    }

    #[test]
    fn lifted_object_points_are_rejected() {
        let cam = camera();
        let mut obj = marker_object_points(0.1);
        obj[1].z = 0.01;
        let img = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        assert_eq!(
            SquarePoseSolver::default().solve(&img, &obj, &cam, SolveMode::Fast),
            Err(PoseSolveError::NonPlanarObject)
        );
    }
}
