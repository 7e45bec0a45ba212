//! Least-squares planes and plane-attached coordinate frames.
//!
//! Planes are parameterised as `z = a·x + b·y + c`, which excludes planes
//! parallel to the camera's optical axis. That is fine for markers and
//! boards viewed from the front.

use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlaneError {
    #[error("need at least {needed} points, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("plane frame needs an even number of points, got {0}")]
    OddPointCount(usize),
    #[error("points do not determine a unique plane")]
    Degenerate,
    #[error("frame transform is not invertible")]
    SingularFrame,
}

/// Plane `z = a·x + b·y + c`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Plane {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    pub fn coefficients(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }

    #[inline]
    pub fn z_at(&self, x: f64, y: f64) -> f64 {
        self.a * x + self.b * y + self.c
    }

    /// Unit normal `(-a, -b, 1) / |.|`.
    pub fn normal(&self) -> Vector3<f64> {
        Vector3::new(-self.a, -self.b, 1.0).normalize()
    }

    /// Orthogonal projection of `p` onto the plane.
    pub fn project(&self, p: &Point3<f64>) -> Point3<f64> {
        let dz = (self.z_at(p.x, p.y) - p.z) / (self.a * self.a + self.b * self.b + 1.0);
        Point3::new(p.x - self.a * dz, p.y - self.b * dz, p.z + dz)
    }
}

/// Solve the normal equations of `[x y 1]·[a b c]ᵀ = z`.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(n = points.len())))]
pub fn fit_plane(points: &[Point3<f64>]) -> Result<Plane, PlaneError> {
    if points.len() < 3 {
        return Err(PlaneError::TooFewPoints {
            needed: 3,
            got: points.len(),
        });
    }

    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for p in points {
        let row = Vector3::new(p.x, p.y, 1.0);
        ata += row * row.transpose();
        atb += row * p.z;
    }

    let sol = ata.lu().solve(&atb).ok_or(PlaneError::Degenerate)?;
    if sol.iter().any(|v| !v.is_finite()) {
        return Err(PlaneError::Degenerate);
    }
    Ok(Plane::new(sol[0], sol[1], sol[2]))
}

/// Free-function form of [`Plane::project`].
pub fn project_to_plane(p: &Point3<f64>, plane: &Plane) -> Point3<f64> {
    plane.project(p)
}

fn centroid(points: &[Point3<f64>]) -> Point3<f64> {
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc: Vector3<f64>, p| acc + p.coords);
    Point3::from(sum / points.len() as f64)
}

/// Rigid frame attached to the best-fit plane of `points`.
///
/// Origin is the centroid projected onto the plane. The x axis points from
/// the second half of the points towards the first half, the z axis is the
/// plane normal turned to face the camera origin and `y = z × x`.
///
/// The returned 4x4 maps plane-frame coordinates into the input frame.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(n = points.len())))]
pub fn estimate_plane_frame(points: &[Point3<f64>]) -> Result<Matrix4<f64>, PlaneError> {
    let n = points.len();
    if n % 2 != 0 {
        return Err(PlaneError::OddPointCount(n));
    }
    let plane = fit_plane(points)?;

    let center = centroid(points);
    let origin = plane.project(&center);
    let mut z_axis = plane.normal();

    let half = n / 2;
    let first = centroid(&points[..half]);
    let second = centroid(&points[half..]);
    let x_dir = Point3::from((first.coords + 2.0 * center.coords - second.coords) / 2.0);
    let x_axis = (plane.project(&x_dir) - origin)
        .try_normalize(1e-12)
        .ok_or(PlaneError::Degenerate)?;
    let mut y_axis = z_axis.cross(&x_axis).normalize();

    if z_axis.dot(&origin.coords) > 0.0 {
        y_axis = -y_axis;
        z_axis = -z_axis;
    }

    let mut t = Matrix4::identity();
    t.fixed_view_mut::<3, 1>(0, 0).copy_from(&x_axis);
    t.fixed_view_mut::<3, 1>(0, 1).copy_from(&y_axis);
    t.fixed_view_mut::<3, 1>(0, 2).copy_from(&z_axis);
    t.fixed_view_mut::<3, 1>(0, 3).copy_from(&origin.coords);
    log::debug!(
        "plane a={:.6} b={:.6} c={:.6}, origin=({:.4}, {:.4}, {:.4})",
        plane.a,
        plane.b,
        plane.c,
        origin.x,
        origin.y,
        origin.z
    );
    Ok(t)
}

/// Flatten points onto the XY plane of `frame` (drop their frame-local z).
pub fn project_to_xy(
    points: &[Point3<f64>],
    frame: &Matrix4<f64>,
) -> Result<Vec<Point3<f64>>, PlaneError> {
    let inv = frame.try_inverse().ok_or(PlaneError::SingularFrame)?;
    Ok(points
        .iter()
        .map(|p| {
            let mut local = inv * Vector4::new(p.x, p.y, p.z, 1.0);
            local.z = 0.0;
            let back = frame * local;
            Point3::new(back.x, back.y, back.z)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_on(plane: &Plane) -> Vec<Point3<f64>> {
        let mut pts = Vec::new();
        let samples = [
            (-0.2, 0.1),
            (0.3, 0.2),
            (0.1, -0.3),
            (-0.1, -0.1),
            (0.25, -0.15),
            (0.0, 0.3),
        ];
        for &(x, y) in &samples {
            pts.push(Point3::new(x, y, plane.z_at(x, y)));
        }
        pts
    }

    #[test]
    fn fit_recovers_exact_plane() {
        let truth = Plane::new(0.1, -0.2, 1.5);
        let fit = fit_plane(&grid_on(&truth)).expect("fit");
        assert_relative_eq!(fit.a, truth.a, epsilon = 1e-10);
        assert_relative_eq!(fit.b, truth.b, epsilon = 1e-10);
        assert_relative_eq!(fit.c, truth.c, epsilon = 1e-10);
    }

    #[test]
    fn too_few_or_collinear_points_fail() {
        let pts = [Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 0.0, 1.0)];
        assert!(matches!(fit_plane(&pts), Err(PlaneError::TooFewPoints { .. })));

        let line: Vec<_> = (0..4).map(|i| Point3::new(i as f64, i as f64, 1.0)).collect();
        assert_eq!(fit_plane(&line), Err(PlaneError::Degenerate));
    }

    #[test]
    fn projection_lands_on_plane_along_normal() {
        let plane = Plane::new(0.3, 0.1, 2.0);
        let p = Point3::new(0.5, -0.4, 0.7);
        let q = project_to_plane(&p, &plane);
        assert_relative_eq!(q.z, plane.z_at(q.x, q.y), epsilon = 1e-12);
        let offset = p - q;
        assert_relative_eq!(offset.normalize().cross(&plane.normal()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn frame_of_fronto_parallel_square() {
        // corners of a square at z = 2, first half on the +x side
        let pts = [
            Point3::new(0.1, 0.1, 2.0),
            Point3::new(0.1, -0.1, 2.0),
            Point3::new(-0.1, 0.1, 2.0),
            Point3::new(-0.1, -0.1, 2.0),
        ];
        let t = estimate_plane_frame(&pts).expect("frame");
        let col = |j: usize| Vector3::new(t[(0, j)], t[(1, j)], t[(2, j)]);

        assert_relative_eq!(col(0), Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        // z faces the camera, y keeps the frame right-handed
        assert_relative_eq!(col(2), Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);
        assert_relative_eq!(col(1), Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(col(3), Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);
        assert_relative_eq!(col(0).cross(&col(1)), col(2), epsilon = 1e-12);
    }

    #[test]
    fn odd_point_count_is_rejected() {
        let pts = grid_on(&Plane::new(0.0, 0.0, 1.0));
        assert_eq!(
            estimate_plane_frame(&pts[..5]),
            Err(PlaneError::OddPointCount(5))
        );
    }

    #[test]
    fn xy_projection_removes_out_of_plane_offset() {
        let plane = Plane::new(0.05, -0.1, 1.0);
        let mut pts = grid_on(&plane);
        let frame = estimate_plane_frame(&pts).expect("frame");
        let normal = plane.normal();
        pts[2] += normal * 0.03;

        let flat = project_to_xy(&pts, &frame).expect("invertible");
        assert_eq!(flat.len(), pts.len());
        for q in &flat {
            assert_relative_eq!(q.z, plane.z_at(q.x, q.y), epsilon = 1e-9);
        }
        let moved = pts[2] - flat[2];
        assert_relative_eq!(moved.norm(), 0.03, epsilon = 1e-9);
    }
}
