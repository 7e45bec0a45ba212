//! Four-point projective maps between planar quads.
//!
//! Both quads are expressed through the unit square: `H = Q_dst · Q_src⁻¹`,
//! where `Q` maps `(0,0) (1,0) (1,1) (0,1)` onto the quad's corners in order.

use nalgebra::{Matrix3, Point2, Vector3};

/// Planar projective transform `dst ~ H · src`, scaled so `h[(2, 2)] == 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let q = self.h * p.to_homogeneous();
        Point2::new(q.x / q.z, q.y / q.z)
    }

    #[inline]
    pub fn apply_f32(&self, p: Point2<f32>) -> Point2<f32> {
        self.apply(p.cast::<f64>()).cast::<f32>()
    }

    pub fn inverse(&self) -> Option<Self> {
        let inv = self.h.try_inverse()?;
        rescale(inv).map(Self::new)
    }

    pub fn column(&self, i: usize) -> Vector3<f64> {
        self.h.column(i).into_owned()
    }
}

fn rescale(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    (s.abs() > 1e-12 && h.iter().all(|v| v.is_finite())).then(|| h / s)
}

/// Map from the unit square onto `q` (corner `k` of the square goes to `q[k]`).
fn unit_square_to(q: &[Point2<f64>; 4]) -> Option<Matrix3<f64>> {
    let [p0, p1, p2, p3] = *q;
    let sx = p0.x - p1.x + p2.x - p3.x;
    let sy = p0.y - p1.y + p2.y - p3.y;

    let (g, h) = if sx.abs() < 1e-15 && sy.abs() < 1e-15 {
        // parallelogram: affine
        (0.0, 0.0)
    } else {
        let (dx1, dy1) = (p1.x - p2.x, p1.y - p2.y);
        let (dx2, dy2) = (p3.x - p2.x, p3.y - p2.y);
        let det = dx1 * dy2 - dx2 * dy1;
        if det.abs() < 1e-300 {
            return None;
        }
        ((sx * dy2 - dx2 * sy) / det, (dx1 * sy - sx * dy1) / det)
    };

    let m = Matrix3::new(
        p1.x - p0.x + g * p1.x, p3.x - p0.x + h * p3.x, p0.x, //
        p1.y - p0.y + g * p1.y, p3.y - p0.y + h * p3.y, p0.y, //
        g, h, 1.0,
    );
    (m.determinant() != 0.0).then_some(m)
}

/// Homography taking `src[k]` to `dst[k]` for all four corners.
///
/// `None` when either quad is degenerate (repeated or collinear corners).
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let from_src = unit_square_to(src)?.try_inverse()?;
    let to_dst = unit_square_to(dst)?;
    rescale(to_dst * from_src).map(Homography::new)
}
