//! Rigid alignment of corresponding 3D point sets.

use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RigidError {
    #[error("point sets differ in size ({target_len} target vs {source_len} source)")]
    LengthMismatch {
        target_len: usize,
        source_len: usize,
    },
    #[error("need at least 3 correspondences, got {0}")]
    TooFewPoints(usize),
    #[error("matrix is not a rotation")]
    NotARotation,
    #[error("singular value decomposition failed")]
    Svd,
}

/// `target ≈ rotation · source + translation`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigidAlignment {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    /// Per-point distance after alignment.
    pub residuals: Vec<f64>,
}

impl RigidAlignment {
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }

    pub fn rms(&self) -> f64 {
        if self.residuals.is_empty() {
            return 0.0;
        }
        let ss: f64 = self.residuals.iter().map(|r| r * r).sum();
        (ss / self.residuals.len() as f64).sqrt()
    }

    /// `[rx, ry, rz, tx, ty, tz]` with angles as in [`rotation_to_euler`].
    pub fn to_params(&self) -> Result<[f64; 6], RigidError> {
        let e = rotation_to_euler(&self.rotation)?;
        let t = self.translation;
        Ok([e.x, e.y, e.z, t.x, t.y, t.z])
    }
}

/// `‖I − RᵀR‖ < 1e-6`.
pub fn is_rotation_matrix(r: &Matrix3<f64>) -> bool {
    (Matrix3::identity() - r.transpose() * r).norm() < 1e-6
}

/// Angles `(x, y, z)` such that `R = Rz(z)·Ry(y)·Rx(x)`.
///
/// Near gimbal lock (`cos y ≈ 0`) the z angle is pinned to zero.
pub fn rotation_to_euler(r: &Matrix3<f64>) -> Result<Vector3<f64>, RigidError> {
    if !is_rotation_matrix(r) {
        return Err(RigidError::NotARotation);
    }

    let sy = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();
    let angles = if sy >= 1e-6 {
        Vector3::new(
            r[(2, 1)].atan2(r[(2, 2)]),
            (-r[(2, 0)]).atan2(sy),
            r[(1, 0)].atan2(r[(0, 0)]),
        )
    } else {
        Vector3::new((-r[(1, 2)]).atan2(r[(1, 1)]), (-r[(2, 0)]).atan2(sy), 0.0)
    };
    Ok(angles)
}

/// Inverse of [`rotation_to_euler`].
pub fn euler_to_rotation(angles: &Vector3<f64>) -> Matrix3<f64> {
    *Rotation3::from_euler_angles(angles.x, angles.y, angles.z).matrix()
}

/// Least-squares rotation and translation mapping `source` onto `target`.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(n = target.len())))]
pub fn align_rigid(
    target: &[Point3<f64>],
    source: &[Point3<f64>],
) -> Result<RigidAlignment, RigidError> {
    if target.len() != source.len() {
        return Err(RigidError::LengthMismatch {
            target_len: target.len(),
            source_len: source.len(),
        });
    }
    let n = target.len();
    if n < 3 {
        return Err(RigidError::TooFewPoints(n));
    }

    let mean = |pts: &[Point3<f64>]| pts.iter().map(|p| p.coords).sum::<Vector3<f64>>() / n as f64;
    let mu_t = mean(target);
    let mu_s = mean(source);

    let mut cov = Matrix3::<f64>::zeros();
    for (t, s) in target.iter().zip(source) {
        cov += (t.coords - mu_t) * (s.coords - mu_s).transpose();
    }

    let svd = cov.svd(true, true);
    let mut u = svd.u.ok_or(RigidError::Svd)?;
    let v_t = svd.v_t.ok_or(RigidError::Svd)?;
    let mut rotation = u * v_t;
    if rotation.determinant() < 0.0 {
        let k = svd.singular_values.imin();
        u.column_mut(k).neg_mut();
        rotation = u * v_t;
    }
    let translation = mu_t - rotation * mu_s;

    let residuals = target
        .iter()
        .zip(source)
        .map(|(t, s)| (t.coords - (rotation * s.coords + translation)).norm())
        .collect();

    Ok(RigidAlignment {
        rotation,
        translation,
        residuals,
    })
}
