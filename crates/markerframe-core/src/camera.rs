//! Pinhole camera with OpenCV-style radial-tangential distortion.
//!
//! The distortion vector follows the OpenCV coefficient order
//! `k1 k2 p1 p2 [k3 [k4 k5 k6]]`; missing trailing coefficients are zero.

use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

/// Errors raised while building a camera model from raw arrays.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("camera matrix must be 3x3 (got {got} values)")]
    BadMatrixSize { got: usize },
    #[error("camera matrix has invalid focal lengths (fx={fx}, fy={fy})")]
    InvalidFocal { fx: f64, fy: f64 },
    #[error("unsupported distortion vector length {len} (expected 0, 4, 5 or 8)")]
    BadDistortionLength { len: usize },
    #[error("camera parameters contain non-finite values")]
    NonFinite,
}

/// Distortion coefficients in OpenCV order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
}

impl Distortion {
    /// Build from an OpenCV coefficient vector of length 0, 4, 5 or 8.
    pub fn from_slice(d: &[f64]) -> Result<Self, CameraError> {
        if !matches!(d.len(), 0 | 4 | 5 | 8) {
            return Err(CameraError::BadDistortionLength { len: d.len() });
        }
        if d.iter().any(|v| !v.is_finite()) {
            return Err(CameraError::NonFinite);
        }
        let at = |i: usize| d.get(i).copied().unwrap_or(0.0);
        Ok(Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
            k4: at(5),
            k5: at(6),
            k6: at(7),
        })
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
    }

    pub fn is_zero(&self) -> bool {
        self.to_vec().iter().all(|&v| v == 0.0)
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6)
            / (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6);
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (x * radial + x_tan, y * radial + y_tan)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, xd: f64, yd: f64) -> Option<(f64, f64)> {
        const MAX_ITERS: usize = 20;
        const EPS: f64 = 1e-14;

        if self.is_zero() {
            return Some((xd, yd));
        }

        let mut x = xd;
        let mut y = yd;
        for _ in 0..MAX_ITERS {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            let icdist = (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6)
                / (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6);
            if !icdist.is_finite() {
                return None;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            let x_next = (xd - dx) * icdist;
            let y_next = (yd - dy) * icdist;
            if !x_next.is_finite() || !y_next.is_finite() {
                return None;
            }
            let step = (x_next - x).hypot(y_next - y);
            x = x_next;
            y = y_next;
            if step <= EPS {
                break;
            }
        }
        Some((x, y))
    }
}

/// Camera intrinsics `K` plus distortion `D`, constant for a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub k: Matrix3<f64>,
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(k: Matrix3<f64>, distortion: Distortion) -> Result<Self, CameraError> {
        if k.iter().any(|v| !v.is_finite()) {
            return Err(CameraError::NonFinite);
        }
        let (fx, fy) = (k[(0, 0)], k[(1, 1)]);
        if fx.abs() < 1e-12 || fy.abs() < 1e-12 {
            return Err(CameraError::InvalidFocal { fx, fy });
        }
        Ok(Self { k, distortion })
    }

    /// Build from a row-major 3x3 matrix and an OpenCV distortion vector.
    pub fn from_raw(k_row_major: &[f64], d: &[f64]) -> Result<Self, CameraError> {
        if k_row_major.len() != 9 {
            return Err(CameraError::BadMatrixSize {
                got: k_row_major.len(),
            });
        }
        Self::new(
            Matrix3::from_row_slice(k_row_major),
            Distortion::from_slice(d)?,
        )
    }

    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            k: Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0),
            distortion: Distortion::default(),
        }
    }

    #[inline]
    pub fn fx(&self) -> f64 {
        self.k[(0, 0)]
    }
    #[inline]
    pub fn fy(&self) -> f64 {
        self.k[(1, 1)]
    }
    #[inline]
    pub fn cx(&self) -> f64 {
        self.k[(0, 2)]
    }
    #[inline]
    pub fn cy(&self) -> f64 {
        self.k[(1, 2)]
    }
    #[inline]
    fn skew(&self) -> f64 {
        self.k[(0, 1)]
    }

    /// Project a camera-frame point to distorted pixel coordinates.
    ///
    /// Returns `None` for points on or behind the camera plane.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= 1e-12 {
            return None;
        }
        let (xd, yd) = self.distortion.distort(p.x / p.z, p.y / p.z);
        Some(Point2::new(
            self.fx() * xd + self.skew() * yd + self.cx(),
            self.fy() * yd + self.cy(),
        ))
    }

    /// Map a distorted pixel to undistorted normalized image coordinates.
    pub fn pixel_to_normalized(&self, px: &Point2<f64>) -> Option<Point2<f64>> {
        let yd = (px.y - self.cy()) / self.fy();
        let xd = (px.x - self.cx() - self.skew() * yd) / self.fx();
        let (x, y) = self.distortion.undistort(xd, yd)?;
        Some(Point2::new(x, y))
    }
}
