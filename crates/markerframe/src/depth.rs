//! Point clouds from rectified depth images.

use crate::io::npy::{read_npy_file, NpyArray, NpyData, NpyError};
use markerframe_core::CameraModel;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Millimetre depth (`u16`) to metres.
pub const MILLIMETRE_SCALE: f64 = 0.001;

#[derive(thiserror::Error, Debug)]
pub enum DepthError {
    #[error("only rectified depth is supported, but distortion is non-zero: {0:?}")]
    Distorted(Vec<f64>),
    #[error("pool size must be at least 1")]
    ZeroPoolSize,
    #[error("depth buffer has {got} values for a {width}x{height} image")]
    BadBuffer { width: usize, height: usize, got: usize },
    #[error("depth array must be 2D, got shape {0:?}")]
    BadShape(Vec<usize>),
    #[error("unsupported depth element type {0} (use u16 millimetres or float metres)")]
    UnsupportedType(&'static str),
    #[error("unsupported depth file extension '{0}' (use .npy or .png)")]
    UnsupportedExtension(String),
    #[error(transparent)]
    Npy(#[from] NpyError),
    #[error("failed to read depth image: {0}")]
    Image(#[from] image::ImageError),
}

/// Depth in metres, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthImage {
    pub width: usize,
    pub height: usize,
    pub meters: Vec<f64>,
}

impl DepthImage {
    pub fn from_meters(width: usize, height: usize, meters: Vec<f64>) -> Result<Self, DepthError> {
        if meters.len() != width * height {
            return Err(DepthError::BadBuffer {
                width,
                height,
                got: meters.len(),
            });
        }
        Ok(Self {
            width,
            height,
            meters,
        })
    }

    pub fn from_millimeters(width: usize, height: usize, mm: &[u16]) -> Result<Self, DepthError> {
        let meters = mm.iter().map(|&d| d as f64 * MILLIMETRE_SCALE).collect();
        Self::from_meters(width, height, meters)
    }

    /// `u16` arrays are millimetres, float arrays are metres.
    pub fn from_npy(arr: NpyArray) -> Result<Self, DepthError> {
        let (height, width) = match arr.shape.as_slice() {
            [h, w] => (*h, *w),
            _ => return Err(DepthError::BadShape(arr.shape)),
        };
        match &arr.data {
            NpyData::U16(mm) => Self::from_millimeters(width, height, mm),
            NpyData::F64(_) | NpyData::F32(_) => Self::from_meters(width, height, arr.to_f64()),
            NpyData::I32(_) => Err(DepthError::UnsupportedType("i32")),
            NpyData::I64(_) => Err(DepthError::UnsupportedType("i64")),
        }
    }

    /// Load a `.npy` array or a 16-bit `.png` (millimetres).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DepthError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "npy" => Self::from_npy(read_npy_file(path)?),
            "png" => {
                let img = image::ImageReader::open(path)
                    .map_err(image::ImageError::IoError)?
                    .decode()?
                    .to_luma16();
                Self::from_millimeters(img.width() as usize, img.height() as usize, img.as_raw())
            }
            _ => Err(DepthError::UnsupportedExtension(ext)),
        }
    }

    /// Non-positive or non-finite depth is "no measurement".
    fn valid_at(&self, u: usize, v: usize) -> f64 {
        let d = self.meters[v * self.width + u];
        if d > 0.0 && d.is_finite() {
            d
        } else {
            f64::INFINITY
        }
    }
}

fn default_pool_size() -> usize {
    8
}

/// Back-projects min-pooled depth through pinhole intrinsics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthToPointCloud {
    pub camera: CameraModel,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl DepthToPointCloud {
    pub fn new(camera: CameraModel, pool_size: usize) -> Result<Self, DepthError> {
        let conv = Self { camera, pool_size };
        conv.check()?;
        Ok(conv)
    }

    fn check(&self) -> Result<(), DepthError> {
        if !self.camera.distortion.is_zero() {
            return Err(DepthError::Distorted(self.camera.distortion.to_vec()));
        }
        if self.pool_size == 0 {
            return Err(DepthError::ZeroPoolSize);
        }
        Ok(())
    }

    /// One point per pool block with any valid depth, in row-major block order.
    ///
    /// Blocks are `pool_size` square and taken from the top-left; trailing
    /// rows and columns that do not fill a block are dropped. Each block
    /// contributes its nearest valid depth at the block's pixel position in
    /// the pooled grid, with intrinsics divided by `pool_size`.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip_all,
            fields(w = depth.width, h = depth.height, pool = self.pool_size)
        )
    )]
    pub fn convert(&self, depth: &DepthImage) -> Result<Vec<Point3<f64>>, DepthError> {
        self.check()?;
        let p = self.pool_size;
        let (rows, cols) = (depth.height / p, depth.width / p);
        let s = p as f64;
        let (fx, fy) = (self.camera.fx() / s, self.camera.fy() / s);
        let (cx, cy) = (self.camera.cx() / s, self.camera.cy() / s);

        let mut cloud = Vec::new();
        for v in 0..rows {
            for u in 0..cols {
                let mut z = f64::INFINITY;
                for y in v * p..(v + 1) * p {
                    for x in u * p..(u + 1) * p {
                        z = z.min(depth.valid_at(x, y));
                    }
                }
                if z.is_finite() {
                    cloud.push(Point3::new(
                        (u as f64 - cx) / fx * z,
                        (v as f64 - cy) / fy * z,
                        z,
                    ));
                }
            }
        }
        log::debug!(
            "{} points from a {}x{} pooled grid",
            cloud.len(),
            cols,
            rows
        );
        Ok(cloud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use markerframe_core::Distortion;

    fn camera() -> CameraModel {
        CameraModel::pinhole(400.0, 400.0, 8.0, 4.0)
    }

    #[test]
    fn distortion_is_rejected() {
        let mut cam = camera();
        cam.distortion = Distortion {
            k1: 0.1,
            ..Distortion::default()
        };
        assert!(matches!(
            DepthToPointCloud::new(cam, 8),
            Err(DepthError::Distorted(_))
        ));
        assert!(matches!(
            DepthToPointCloud::new(camera(), 0),
            Err(DepthError::ZeroPoolSize)
        ));
    }

    #[test]
    fn pooling_keeps_nearest_valid_depth() {
        // 4x2 pixels, pool 2 -> 2x1 blocks
        let mm = [0u16, 1500, 900, 0, 2000, 1200, 0, 0];
        let depth = DepthImage::from_millimeters(4, 2, &mm).expect("depth");
        let conv = DepthToPointCloud::new(CameraModel::pinhole(100.0, 100.0, 1.0, 0.0), 2)
            .expect("conv");
        let cloud = conv.convert(&depth).expect("cloud");
        assert_eq!(cloud.len(), 2);
        assert_relative_eq!(cloud[0].z, 1.2, epsilon = 1e-12);
        assert_relative_eq!(cloud[1].z, 0.9, epsilon = 1e-12);
        // pooled intrinsics: fx = 50, cx = 0.5
        assert_relative_eq!(cloud[1].x, (1.0 - 0.5) / 50.0 * 0.9, epsilon = 1e-12);
        assert_relative_eq!(cloud[1].y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_blocks_and_trailing_pixels_are_dropped() {
        let mut meters = vec![0.0; 17 * 9];
        meters[0] = 2.0;
        meters[16] = 1.0; // trailing column
        meters[8 * 17] = f64::NAN; // second row of blocks would be partial
        let depth = DepthImage::from_meters(17, 9, meters).expect("depth");
        let conv = DepthToPointCloud::new(camera(), 8).expect("conv");
        let cloud = conv.convert(&depth).expect("cloud");
        assert_eq!(cloud.len(), 1);
        assert_relative_eq!(cloud[0].z, 2.0);
        // pooled cx = 1, cy = 0.5, fx = fy = 50
        assert_relative_eq!(cloud[0].x, -1.0 / 50.0 * 2.0, epsilon = 1e-12);
        assert_relative_eq!(cloud[0].y, -0.5 / 50.0 * 2.0, epsilon = 1e-12);
    }

    #[test]
    fn float_npy_is_meters_and_integers_are_refused() {
        let arr = NpyArray {
            shape: vec![1, 2],
            data: NpyData::F32(vec![1.5, 0.0]),
        };
        let d = DepthImage::from_npy(arr).expect("depth");
        assert_eq!(d.meters, vec![1.5, 0.0]);

        let ints = NpyArray {
            shape: vec![1, 1],
            data: NpyData::I32(vec![1]),
        };
        assert!(matches!(
            DepthImage::from_npy(ints),
            Err(DepthError::UnsupportedType("i32"))
        ));
    }
}
