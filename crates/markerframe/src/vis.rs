//! Annotated detection images: marker outlines and pose axes.

use crate::estimate::MarkerPoses;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use markerframe_core::{CameraModel, Detections};
use nalgebra::Point3;
use std::path::{Path, PathBuf};

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
const REJECTED: Rgb<u8> = Rgb([255, 0, 255]);
const AXIS_X: Rgb<u8> = Rgb([255, 0, 0]);
const AXIS_Y: Rgb<u8> = Rgb([0, 255, 0]);
const AXIS_Z: Rgb<u8> = Rgb([0, 0, 255]);

#[derive(thiserror::Error, Debug)]
pub enum VisError {
    #[error("failed to write visualization: {0}")]
    Image(#[from] image::ImageError),
    #[error("image path has no file name: {0}")]
    NoFileName(PathBuf),
}

/// `<folder>/<stem>_vis.<ext>` for an input image path.
pub fn vis_path(folder: &Path, image_path: &Path) -> Result<PathBuf, VisError> {
    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| VisError::NoFileName(image_path.to_path_buf()))?;
    let name = match image_path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_vis.{ext}"),
        None => format!("{stem}_vis.png"),
    };
    Ok(folder.join(name))
}

fn closed_polyline(img: &mut RgbImage, pts: &[(f32, f32); 4], color: Rgb<u8>) {
    for i in 0..4 {
        draw_line_segment_mut(img, pts[i], pts[(i + 1) % 4], color);
    }
}

/// Draw rejected candidates, accepted outlines (with a box on corner 0) and,
/// per marker, the axes of its first pose candidate at length `size / 2`.
pub fn annotate(
    gray: &image::GrayImage,
    detections: &Detections,
    poses: &[MarkerPoses],
    camera: &CameraModel,
) -> RgbImage {
    let mut img = image::DynamicImage::ImageLuma8(gray.clone()).to_rgb8();

    for cand in &detections.rejected {
        closed_polyline(&mut img, &cand.corners.map(|p| (p.x, p.y)), REJECTED);
    }
    for obs in &detections.observations {
        let pts = obs.corners.map(|p| (p.x, p.y));
        closed_polyline(&mut img, &pts, OUTLINE);
        let (x, y) = pts[0];
        draw_hollow_rect_mut(
            &mut img,
            Rect::at(x.round() as i32 - 3, y.round() as i32 - 3).of_size(7, 7),
            OUTLINE,
        );
    }

    for marker in poses {
        let Some(pose) = marker.candidates.first() else {
            continue;
        };
        let len = marker.size / 2.0;
        let project = |p: Point3<f64>| {
            camera
                .project(&pose.transform_point(&p))
                .map(|px| (px.x as f32, px.y as f32))
        };
        let Some(origin) = project(Point3::origin()) else {
            continue;
        };
        for (tip, color) in [
            (Point3::new(len, 0.0, 0.0), AXIS_X),
            (Point3::new(0.0, len, 0.0), AXIS_Y),
            (Point3::new(0.0, 0.0, len), AXIS_Z),
        ] {
            if let Some(end) = project(tip) {
                draw_line_segment_mut(&mut img, origin, end, color);
            }
        }
    }
    img
}

/// Annotate and save next to the other visualizations; returns the written path.
pub fn save_visualization(
    folder: &Path,
    image_path: &Path,
    gray: &image::GrayImage,
    detections: &Detections,
    poses: &[MarkerPoses],
    camera: &CameraModel,
) -> Result<PathBuf, VisError> {
    let out = vis_path(folder, image_path)?;
    annotate(gray, detections, poses, camera).save(&out)?;
    log::debug!("wrote {}", out.display());
    Ok(out)
}
