//! Image loading and the detection stage.

use markerframe_core::{DetectError, Detections, GrayImageView, MarkerDetector};
use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Borrow an `image::GrayImage` as a core view.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Decode an image file and convert it to 8-bit grayscale.
pub fn load_gray(path: impl AsRef<Path>) -> Result<::image::GrayImage, ::image::ImageError> {
    Ok(::image::ImageReader::open(path)?.decode()?.to_luma8())
}

/// Run `detector` and return its observations sorted by marker id.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(width = img.width(), height = img.height()))
)]
pub fn detect_markers<D: MarkerDetector + ?Sized>(
    detector: &D,
    img: &::image::GrayImage,
) -> Result<Detections, DetectError> {
    let det = detector.detect(&gray_view(img))?;
    log::debug!(
        "ids {:?}, {} rejected candidates",
        det.ids(),
        det.rejected.len()
    );
    Ok(det)
}

#[cfg(test)]
mod tests {
    use super::*;
    use markerframe_core::{Quad, RawDetections};
    use nalgebra::Point2;

    struct Scripted(RawDetections);

    impl MarkerDetector for Scripted {
        fn detect_raw(&self, _image: &GrayImageView<'_>) -> RawDetections {
            self.0.clone()
        }
    }

    fn quad(x: f32) -> Quad {
        [
            Point2::new(x, 0.0),
            Point2::new(x + 1.0, 0.0),
            Point2::new(x + 1.0, 1.0),
            Point2::new(x, 1.0),
        ]
    }

    #[test]
    fn view_shares_the_image_buffer() {
        let img = ::image::GrayImage::from_fn(4, 3, |x, y| ::image::Luma([(y * 4 + x) as u8]));
        let view = gray_view(&img);
        assert_eq!((view.width, view.height), (4, 3));
        assert_eq!(view.get(3, 2), 11);
    }

    #[test]
    fn corners_follow_their_ids() {
        let det = Scripted(RawDetections {
            ids: vec![7, 2, 7, 0],
            corners: vec![quad(70.0), quad(20.0), quad(71.0), quad(0.0)],
            rejected: vec![quad(99.0)],
        });
        let img = ::image::GrayImage::new(8, 8);
        let out = detect_markers(&det, &img).expect("consistent");
        assert_eq!(out.ids(), vec![0, 2, 7, 7]);
        let xs: Vec<f32> = out.observations.iter().map(|o| o.corners[0].x).collect();
        assert_eq!(xs, vec![0.0, 20.0, 70.0, 71.0]);
        assert_eq!(out.rejected.len(), 1);
    }

    #[test]
    fn mismatched_backend_output_is_an_error() {
        let det = Scripted(RawDetections {
            ids: vec![1, 2],
            corners: vec![quad(0.0)],
            rejected: Vec::new(),
        });
        let img = ::image::GrayImage::new(8, 8);
        assert_eq!(
            detect_markers(&det, &img).unwrap_err(),
            DetectError::MismatchedOutput { ids: 2, corners: 1 }
        );
    }
}
