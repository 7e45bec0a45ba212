//! Marker observations and the detector capability contract.

use crate::image::GrayImageView;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Four image corners in marker winding: top-left, top-right, bottom-right,
/// bottom-left of the marker as printed.
pub type Quad = [Point2<f32>; 4];

/// One identified marker in an image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerObservation {
    pub id: u32,
    pub corners: Quad,
}

/// A quad the detector considered but could not identify.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub corners: Quad,
}

/// Parallel arrays as produced by a detector backend.
///
/// `ids[i]` belongs to `corners[i]`. Order is whatever the backend produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDetections {
    pub ids: Vec<u32>,
    pub corners: Vec<Quad>,
    pub rejected: Vec<Quad>,
}

/// Normalized detections: observations sorted by ascending id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    pub observations: Vec<MarkerObservation>,
    pub rejected: Vec<RejectedCandidate>,
}

impl Detections {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.observations.iter().map(|o| o.id).collect()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    #[error("detector returned {ids} ids but {corners} corner sets")]
    MismatchedOutput { ids: usize, corners: usize },
}

/// Capability: find fiducial markers in a grayscale image.
pub trait MarkerDetector {
    fn detect_raw(&self, image: &GrayImageView<'_>) -> RawDetections;

    /// Run the backend and normalize its output with [`sort_detections`].
    fn detect(&self, image: &GrayImageView<'_>) -> Result<Detections, DetectError> {
        sort_detections(self.detect_raw(image))
    }
}

impl<D: MarkerDetector + ?Sized> MarkerDetector for &D {
    fn detect_raw(&self, image: &GrayImageView<'_>) -> RawDetections {
        (**self).detect_raw(image)
    }
}

/// Sort `(id, corners)` pairs by id with a single stable permutation.
///
/// Equal ids keep the backend's relative order.
pub fn sort_detections(raw: RawDetections) -> Result<Detections, DetectError> {
    let RawDetections {
        ids,
        corners,
        rejected,
    } = raw;
    if ids.len() != corners.len() {
        return Err(DetectError::MismatchedOutput {
            ids: ids.len(),
            corners: corners.len(),
        });
    }

    let mut order: Vec<usize> = (0..ids.len()).collect();
    order.sort_by_key(|&i| ids[i]);

    let observations = order
        .into_iter()
        .map(|i| MarkerObservation {
            id: ids[i],
            corners: corners[i],
        })
        .collect();
    let rejected = rejected
        .into_iter()
        .map(|corners| RejectedCandidate { corners })
        .collect();

    Ok(Detections {
        observations,
        rejected,
    })
}
