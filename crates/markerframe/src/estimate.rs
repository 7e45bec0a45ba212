//! Pose estimation stage: one or two pose candidates per observed marker.

use markerframe_core::{
    marker_object_points, CameraModel, MarkerObservation, PoseCandidate, PoseSolveError,
    PoseSolver, SolveMode,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EstimateError {
    #[error("{sizes} marker sizes given for {markers} detected markers")]
    SizeCountMismatch { sizes: usize, markers: usize },
    #[error("marker size #{index} is {size}; sizes must be finite and positive")]
    InvalidSize { index: usize, size: f64 },
    #[error("pose solver failed for marker {id}: {source}")]
    Solver {
        id: u32,
        #[source]
        source: PoseSolveError,
    },
    #[error("pose solver returned {got} candidates for marker {id}, expected {expected}")]
    CandidateCount { id: u32, expected: usize, got: usize },
    #[error("ranked pose candidates for marker {id} are not in ascending error order: {errors:?}")]
    UnsortedCandidates { id: u32, errors: Vec<Option<f64>> },
}

/// Physical marker side length(s), in the unit of the output points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerSizes {
    /// One size for every marker.
    Shared(f64),
    /// One size per observation, in sorted-id order.
    PerMarker(Vec<f64>),
}

impl MarkerSizes {
    /// Build from command-line style values: one value is shared, more are per marker.
    pub fn from_values(values: &[f64]) -> Self {
        match values {
            [s] => MarkerSizes::Shared(*s),
            many => MarkerSizes::PerMarker(many.to_vec()),
        }
    }

    /// Per-observation sizes for `markers` observations.
    pub fn resolve(&self, markers: usize) -> Result<Vec<f64>, EstimateError> {
        let sizes = match self {
            MarkerSizes::Shared(s) => vec![*s; markers],
            MarkerSizes::PerMarker(v) if v.len() == markers => v.clone(),
            MarkerSizes::PerMarker(v) => {
                return Err(EstimateError::SizeCountMismatch {
                    sizes: v.len(),
                    markers,
                })
            }
        };
        if let Some((index, &size)) = sizes
            .iter()
            .enumerate()
            .find(|(_, s)| !(s.is_finite() && **s > 0.0))
        {
            return Err(EstimateError::InvalidSize { index, size });
        }
        Ok(sizes)
    }
}

/// Pose candidates of one observed marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPoses {
    pub id: u32,
    pub size: f64,
    pub candidates: Vec<PoseCandidate>,
}

#[derive(Clone, Debug, Default)]
pub struct PoseEstimator<S> {
    solver: S,
    mode: SolveMode,
}

impl<S: PoseSolver> PoseEstimator<S> {
    pub fn new(solver: S, mode: SolveMode) -> Self {
        Self { solver, mode }
    }

    pub fn mode(&self) -> SolveMode {
        self.mode
    }

    /// Solve every observation, in order.
    ///
    /// Sizes are validated before the first solve; no partial result is
    /// returned on error. With no observations the sizes are not looked at.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip_all,
            fields(markers = observations.len(), mode = ?self.mode)
        )
    )]
    pub fn estimate(
        &self,
        observations: &[MarkerObservation],
        sizes: &MarkerSizes,
        camera: &CameraModel,
    ) -> Result<Vec<MarkerPoses>, EstimateError> {
        if observations.is_empty() {
            return Ok(Vec::new());
        }
        let sizes = sizes.resolve(observations.len())?;

        observations
            .iter()
            .zip(sizes)
            .map(|(obs, size)| {
                let image_points: [Point2<f64>; 4] = std::array::from_fn(|i| {
                    Point2::new(obs.corners[i].x as f64, obs.corners[i].y as f64)
                });
                let candidates = self
                    .solver
                    .solve(&image_points, &marker_object_points(size), camera, self.mode)
                    .map_err(|source| EstimateError::Solver { id: obs.id, source })?;
                self.check_candidates(obs.id, &candidates)?;
                Ok(MarkerPoses {
                    id: obs.id,
                    size,
                    candidates,
                })
            })
            .collect()
    }

    fn check_candidates(&self, id: u32, candidates: &[PoseCandidate]) -> Result<(), EstimateError> {
        let expected = self.mode.expected_candidates();
        if candidates.len() != expected {
            return Err(EstimateError::CandidateCount {
                id,
                expected,
                got: candidates.len(),
            });
        }
        if self.mode == SolveMode::Ranked {
            let errors: Vec<Option<f64>> =
                candidates.iter().map(|c| c.reprojection_error).collect();
            let sorted = matches!(errors.as_slice(), [Some(a), Some(b)] if a <= b);
            if !sorted {
                log::error!(
                    "marker {id}: ranked pose candidates violate ascending error order {errors:?}"
                );
                return Err(EstimateError::UnsortedCandidates { id, errors });
            }
        }
        Ok(())
    }
}
