//! Square-marker detector: quad search, bit decoding and dictionary lookup.

use crate::decode::{decode_quad, DecodeParams};
use crate::quad::{find_quads, quad_contains, QuadCandidate, QuadParams};
use crate::threshold::otsu_threshold;
use crate::{Dictionary, DictionaryError, Matcher};
use markerframe_core::{GrayImageView, MarkerDetector, Quad, RawDetections};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum ArucoError {
    #[error("failed to read detector config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse detector config: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
}

/// Detector configuration, loadable from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArucoParams {
    /// Fixed binarization threshold; `None` uses the image's Otsu threshold.
    pub threshold: Option<u8>,
    /// Maximum corrected bits, capped at the dictionary's capacity.
    pub max_hamming: u8,
    pub quad: QuadParams,
    pub decode: DecodeParams,
}

impl Default for ArucoParams {
    fn default() -> Self {
        Self {
            threshold: None,
            max_hamming: u8::MAX,
            quad: QuadParams::default(),
            decode: DecodeParams::default(),
        }
    }
}

impl ArucoParams {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ArucoError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// One identified marker with its decoding diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct ArucoMarker {
    pub id: u32,
    /// Image corners, corner 0 at the marker's top-left.
    pub corners: Quad,
    pub rotation: u8,
    pub hamming: u8,
    pub border_score: f32,
}

/// Detector output before normalization; markers are in scan order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArucoDetections {
    pub markers: Vec<ArucoMarker>,
    pub rejected: Vec<Quad>,
}

#[derive(Clone, Debug)]
pub struct ArucoDetector {
    params: ArucoParams,
    matcher: Matcher,
}

impl ArucoDetector {
    pub fn new(dictionary: Dictionary, params: ArucoParams) -> Self {
        let matcher = Matcher::new(dictionary, params.max_hamming);
        Self { params, matcher }
    }

    /// Resolve the dictionary by built-in name or JSON path, and load detector
    /// parameters from JSON when given.
    pub fn from_config(dictionary: &str, params: Option<&Path>) -> Result<Self, ArucoError> {
        let dict = Dictionary::from_name_or_path(dictionary)?;
        let params = match params {
            Some(p) => ArucoParams::load_json(p)?,
            None => ArucoParams::default(),
        };
        Ok(Self::new(dict, params))
    }

    pub fn params(&self) -> &ArucoParams {
        &self.params
    }

    pub fn dictionary(&self) -> &Dictionary {
        self.matcher.dictionary()
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(w = image.width, h = image.height))
    )]
    pub fn detect_markers(&self, image: &GrayImageView<'_>) -> ArucoDetections {
        let threshold = self
            .params
            .threshold
            .unwrap_or_else(|| otsu_threshold(image));
        let bits = self.matcher.dictionary().marker_size;

        let mut markers = Vec::new();
        let mut undecoded: Vec<QuadCandidate> = Vec::new();
        for cand in find_quads(image, threshold, &self.params.quad) {
            let hit = decode_quad(image, &cand.corners, bits, &self.params.decode).and_then(|d| {
                self.matcher
                    .match_code(d.code)
                    .map(|m| (m, d.border_score))
            });
            match hit {
                Some((m, border_score)) => {
                    let rot = m.rotation as usize;
                    let q = cand.corners;
                    markers.push(ArucoMarker {
                        id: m.id,
                        corners: std::array::from_fn(|k| q[(k + rot) % 4]),
                        rotation: m.rotation,
                        hamming: m.hamming,
                        border_score,
                    });
                }
                None => undecoded.push(cand),
            }
        }

        // inner blobs of accepted markers (isolated payload bits) are not candidates
        let rejected: Vec<Quad> = undecoded
            .into_iter()
            .filter(|c| {
                let center = c.center();
                !markers.iter().any(|m| quad_contains(&m.corners, &center))
            })
            .map(|c| c.corners)
            .collect();

        log::debug!(
            "{}: {} markers, {} rejected candidates",
            self.matcher.dictionary().name,
            markers.len(),
            rejected.len()
        );
        ArucoDetections { markers, rejected }
    }
}

impl MarkerDetector for ArucoDetector {
    fn detect_raw(&self, image: &GrayImageView<'_>) -> RawDetections {
        let det = self.detect_markers(image);
        RawDetections {
            ids: det.markers.iter().map(|m| m.id).collect(),
            corners: det.markers.iter().map(|m| m.corners).collect(),
            rejected: det.rejected,
        }
    }
}
