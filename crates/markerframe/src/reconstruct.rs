//! Camera-frame marker corners from estimated poses.

use crate::estimate::MarkerPoses;
use markerframe_core::{marker_corner, CornerSelection};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Nesting of the output rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// Corner, then marker, then pose candidate.
    #[default]
    CornerMajor,
    /// Marker, then corner, then pose candidate.
    MarkerMajor,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerReconstructor {
    pub selection: CornerSelection,
    pub order: RowOrder,
}

impl CornerReconstructor {
    pub fn new(selection: CornerSelection, order: RowOrder) -> Self {
        Self { selection, order }
    }

    /// Rows per image: `corners * markers * candidates`.
    pub fn reconstruct(&self, poses: &[MarkerPoses]) -> Vec<Point3<f64>> {
        let corners = self.selection.indices();
        let mut rows = Vec::new();
        match self.order {
            RowOrder::CornerMajor => {
                for &c in corners {
                    for marker in poses {
                        rows.extend(
                            marker
                                .candidates
                                .iter()
                                .map(|pose| marker_corner(pose, marker.size, c)),
                        );
                    }
                }
            }
            RowOrder::MarkerMajor => {
                for marker in poses {
                    for &c in corners {
                        rows.extend(
                            marker
                                .candidates
                                .iter()
                                .map(|pose| marker_corner(pose, marker.size, c)),
                        );
                    }
                }
            }
        }
        rows
    }
}
