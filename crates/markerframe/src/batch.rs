//! Batch driver: detect, estimate and reconstruct over a folder of images.

use crate::detect::{detect_markers, load_gray};
use crate::estimate::{EstimateError, MarkerSizes, PoseEstimator};
use crate::io::{write_points, ArtifactError};
use crate::reconstruct::{CornerReconstructor, RowOrder};
use crate::vis::{save_visualization, VisError};
use markerframe_core::{
    CameraModel, CornerSelection, DetectError, MarkerDetector, PoseSolver, SolveMode,
};
use nalgebra::Point3;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("no images match {0}")]
    NoImages(String),
    #[error("invalid image pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("failed to list images: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{path}: {source}")]
    Detect {
        path: PathBuf,
        #[source]
        source: DetectError,
    },
    #[error("{path}: expected {expected} marker(s), detected {got}")]
    UnexpectedMarkerCount {
        path: PathBuf,
        expected: usize,
        got: usize,
    },
    #[error("{path}: {source}")]
    Estimate {
        path: PathBuf,
        #[source]
        source: EstimateError,
    },
    #[error(transparent)]
    Vis(#[from] VisError),
    #[error("failed to write {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: ArtifactError,
    },
}

/// Everything a batch run needs besides the camera and the two backends.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Images in processing order.
    pub images: Vec<PathBuf>,
    pub sizes: MarkerSizes,
    pub mode: SolveMode,
    pub selection: CornerSelection,
    pub row_order: RowOrder,
    /// `.npy` or `.json` point artifact.
    pub output: PathBuf,
    pub vis_folder: Option<PathBuf>,
    /// Abort when an image does not show exactly this many markers.
    pub expected_markers: Option<usize>,
}

impl BatchConfig {
    pub fn new(images: Vec<PathBuf>, sizes: MarkerSizes, output: impl Into<PathBuf>) -> Self {
        Self {
            images,
            sizes,
            mode: SolveMode::default(),
            selection: CornerSelection::default(),
            row_order: RowOrder::default(),
            output: output.into(),
            vis_folder: None,
            expected_markers: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageSummary {
    pub path: PathBuf,
    /// Detected ids, ascending.
    pub ids: Vec<u32>,
    pub rows: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchReport {
    pub images: Vec<ImageSummary>,
    /// All rows, in the order they were written.
    pub points: Vec<Point3<f64>>,
    pub output: PathBuf,
}

/// Files `folder/*.<extension>`, sorted by path.
pub fn collect_images(folder: &Path, extension: &str) -> Result<Vec<PathBuf>, BatchError> {
    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&folder.to_string_lossy()),
        glob::Pattern::escape(extension.trim_start_matches('.'))
    );
    let mut images = glob::glob(&pattern)?.collect::<Result<Vec<_>, _>>()?;
    if images.is_empty() {
        return Err(BatchError::NoImages(pattern));
    }
    images.sort();
    Ok(images)
}

fn create_dir(path: &Path) -> Result<(), BatchError> {
    std::fs::create_dir_all(path).map_err(|source| BatchError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Process `config.images` in order and write all rows to `config.output`.
///
/// The first failing image aborts the run; the artifact is only written once
/// every image went through.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(images = config.images.len()))
)]
pub fn run_batch<D, S>(
    config: &BatchConfig,
    camera: &CameraModel,
    detector: &D,
    solver: &S,
) -> Result<BatchReport, BatchError>
where
    D: MarkerDetector + ?Sized,
    S: PoseSolver + ?Sized,
{
    if config.images.is_empty() {
        return Err(BatchError::NoImages("an empty image list".into()));
    }
    if let Some(parent) = config.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(parent)?;
    }
    if let Some(vis) = &config.vis_folder {
        create_dir(vis)?;
    }

    let estimator = PoseEstimator::new(solver, config.mode);
    let reconstructor = CornerReconstructor::new(config.selection, config.row_order);

    let mut points = Vec::new();
    let mut images = Vec::with_capacity(config.images.len());
    for path in &config.images {
        let gray = load_gray(path).map_err(|source| BatchError::Image {
            path: path.clone(),
            source,
        })?;
        let detections = detect_markers(detector, &gray).map_err(|source| BatchError::Detect {
            path: path.clone(),
            source,
        })?;
        log::info!(
            "{} : detected {} marker(s)",
            display_name(path),
            detections.len()
        );

        if let Some(expected) = config.expected_markers {
            if detections.len() != expected {
                return Err(BatchError::UnexpectedMarkerCount {
                    path: path.clone(),
                    expected,
                    got: detections.len(),
                });
            }
        }

        let poses = estimator
            .estimate(&detections.observations, &config.sizes, camera)
            .map_err(|source| BatchError::Estimate {
                path: path.clone(),
                source,
            })?;
        let rows = reconstructor.reconstruct(&poses);

        if let Some(vis) = &config.vis_folder {
            save_visualization(vis, path, &gray, &detections, &poses, camera)?;
        }

        images.push(ImageSummary {
            path: path.clone(),
            ids: detections.ids(),
            rows: rows.len(),
        });
        points.extend(rows);
    }

    write_points(&config.output, &points).map_err(|source| BatchError::Artifact {
        path: config.output.clone(),
        source,
    })?;
    log::info!(
        "wrote {} point(s) from {} image(s) to {}",
        points.len(),
        images.len(),
        config.output.display()
    );

    Ok(BatchReport {
        images,
        points,
        output: config.output.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_matching_files_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.jpg", "a.jpg", "c.png", "a.jpg.txt"] {
            std::fs::write(dir.path().join(name), b"").expect("touch");
        }
        let images = collect_images(dir.path(), "jpg").expect("images");
        let names: Vec<String> = images.iter().map(|p| display_name(p)).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);

        let dotted = collect_images(dir.path(), ".png").expect("images");
        assert_eq!(dotted.len(), 1);
    }

    #[test]
    fn empty_folder_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            collect_images(dir.path(), "jpg"),
            Err(BatchError::NoImages(_))
        ));
    }
}
