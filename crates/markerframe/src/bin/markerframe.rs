//! markerframe CLI: batch marker corners, plane tools, rigid alignment and depth clouds.

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use markerframe::aruco::{ArucoDetector, DEFAULT_DICTIONARY};
use markerframe::batch::{collect_images, run_batch, BatchConfig};
use markerframe::core::{
    align_rigid, estimate_plane_frame, fit_plane, project_to_plane, project_to_xy,
    CornerSelection, SolveMode, SquarePoseSolver,
};
use markerframe::depth::{DepthImage, DepthToPointCloud};
use markerframe::estimate::MarkerSizes;
use markerframe::io::{load_calibration, read_points, write_points};
use markerframe::reconstruct::RowOrder;
use nalgebra::Matrix4;
use serde::Serialize;
use std::path::PathBuf;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "markerframe")]
#[command(
    about = "Reconstruct fiducial marker corners in the camera frame, and related geometry tools"
)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, value_enum, default_value_t = LogLevelArg::Info)]
    log_level: LogLevelArg,

    /// Emit JSON log lines (requires the `tracing` feature).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect markers in a folder of images and write their 3D corners.
    Markers(MarkersArgs),

    /// Fit a plane z = a*x + b*y + c to a point file.
    Plane(PlaneArgs),

    /// Estimate a coordinate frame on the best-fit plane of a point file.
    PlaneFrame(PlaneFrameArgs),

    /// Rigidly align source points onto corresponding target points.
    Align(AlignArgs),

    /// Convert a rectified depth image into a point cloud.
    DepthCloud(DepthCloudArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(l: LogLevelArg) -> Self {
        match l {
            LogLevelArg::Off => LevelFilter::Off,
            LogLevelArg::Error => LevelFilter::Error,
            LogLevelArg::Warn => LevelFilter::Warn,
            LogLevelArg::Info => LevelFilter::Info,
            LogLevelArg::Debug => LevelFilter::Debug,
            LogLevelArg::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// One pose per marker.
    Fast,
    /// Both ambiguous poses per marker, best first.
    Ranked,
}

impl From<ModeArg> for SolveMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Fast => SolveMode::Fast,
            ModeArg::Ranked => SolveMode::Ranked,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RowOrderArg {
    /// Corner, then marker, then pose candidate.
    CornerMajor,
    /// Marker, then corner, then pose candidate.
    MarkerMajor,
}

impl From<RowOrderArg> for RowOrder {
    fn from(o: RowOrderArg) -> Self {
        match o {
            RowOrderArg::CornerMajor => RowOrder::CornerMajor,
            RowOrderArg::MarkerMajor => RowOrder::MarkerMajor,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct MarkersArgs {
    /// Folder with the input images.
    #[arg(long)]
    images_folder: PathBuf,

    /// Image file extension to pick up.
    #[arg(long, default_value = "jpg")]
    images_extension: String,

    /// Camera calibration (.npz with K and D, or .json).
    #[arg(long)]
    camera_calibration: PathBuf,

    /// Marker side length; one value for all markers or one per detected marker.
    #[arg(long, required = true, num_args = 1..)]
    aruco_size: Vec<f64>,

    /// Write all four corners per marker instead of the top-left one.
    #[arg(long)]
    extract_all_corners: bool,

    /// Output point file (.npy or .json).
    #[arg(long)]
    out_file: PathBuf,

    /// Write annotated images into this folder.
    #[arg(long)]
    vis_folder: Option<PathBuf>,

    /// Marker dictionary: a built-in name such as DICT_4X4_50, or a JSON file.
    #[arg(long, default_value = DEFAULT_DICTIONARY)]
    dictionary: String,

    /// Detector parameters (JSON); defaults when omitted.
    #[arg(long)]
    detector_config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ModeArg::Fast)]
    mode: ModeArg,

    #[arg(long, value_enum, default_value_t = RowOrderArg::CornerMajor)]
    row_order: RowOrderArg,

    /// Fail unless every image shows exactly this many markers.
    #[arg(long)]
    expect_markers: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct PlaneArgs {
    /// N x 3 point file (.npy or .json).
    #[arg(short, long)]
    points_file: PathBuf,

    /// Also write the points projected onto the plane.
    #[arg(long)]
    out_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct PlaneFrameArgs {
    /// N x 3 point file (.npy or .json), N even.
    #[arg(short, long)]
    points_file: PathBuf,

    /// Write the 4x4 frame as JSON (row-major rows).
    #[arg(long)]
    out_file: Option<PathBuf>,

    /// Also write the points flattened onto the frame's XY plane.
    #[arg(long)]
    flatten_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct AlignArgs {
    /// Reference points (.npy or .json).
    #[arg(long)]
    target_points: PathBuf,

    /// Points to move onto the reference, same order.
    #[arg(long)]
    source_points: PathBuf,

    /// Write the alignment as JSON.
    #[arg(long)]
    out_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct DepthCloudArgs {
    /// Depth image: .npy (u16 millimetres or float metres) or 16-bit .png.
    #[arg(long)]
    depth: PathBuf,

    /// Camera calibration of the rectified depth stream.
    #[arg(long)]
    camera_calibration: PathBuf,

    /// Block size for min-pooling.
    #[arg(long, default_value = "8")]
    pool_size: usize,

    /// Output point file (.npy or .json).
    #[arg(long)]
    out_file: PathBuf,
}

fn init_logging(level: LevelFilter, json: bool) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    markerframe::core::init_tracing(level, json);
    #[cfg(not(feature = "tracing"))]
    {
        markerframe::core::init_with_level(level)?;
        if json {
            log::warn!("--log-json needs the `tracing` feature; using plain text");
        }
    }
    Ok(())
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.into(), cli.log_json)?;

    match cli.command {
        Commands::Markers(args) => run_markers(&args),
        Commands::Plane(args) => run_plane(&args),
        Commands::PlaneFrame(args) => run_plane_frame(&args),
        Commands::Align(args) => run_align(&args),
        Commands::DepthCloud(args) => run_depth_cloud(&args),
    }
}

// ── markers ────────────────────────────────────────────────────────────

fn run_markers(args: &MarkersArgs) -> CliResult<()> {
    let images = collect_images(&args.images_folder, &args.images_extension)?;
    log::info!("{} image(s) in {}", images.len(), args.images_folder.display());

    let camera = load_calibration(&args.camera_calibration)?;
    let detector = ArucoDetector::from_config(&args.dictionary, args.detector_config.as_deref())?;
    log::info!(
        "dictionary {} ({} ids)",
        detector.dictionary().name,
        detector.dictionary().len()
    );

    let config = BatchConfig {
        images,
        sizes: MarkerSizes::from_values(&args.aruco_size),
        mode: args.mode.into(),
        selection: if args.extract_all_corners {
            CornerSelection::All
        } else {
            CornerSelection::TopLeft
        },
        row_order: args.row_order.into(),
        output: args.out_file.clone(),
        vis_folder: args.vis_folder.clone(),
        expected_markers: args.expect_markers,
    };

    let report = run_batch(&config, &camera, &detector, &SquarePoseSolver::default())?;
    println!(
        "{} point(s) from {} image(s) written to {}",
        report.points.len(),
        report.images.len(),
        report.output.display()
    );
    Ok(())
}

// ── plane / plane-frame ────────────────────────────────────────────────

fn run_plane(args: &PlaneArgs) -> CliResult<()> {
    let points = read_points(&args.points_file)?;
    let plane = fit_plane(&points)?;
    let [a, b, c] = plane.coefficients();
    println!("{a} {b} {c}");

    if let Some(out) = &args.out_file {
        let projected: Vec<_> = points.iter().map(|p| project_to_plane(p, &plane)).collect();
        write_points(out, &projected)?;
    }
    Ok(())
}

fn matrix_rows(m: &Matrix4<f64>) -> [[f64; 4]; 4] {
    std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]))
}

fn run_plane_frame(args: &PlaneFrameArgs) -> CliResult<()> {
    let points = read_points(&args.points_file)?;
    let frame = estimate_plane_frame(&points)?;
    for row in matrix_rows(&frame) {
        println!("{} {} {} {}", row[0], row[1], row[2], row[3]);
    }

    if let Some(out) = &args.out_file {
        std::fs::write(out, serde_json::to_string_pretty(&matrix_rows(&frame))?)?;
    }
    if let Some(out) = &args.flatten_out {
        write_points(out, &project_to_xy(&points, &frame)?)?;
    }
    Ok(())
}

// ── align ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct AlignmentReport {
    rotation: [[f64; 3]; 3],
    translation: [f64; 3],
    /// `[rx, ry, rz, tx, ty, tz]`
    params: [f64; 6],
    rms: f64,
    residuals: Vec<f64>,
}

fn run_align(args: &AlignArgs) -> CliResult<()> {
    let target = read_points(&args.target_points)?;
    let source = read_points(&args.source_points)?;
    let alignment = align_rigid(&target, &source)?;
    let params = alignment.to_params()?;

    println!(
        "rotation (rad): {:.6} {:.6} {:.6}",
        params[0], params[1], params[2]
    );
    println!(
        "translation:    {:.6} {:.6} {:.6}",
        params[3], params[4], params[5]
    );
    println!("rms residual:   {:.6}", alignment.rms());

    if let Some(out) = &args.out_file {
        let t = alignment.translation;
        let report = AlignmentReport {
            rotation: std::array::from_fn(|r| std::array::from_fn(|c| alignment.rotation[(r, c)])),
            translation: [t.x, t.y, t.z],
            params,
            rms: alignment.rms(),
            residuals: alignment.residuals.clone(),
        };
        std::fs::write(out, serde_json::to_string_pretty(&report)?)?;
    }
    Ok(())
}

// ── depth-cloud ────────────────────────────────────────────────────────

fn run_depth_cloud(args: &DepthCloudArgs) -> CliResult<()> {
    let camera = load_calibration(&args.camera_calibration)?;
    let converter = DepthToPointCloud::new(camera, args.pool_size)?;
    let depth = DepthImage::load(&args.depth)?;
    let cloud = converter.convert(&depth)?;
    write_points(&args.out_file, &cloud)?;
    println!(
        "{} point(s) written to {}",
        cloud.len(),
        args.out_file.display()
    );
    Ok(())
}
