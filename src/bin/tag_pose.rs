//! tag-pose - AprilTag (tag36h11) pose from a single camera
//!
//! Intrinsics come from the calibration artifacts, or with `--manual` from a
//! focal length plus the frame centre. Reports each tag's id and camera-frame
//! translation. Type `q` + Enter or press Ctrl-C to stop.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use vision_range::fiducial::{FiducialDetector, TAG_FAMILY};
use vision_range::{
    AnnotationSink, CalibrationArtifacts, Camera, CameraIntrinsics, FrameLoop, RangeConfig,
    TerminalControls,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "VISION_RANGE_CONFIG")]
    config: Option<PathBuf>,
    /// Camera device: a V4L2 node, dir://<path> or stub://<name>.
    #[arg(long)]
    device: Option<String>,
    /// Printed tag edge length, cm.
    #[arg(long)]
    tag_size_cm: Option<f64>,
    /// Use a manual focal length instead of the calibration artifacts.
    #[arg(long)]
    manual: bool,
    /// Focal length in pixels for `--manual`.
    #[arg(long, requires = "manual")]
    focal_length_px: Option<f64>,
    /// Directory holding camera_matrix.json and dist_coeffs.json.
    #[arg(long, conflicts_with = "manual")]
    calibration_dir: Option<PathBuf>,
    /// Write annotated frames to this directory.
    #[arg(long)]
    annotate_dir: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = RangeConfig::load_from(args.config.as_deref())?;
    if let Some(device) = args.device {
        cfg.camera.device = device;
    }
    if let Some(size) = args.tag_size_cm {
        cfg.fiducial.tag_size_cm = size;
    }
    if let Some(focal) = args.focal_length_px {
        cfg.fiducial.manual_focal_length_px = focal;
    }
    if let Some(dir) = &args.calibration_dir {
        cfg.calibration.artifacts = vision_range::ArtifactPaths::in_dir(dir);
    }
    if args.annotate_dir.is_some() {
        cfg.annotate_dir = args.annotate_dir;
    }
    cfg.validate()?;

    let intrinsics = load_intrinsics(&cfg, args.manual)?;
    log::info!(
        "intrinsics fx={:.2} fy={:.2} cx={:.1} cy={:.1}; {} tags of {} cm",
        intrinsics.fx,
        intrinsics.fy,
        intrinsics.cx,
        intrinsics.cy,
        TAG_FAMILY,
        cfg.fiducial.tag_size_cm
    );

    let mut detector = open_detector()?;
    let camera = Camera::open(&cfg.camera)?;
    let controls = TerminalControls::spawn()?;
    let sink = AnnotationSink::optional(cfg.annotate_dir.as_deref())?;
    let mut frames = FrameLoop::new(camera, controls)
        .with_sink(sink)
        .with_max_frames(args.max_frames);

    let summary = frames.run_tag_pose(detector.as_mut(), &intrinsics, cfg.fiducial.tag_size_cm)?;
    log::info!(
        "stopped ({:?}) after {} frames, {} tag sightings",
        summary.exit,
        summary.frames,
        summary.markers
    );
    Ok(())
}

fn load_intrinsics(cfg: &RangeConfig, manual: bool) -> Result<CameraIntrinsics> {
    if manual {
        return cfg.manual_tag_intrinsics();
    }
    CalibrationArtifacts::load(&cfg.calibration.artifacts)?.intrinsics()
}

#[cfg(feature = "fiducial-apriltag")]
fn open_detector() -> Result<Box<dyn FiducialDetector>> {
    Ok(Box::new(vision_range::fiducial::AprilTagBackend::new()?))
}

#[cfg(not(feature = "fiducial-apriltag"))]
fn open_detector() -> Result<Box<dyn FiducialDetector>> {
    Err(anyhow::anyhow!(
        "tag detection requires the fiducial-apriltag feature; rebuild with --features fiducial-apriltag"
    ))
}
