//! calibrate - chessboard camera calibration
//!
//! Hold a printed chessboard (9x6 inner corners by default) in front of the
//! camera. Type `c` + Enter to capture the current view when its corners are
//! visible, `q` + Enter to finish once at least 15 views are captured. The
//! camera matrix and distortion coefficients are written as JSON.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use vision_range::ui::{Ui, UiMode};
use vision_range::{
    AnnotationSink, ArtifactPaths, CalibrationSession, Calibrator, Camera, CornerFinder,
    FrameLoop, RangeConfig, TerminalControls,
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
    /// Inner corners per chessboard row.
    #[arg(long)]
    cols: Option<u32>,
    /// Inner corners per chessboard column.
    #[arg(long)]
    rows: Option<u32>,
    /// Chessboard square edge length.
    #[arg(long)]
    square_size: Option<f64>,
    /// Views required before calibration can finish.
    #[arg(long)]
    min_samples: Option<usize>,
    /// Directory receiving camera_matrix.json and dist_coeffs.json.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Write annotated frames to this directory.
    #[arg(long)]
    annotate_dir: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::detect(args.ui);

    let mut cfg = RangeConfig::load_from(args.config.as_deref())?;
    if let Some(device) = args.device {
        cfg.camera.device = device;
    }
    if let Some(cols) = args.cols {
        cfg.calibration.pattern.inner_cols = cols;
    }
    if let Some(rows) = args.rows {
        cfg.calibration.pattern.inner_rows = rows;
    }
    if let Some(square_size) = args.square_size {
        cfg.calibration.pattern.square_size = square_size;
    }
    if let Some(min_samples) = args.min_samples {
        cfg.calibration.min_samples = min_samples;
    }
    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)?;
        cfg.calibration.artifacts = ArtifactPaths::in_dir(dir);
    }
    if args.annotate_dir.is_some() {
        cfg.annotate_dir = args.annotate_dir;
    }
    cfg.validate()?;

    let mut backend = open_backend()?;
    let pattern = cfg.calibration.pattern;
    let mut session = CalibrationSession::new(pattern, cfg.calibration.min_samples);
    log::info!(
        "looking for a {}x{} chessboard; c = capture, q = finish ({} views needed)",
        pattern.inner_cols,
        pattern.inner_rows,
        cfg.calibration.min_samples
    );

    let summary = {
        let camera = Camera::open(&cfg.camera)?;
        let controls = TerminalControls::spawn()?;
        let sink = AnnotationSink::optional(cfg.annotate_dir.as_deref())?;
        let mut frames = FrameLoop::new(camera, controls)
            .with_sink(sink)
            .with_max_frames(args.max_frames);
        let progress = ui.capture_progress(cfg.calibration.min_samples);
        frames.run_calibration(backend.as_finder(), &mut session, &progress)?
    };
    log::info!(
        "captured {} views over {} frames ({} with the board visible)",
        summary.samples,
        summary.frames,
        summary.frames_with_corners
    );

    let artifacts = {
        let _stage = ui.stage("Solve camera calibration");
        session.calibrate(backend.as_calibrator())?
    };
    if let Some(rms) = artifacts.rms_error {
        log::info!("RMS reprojection error: {:.4} px", rms);
    }
    artifacts.save(&cfg.calibration.artifacts)?;
    log::info!(
        "camera matrix saved to {}, distortion coefficients saved to {}",
        cfg.calibration.artifacts.camera_matrix.display(),
        cfg.calibration.artifacts.dist_coeffs.display()
    );
    Ok(())
}

/// Corner search and solver, provided by one library.
trait CalibrationBackend: CornerFinder + Calibrator {
    fn as_finder(&mut self) -> &mut dyn CornerFinder;
    fn as_calibrator(&mut self) -> &mut dyn Calibrator;
}

impl<T: CornerFinder + Calibrator> CalibrationBackend for T {
    fn as_finder(&mut self) -> &mut dyn CornerFinder {
        self
    }

    fn as_calibrator(&mut self) -> &mut dyn Calibrator {
        self
    }
}

#[cfg(feature = "backend-opencv")]
fn open_backend() -> Result<Box<dyn CalibrationBackend>> {
    Ok(Box::new(vision_range::calibration::OpenCvCalibration::new()))
}

#[cfg(not(feature = "backend-opencv"))]
fn open_backend() -> Result<Box<dyn CalibrationBackend>> {
    Err(anyhow::anyhow!(
        "calibration requires the backend-opencv feature; rebuild with --features backend-opencv"
    ))
}
