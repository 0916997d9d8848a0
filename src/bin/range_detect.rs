//! range-detect - object detection with monocular distance estimates
//!
//! Runs the configured detector on every frame and estimates each detection's
//! distance from its apparent size. `--no-range` only reports detections.
//! Type `q` + Enter, `esc` + Enter or press Ctrl-C to stop.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use vision_range::detect::BackendRegistry;
use vision_range::ui::{Ui, UiMode};
use vision_range::{
    AnnotationSink, BlobBackend, CalibrationArtifacts, Camera, DistanceEstimator, FrameLoop,
    ObjectSpec, RangeConfig, TerminalControls,
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
    /// Detector backend (blob, tract).
    #[arg(long)]
    backend: Option<String>,
    /// ONNX model for the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Minimum confidence for a detection to be reported.
    #[arg(long)]
    confidence: Option<f32>,
    /// Real size of the tracked object, cm.
    #[arg(long)]
    object_size_cm: Option<f64>,
    /// Focal length in pixels used for ranging.
    #[arg(long, conflicts_with = "calibrated")]
    focal_length_px: Option<f64>,
    /// Take the focal length from the calibration artifacts instead.
    #[arg(long)]
    calibrated: bool,
    /// Report detections only, without distances.
    #[arg(long)]
    no_range: bool,
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
    if let Some(backend) = args.backend {
        cfg.detector.backend = backend;
    }
    if let Some(model) = args.model {
        cfg.detector.model_path = model;
    }
    if let Some(confidence) = args.confidence {
        cfg.detector.confidence = confidence;
    }
    if let Some(size) = args.object_size_cm {
        cfg.object.real_size_cm = size;
    }
    if let Some(focal) = args.focal_length_px {
        cfg.object.focal_length_px = focal;
    }
    if args.annotate_dir.is_some() {
        cfg.annotate_dir = args.annotate_dir;
    }
    cfg.validate()?;

    let estimator = if args.no_range {
        None
    } else if args.calibrated {
        let artifacts = CalibrationArtifacts::load(&cfg.calibration.artifacts)?;
        let object = ObjectSpec::new(cfg.object.name.clone(), cfg.object.real_size_cm)?;
        Some(DistanceEstimator::new(object, artifacts.intrinsics()?))
    } else {
        Some(cfg.estimator()?)
    };
    if let Some(estimator) = &estimator {
        log::info!(
            "ranging {} ({} cm) with focal length {:.3} px",
            estimator.object().name,
            estimator.object().real_size_cm,
            estimator.intrinsics().focal_length_px()
        );
    }

    let mut registry = {
        let _stage = ui.stage("Load detector");
        build_registry(&cfg)?
    };
    registry.set_default(&cfg.detector.backend)?;
    let mut detector = registry.take_default()?;
    detector.warm_up()?;
    log::info!("detector backend: {}", detector.name());

    let camera = Camera::open(&cfg.camera)?;
    let controls = TerminalControls::spawn()?;
    let sink = AnnotationSink::optional(cfg.annotate_dir.as_deref())?;
    let mut frames = FrameLoop::new(camera, controls)
        .with_sink(sink)
        .with_max_frames(args.max_frames);

    let summary = frames.run_detection(
        detector.as_mut(),
        estimator.as_ref(),
        &cfg.class_names(),
        cfg.detector.confidence,
    )?;
    log::info!(
        "stopped ({:?}) after {} frames, {} detections reported",
        summary.exit,
        summary.frames,
        summary.detections
    );
    if let Some(nearest) = summary.nearest_cm {
        log::info!("nearest object: {}", vision_range::geometry::format_metres(nearest));
    }
    if frames.sink().is_enabled() {
        log::info!("{} annotated frames written", frames.sink().written());
    }
    Ok(())
}

fn build_registry(cfg: &RangeConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(BlobBackend::default());

    if cfg.detector.backend == "tract" {
        register_tract(&mut registry, cfg)?;
    }
    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn register_tract(registry: &mut BackendRegistry, cfg: &RangeConfig) -> Result<()> {
    let backend =
        vision_range::detect::TractBackend::new(&cfg.detector.model_path, cfg.yolo_params())?;
    registry.register(backend);
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_tract(_registry: &mut BackendRegistry, cfg: &RangeConfig) -> Result<()> {
    Err(anyhow::anyhow!(
        "detector backend 'tract' (model {}) requires the backend-tract feature; \
         rebuild with --features backend-tract or use --backend blob",
        cfg.detector.model_path.display()
    ))
}
