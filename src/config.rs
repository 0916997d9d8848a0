//! Run configuration.
//!
//! Built-in defaults, then an optional file named by `VISION_RANGE_CONFIG`
//! (JSON, or TOML for a `.toml` extension), then `VISION_RANGE_*` environment
//! overrides, then validation. Command-line flags are applied by the binaries
//! afterwards and re-validated.
//!
//! All physical lengths are centimetres.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::calibration::{ArtifactPaths, ChessboardPattern, MIN_CALIBRATION_SAMPLES};
use crate::detect::yolo::YoloParams;
use crate::detect::ClassNames;
use crate::geometry::{CameraIntrinsics, DistanceEstimator, ObjectSpec};
use crate::ingest::CameraConfig;

pub const CONFIG_ENV: &str = "VISION_RANGE_CONFIG";

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;
/// ONNX inference when it is compiled in, otherwise the CPU blob detector.
#[cfg(feature = "backend-tract")]
const DEFAULT_BACKEND: &str = "tract";
#[cfg(not(feature = "backend-tract"))]
const DEFAULT_BACKEND: &str = "blob";
const DEFAULT_MODEL_PATH: &str = "runs/detect/train13/weights/best.onnx";
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_OBJECT_NAME: &str = "ball";
const DEFAULT_OBJECT_SIZE_CM: f64 = 6.8;
const DEFAULT_FOCAL_LENGTH_PX: f64 = 718.409779;
const DEFAULT_TAG_SIZE_CM: f64 = 7.7;
const DEFAULT_MANUAL_TAG_FOCAL_PX: f64 = 839.6533065;
const DEFAULT_CHESSBOARD_COLS: u32 = 9;
const DEFAULT_CHESSBOARD_ROWS: u32 = 6;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RangeConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    object: Option<ObjectConfigFile>,
    fiducial: Option<FiducialConfigFile>,
    calibration: Option<CalibrationConfigFile>,
    annotate_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    confidence: Option<f32>,
    iou: Option<f32>,
    input_size: Option<u32>,
    class_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ObjectConfigFile {
    name: Option<String>,
    real_size_cm: Option<f64>,
    focal_length_px: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FiducialConfigFile {
    tag_size_cm: Option<f64>,
    manual_focal_length_px: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CalibrationConfigFile {
    inner_cols: Option<u32>,
    inner_rows: Option<u32>,
    square_size: Option<f64>,
    min_samples: Option<usize>,
    camera_matrix_path: Option<PathBuf>,
    dist_coeffs_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RangeConfig {
    pub camera: CameraConfig,
    pub detector: DetectorSettings,
    pub object: ObjectSettings,
    pub fiducial: FiducialSettings,
    pub calibration: CalibrationSettings,
    pub annotate_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub confidence: f32,
    pub iou: f32,
    pub input_size: u32,
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ObjectSettings {
    pub name: String,
    pub real_size_cm: f64,
    /// Focal length used for ranging.
    pub focal_length_px: f64,
}

#[derive(Debug, Clone)]
pub struct FiducialSettings {
    pub tag_size_cm: f64,
    /// Focal length used when no calibration artifacts are loaded.
    pub manual_focal_length_px: f64,
}

#[derive(Debug, Clone)]
pub struct CalibrationSettings {
    pub pattern: ChessboardPattern,
    pub min_samples: usize,
    pub artifacts: ArtifactPaths,
}

impl RangeConfig {
    /// Load from `VISION_RANGE_CONFIG` (if set) plus environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults) plus environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RangeConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let object = file.object.unwrap_or_default();
        let fiducial = file.fiducial.unwrap_or_default();
        let calibration = file.calibration.unwrap_or_default();
        let default_artifacts = ArtifactPaths::default();

        Self {
            camera: CameraConfig {
                device: camera.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_FPS),
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                confidence: detector.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                iou: detector.iou.unwrap_or(DEFAULT_IOU),
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                class_names: detector
                    .class_names
                    .unwrap_or_else(|| vec![DEFAULT_OBJECT_NAME.to_string()]),
            },
            object: ObjectSettings {
                name: object
                    .name
                    .unwrap_or_else(|| DEFAULT_OBJECT_NAME.to_string()),
                real_size_cm: object.real_size_cm.unwrap_or(DEFAULT_OBJECT_SIZE_CM),
                focal_length_px: object.focal_length_px.unwrap_or(DEFAULT_FOCAL_LENGTH_PX),
            },
            fiducial: FiducialSettings {
                tag_size_cm: fiducial.tag_size_cm.unwrap_or(DEFAULT_TAG_SIZE_CM),
                manual_focal_length_px: fiducial
                    .manual_focal_length_px
                    .unwrap_or(DEFAULT_MANUAL_TAG_FOCAL_PX),
            },
            calibration: CalibrationSettings {
                pattern: ChessboardPattern {
                    inner_cols: calibration.inner_cols.unwrap_or(DEFAULT_CHESSBOARD_COLS),
                    inner_rows: calibration.inner_rows.unwrap_or(DEFAULT_CHESSBOARD_ROWS),
                    square_size: calibration.square_size.unwrap_or(1.0),
                },
                min_samples: calibration.min_samples.unwrap_or(MIN_CALIBRATION_SAMPLES),
                artifacts: ArtifactPaths {
                    camera_matrix: calibration
                        .camera_matrix_path
                        .unwrap_or(default_artifacts.camera_matrix),
                    dist_coeffs: calibration
                        .dist_coeffs_path
                        .unwrap_or(default_artifacts.dist_coeffs),
                },
            },
            annotate_dir: file.annotate_dir,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = env_string("VISION_RANGE_DEVICE") {
            self.camera.device = device;
        }
        if let Some(backend) = env_string("VISION_RANGE_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(model) = env_string("VISION_RANGE_MODEL") {
            self.detector.model_path = PathBuf::from(model);
        }
        if let Some(conf) = env_parse::<f32>("VISION_RANGE_CONFIDENCE")? {
            self.detector.confidence = conf;
        }
        if let Some(size) = env_parse::<f64>("VISION_RANGE_OBJECT_SIZE_CM")? {
            self.object.real_size_cm = size;
        }
        if let Some(focal) = env_parse::<f64>("VISION_RANGE_FOCAL_LENGTH_PX")? {
            self.object.focal_length_px = focal;
        }
        if let Some(size) = env_parse::<f64>("VISION_RANGE_TAG_SIZE_CM")? {
            self.fiducial.tag_size_cm = size;
        }
        if let Some(dir) = env_string("VISION_RANGE_ANNOTATE_DIR") {
            self.annotate_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Check every constant the loops rely on.
    pub fn validate(&self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        for (name, value) in [
            ("detector confidence", self.detector.confidence),
            ("detector iou", self.detector.iou),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input size must be non-zero"));
        }
        for (name, value) in [
            ("object real_size_cm", self.object.real_size_cm),
            ("object focal_length_px", self.object.focal_length_px),
            ("fiducial tag_size_cm", self.fiducial.tag_size_cm),
            ("fiducial manual_focal_length_px", self.fiducial.manual_focal_length_px),
            ("calibration square_size", self.calibration.pattern.square_size),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(anyhow!("{} must be positive, got {}", name, value));
            }
        }
        let pattern = &self.calibration.pattern;
        if pattern.inner_cols < 2 || pattern.inner_rows < 2 {
            return Err(anyhow!(
                "chessboard needs at least 2x2 inner corners, got {}x{}",
                pattern.inner_cols,
                pattern.inner_rows
            ));
        }
        if self.calibration.min_samples == 0 {
            return Err(anyhow!("calibration min_samples must be at least 1"));
        }
        Ok(())
    }

    pub fn estimator(&self) -> Result<DistanceEstimator> {
        let object = ObjectSpec::new(self.object.name.clone(), self.object.real_size_cm)?;
        let intrinsics = CameraIntrinsics::from_focal_length(
            self.object.focal_length_px,
            self.camera.width,
            self.camera.height,
        )?;
        Ok(DistanceEstimator::new(object, intrinsics))
    }

    pub fn class_names(&self) -> ClassNames {
        ClassNames::new(self.detector.class_names.clone())
    }

    pub fn yolo_params(&self) -> YoloParams {
        YoloParams {
            input_size: self.detector.input_size,
            conf_threshold: self.detector.confidence,
            iou_threshold: self.detector.iou,
            ..YoloParams::default()
        }
    }

    /// Intrinsics for fiducial pose when no calibration artifacts are used.
    pub fn manual_tag_intrinsics(&self) -> Result<CameraIntrinsics> {
        CameraIntrinsics::from_focal_length(
            self.fiducial.manual_focal_length_px,
            self.camera.width,
            self.camera.height,
        )
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number, got {:?}", key, raw)),
        None => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<RangeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_setup() -> Result<()> {
        let cfg = RangeConfig::from_file(RangeConfigFile::default());
        cfg.validate()?;
        assert_eq!(cfg.object.real_size_cm, 6.8);
        assert_eq!(cfg.object.focal_length_px, 718.409779);
        assert_eq!(cfg.fiducial.tag_size_cm, 7.7);
        assert_eq!(cfg.calibration.min_samples, 15);
        assert_eq!(cfg.calibration.pattern.corner_count(), 54);
        assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
        Ok(())
    }

    #[test]
    fn default_backend_is_always_compiled_in() {
        let cfg = RangeConfig::from_file(RangeConfigFile::default());
        #[cfg(feature = "backend-tract")]
        assert_eq!(cfg.detector.backend, "tract");
        #[cfg(not(feature = "backend-tract"))]
        assert_eq!(cfg.detector.backend, "blob");
    }

    #[test]
    fn validation_rejects_bad_constants() {
        let mut cfg = RangeConfig::from_file(RangeConfigFile::default());
        cfg.object.real_size_cm = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = RangeConfig::from_file(RangeConfigFile::default());
        cfg.detector.confidence = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = RangeConfig::from_file(RangeConfigFile::default());
        cfg.calibration.pattern.inner_rows = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_and_json_files_parse() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let toml_path = dir.path().join("range.toml");
        std::fs::write(
            &toml_path,
            "[object]\nreal_size_cm = 22.0\n\n[camera]\ndevice = \"stub://bench\"\n",
        )?;
        let parsed = read_config_file(&toml_path)?;
        assert_eq!(parsed.object.and_then(|o| o.real_size_cm), Some(22.0));

        let json_path = dir.path().join("range.json");
        std::fs::write(&json_path, r#"{"fiducial": {"tag_size_cm": 16.5}}"#)?;
        let parsed = read_config_file(&json_path)?;
        assert_eq!(parsed.fiducial.and_then(|f| f.tag_size_cm), Some(16.5));
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("range.json");
        std::fs::write(&path, r#"{"object": {"diameter": 3}}"#)?;
        assert!(read_config_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn estimator_uses_configured_constants() -> Result<()> {
        let cfg = RangeConfig::from_file(RangeConfigFile::default());
        let estimator = cfg.estimator()?;
        assert_eq!(estimator.object().real_size_cm, 6.8);
        assert_eq!(estimator.intrinsics().focal_length_px(), 718.409779);
        Ok(())
    }
}
