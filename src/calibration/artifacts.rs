//! Calibration artifact files.
//!
//! Two flat JSON arrays: the 3x3 camera matrix (three rows of three) and the
//! distortion coefficients. Written once by `calibrate`, read by every tool
//! that needs real intrinsics.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use crate::geometry::CameraIntrinsics;

pub const DEFAULT_CAMERA_MATRIX_FILE: &str = "camera_matrix.json";
pub const DEFAULT_DIST_COEFFS_FILE: &str = "dist_coeffs.json";

/// Locations of the two artifact files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub camera_matrix: PathBuf,
    pub dist_coeffs: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

impl ArtifactPaths {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            camera_matrix: dir.join(DEFAULT_CAMERA_MATRIX_FILE),
            dist_coeffs: dir.join(DEFAULT_DIST_COEFFS_FILE),
        }
    }
}

/// Result of a calibration run.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationArtifacts {
    pub camera_matrix: [[f64; 3]; 3],
    pub dist_coeffs: Vec<f64>,
    /// RMS reprojection error in pixels, when the solver reports it. Not
    /// persisted.
    pub rms_error: Option<f64>,
}

impl CalibrationArtifacts {
    pub fn new(camera_matrix: [[f64; 3]; 3], dist_coeffs: Vec<f64>) -> Self {
        Self {
            camera_matrix,
            dist_coeffs,
            rms_error: None,
        }
    }

    pub fn with_rms_error(mut self, rms_error: f64) -> Self {
        self.rms_error = Some(rms_error);
        self
    }

    pub fn intrinsics(&self) -> Result<CameraIntrinsics> {
        CameraIntrinsics::from_camera_matrix(&self.camera_matrix)
    }

    pub fn save(&self, paths: &ArtifactPaths) -> Result<()> {
        write_json(&paths.camera_matrix, &self.camera_matrix)?;
        write_json(&paths.dist_coeffs, &self.dist_coeffs)?;
        Ok(())
    }

    /// Load both files. A missing file means calibration has not been run.
    pub fn load(paths: &ArtifactPaths) -> Result<Self> {
        for path in [&paths.camera_matrix, &paths.dist_coeffs] {
            if !path.exists() {
                return Err(anyhow!(
                    "calibration file {} not found; run `calibrate` first to create it",
                    path.display()
                ));
            }
        }
        let camera_matrix: [[f64; 3]; 3] = read_json(&paths.camera_matrix)?;
        let dist_coeffs: Vec<f64> = read_json(&paths.dist_coeffs)?;
        if camera_matrix.iter().flatten().any(|v| !v.is_finite())
            || dist_coeffs.iter().any(|v| !v.is_finite())
        {
            return Err(anyhow!("calibration files contain non-finite values"));
        }
        Ok(Self::new(camera_matrix, dist_coeffs))
    }
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| anyhow!("invalid calibration file {}: {}", path.display(), e))
}
