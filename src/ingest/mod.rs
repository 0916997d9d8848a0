//! Frame ingestion.
//!
//! `Camera` hides the capture backend behind one blocking `next_frame` call:
//! - `stub://<name>`: synthetic ball scene (testing, demos)
//! - `dir://<path>`: still images played back in name order
//! - anything else: a V4L2 device node (feature: ingest-v4l2)
//!
//! `next_frame` returns `Ok(None)` at end of stream. Callers treat a read error
//! the same way: the loop stops and the camera is released. The device is
//! released when the `Camera` is dropped, on every exit path.

mod image_dir;
#[cfg(any(test, feature = "ingest-v4l2"))]
mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Context, Result};

use crate::frame::Frame;
use image_dir::ImageDirSource;
use synthetic::SyntheticSource;
pub use synthetic::{SyntheticConfig, BALL_COLOR};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Config;
#[cfg(feature = "ingest-v4l2")]
use v4l2::V4l2Source;

/// Camera selection and requested resolution.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// Statistics for a camera.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
}

/// An open camera.
pub struct Camera {
    backend: CameraBackend,
    device: String,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    ImageDir(ImageDirSource),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Source),
}

impl Camera {
    /// Open and connect the configured device. Failure means the device is
    /// unavailable.
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let device = config.device.trim();
        if device.is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        let backend = if device.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticSource::new(SyntheticConfig {
                width: config.width,
                height: config.height,
                ..SyntheticConfig::default()
            }))
        } else if let Some(dir) = device.strip_prefix("dir://") {
            CameraBackend::ImageDir(ImageDirSource::new(dir))
        } else {
            Self::device_backend(config)?
        };
        Self::connect(backend, device)
    }

    /// Open a synthetic scene with explicit settings.
    pub fn synthetic(config: SyntheticConfig) -> Result<Self> {
        Self::connect(
            CameraBackend::Synthetic(SyntheticSource::new(config)),
            "stub://synthetic",
        )
    }

    #[cfg(feature = "ingest-v4l2")]
    fn device_backend(config: &CameraConfig) -> Result<CameraBackend> {
        Ok(CameraBackend::V4l2(V4l2Source::new(V4l2Config {
            device: config.device.clone(),
            target_fps: config.target_fps,
            width: config.width,
            height: config.height,
        })))
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn device_backend(config: &CameraConfig) -> Result<CameraBackend> {
        Err(anyhow!(
            "camera device {} requires the ingest-v4l2 feature",
            config.device
        ))
    }

    fn connect(mut backend: CameraBackend, device: &str) -> Result<Self> {
        match &mut backend {
            CameraBackend::Synthetic(source) => source.connect(),
            CameraBackend::ImageDir(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.connect(),
        }
        .with_context(|| format!("could not open camera {}", device))?;
        Ok(Self {
            backend,
            device: device.to_string(),
        })
    }

    /// Block until the next frame. `Ok(None)` is end of stream.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            CameraBackend::ImageDir(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.next_frame(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        let frames_captured = match &self.backend {
            CameraBackend::Synthetic(source) => source.frames_captured(),
            CameraBackend::ImageDir(source) => source.frames_captured(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.frames_captured(),
        };
        CameraStats {
            frames_captured,
            device: self.device.clone(),
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        let stats = self.stats();
        log::info!(
            "camera {} released after {} frames",
            stats.device,
            stats.frames_captured
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_device_opens_synthetic_scene() -> Result<()> {
        let mut camera = Camera::open(&CameraConfig {
            device: "stub://front".to_string(),
            width: 160,
            height: 120,
            target_fps: 10,
        })?;
        let frame = camera.next_frame()?.expect("synthetic frame");
        assert_eq!((frame.width(), frame.height()), (160, 120));
        assert_eq!(camera.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let result = Camera::open(&CameraConfig {
            device: "dir:///definitely/not/here".to_string(),
            ..CameraConfig::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn empty_device_is_rejected() {
        let result = Camera::open(&CameraConfig {
            device: "  ".to_string(),
            ..CameraConfig::default()
        });
        assert!(result.is_err());
    }
}
