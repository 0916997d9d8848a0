//! Fiducial marker (AprilTag) pose.
//!
//! Marker decoding and pose solving stay inside the detector library; this
//! module defines the seam (`FiducialDetector`), the result type and the
//! overlay labels. Translations are in centimetres in the camera frame:
//! x right, y down, z forward along the optical axis.

#[cfg(feature = "fiducial-apriltag")]
mod apriltag_backend;

use std::collections::VecDeque;

use anyhow::Result;
use image::GrayImage;

use crate::geometry::{format_metres, CameraIntrinsics};

#[cfg(feature = "fiducial-apriltag")]
pub use apriltag_backend::AprilTagBackend;

/// Family used by the printed markers.
pub const TAG_FAMILY: &str = "tag36h11";

/// One decoded marker with its pose.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerPose {
    pub tag_id: u32,
    /// Image corners in detector order.
    pub corners: [[f64; 2]; 4],
    pub center: [f64; 2],
    /// Camera-frame translation of the marker centre, cm.
    pub translation_cm: [f64; 3],
}

impl MarkerPose {
    /// Straight-line distance from the camera centre, cm.
    pub fn range_cm(&self) -> f64 {
        self.translation_cm.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Overlay lines: id, then x, y, z in metres.
    pub fn labels(&self) -> [String; 4] {
        let [x, y, z] = self.translation_cm;
        [
            format!("ID: {}", self.tag_id),
            format!("X: {}", format_metres(x)),
            format!("Y: {}", format_metres(y)),
            format!("Z: {}", format_metres(z)),
        ]
    }
}

/// Marker detector backend trait.
pub trait FiducialDetector {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect markers in a grayscale frame and solve each marker's pose for a
    /// square tag with `tag_size_cm` edge length.
    fn detect(
        &mut self,
        gray: &GrayImage,
        intrinsics: &CameraIntrinsics,
        tag_size_cm: f64,
    ) -> Result<Vec<MarkerPose>>;
}

/// Replays scripted marker lists, one per frame. Used by tests and demos.
pub struct ScriptedFiducials {
    script: VecDeque<Vec<MarkerPose>>,
}

impl ScriptedFiducials {
    pub fn new(script: Vec<Vec<MarkerPose>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl FiducialDetector for ScriptedFiducials {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(
        &mut self,
        _gray: &GrayImage,
        _intrinsics: &CameraIntrinsics,
        _tag_size_cm: f64,
    ) -> Result<Vec<MarkerPose>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose() -> MarkerPose {
        MarkerPose {
            tag_id: 7,
            corners: [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]],
            center: [5.0, 5.0],
            translation_cm: [12.0, -4.0, 3.0],
        }
    }

    #[test]
    fn labels_render_metres() {
        assert_eq!(
            pose().labels(),
            ["ID: 7", "X: 0.12 m", "Y: -0.04 m", "Z: 0.03 m"].map(String::from)
        );
    }

    #[test]
    fn range_is_translation_norm() {
        assert!((pose().range_cm() - 13.0).abs() < 1e-12);
    }

    #[test]
    fn scripted_detector_replays_then_empties() -> Result<()> {
        let mut detector = ScriptedFiducials::new(vec![vec![pose()]]);
        let gray = GrayImage::new(4, 4);
        let k = CameraIntrinsics::from_focal_length(800.0, 4, 4)?;
        assert_eq!(detector.detect(&gray, &k, 7.7)?.len(), 1);
        assert!(detector.detect(&gray, &k, 7.7)?.is_empty());
        Ok(())
    }
}
