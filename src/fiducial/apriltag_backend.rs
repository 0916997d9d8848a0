use anyhow::{anyhow, Result};
use ::apriltag::{Detector, DetectorBuilder, Family, Image, TagParams};
use image::GrayImage;

use super::{FiducialDetector, MarkerPose};
use crate::geometry::{CameraIntrinsics, CM_PER_M};

/// Row alignment the library expects for its image buffers.
const IMAGE_ALIGNMENT: usize = 96;

/// AprilTag backend (tag36h11, single thread, no decimation).
pub struct AprilTagBackend {
    detector: Detector,
}

impl AprilTagBackend {
    pub fn new() -> Result<Self> {
        let mut detector = DetectorBuilder::new()
            .add_family_bits(Family::tag_36h11(), 1)
            .build()
            .map_err(|err| anyhow!("failed to build apriltag detector: {:?}", err))?;
        detector.set_thread_number(1);
        detector.set_decimation(1.0);
        Ok(Self { detector })
    }

    fn to_library_image(gray: &GrayImage) -> Result<Image> {
        let (width, height) = (gray.width() as usize, gray.height() as usize);
        let mut image = Image::zeros_with_alignment(width, height, IMAGE_ALIGNMENT)
            .ok_or_else(|| anyhow!("failed to allocate {}x{} apriltag image", width, height))?;
        for (x, y, pixel) in gray.enumerate_pixels() {
            image[(x as usize, y as usize)] = pixel.0[0];
        }
        Ok(image)
    }
}

impl FiducialDetector for AprilTagBackend {
    fn name(&self) -> &'static str {
        "apriltag"
    }

    fn detect(
        &mut self,
        gray: &GrayImage,
        intrinsics: &CameraIntrinsics,
        tag_size_cm: f64,
    ) -> Result<Vec<MarkerPose>> {
        let image = Self::to_library_image(gray)?;
        let params = TagParams {
            tagsize: tag_size_cm / CM_PER_M,
            fx: intrinsics.fx,
            fy: intrinsics.fy,
            cx: intrinsics.cx,
            cy: intrinsics.cy,
        };

        let mut poses = Vec::new();
        for detection in self.detector.detect(&image) {
            let Some(pose) = detection.estimate_tag_pose(&params) else {
                log::debug!("no pose for tag {}", detection.id());
                continue;
            };
            let t = pose.translation();
            let t = t.data();
            if t.len() < 3 {
                return Err(anyhow!("pose translation has {} components", t.len()));
            }
            poses.push(MarkerPose {
                tag_id: detection.id() as u32,
                corners: detection.corners(),
                center: detection.center(),
                translation_cm: [t[0] * CM_PER_M, t[1] * CM_PER_M, t[2] * CM_PER_M],
            });
        }
        Ok(poses)
    }
}
