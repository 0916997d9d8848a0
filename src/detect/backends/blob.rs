use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// CPU backend that boxes the bright pixels of a frame.
///
/// Good enough for a single light-coloured ball against a dark background.
/// Confidence is the fraction of the box covered by bright pixels, so a disc
/// scores about 0.79 and scattered noise scores low.
#[derive(Clone, Debug)]
pub struct BlobBackend {
    /// Luma threshold; pixels strictly above it belong to the blob.
    pub threshold: u8,
    /// Fewer bright pixels than this is treated as no detection.
    pub min_pixels: usize,
    /// Class id reported for the blob.
    pub class_id: usize,
}

impl Default for BlobBackend {
    fn default() -> Self {
        Self {
            threshold: 128,
            min_pixels: 16,
            class_id: 0,
        }
    }
}

impl DetectorBackend for BlobBackend {
    fn name(&self) -> &'static str {
        "blob"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let gray = frame.to_gray();
        let mut count = 0usize;
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);

        for (x, y, pixel) in gray.enumerate_pixels() {
            if pixel.0[0] > self.threshold {
                count += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        if count < self.min_pixels.max(1) {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::new(
            min_x as f64,
            min_y as f64,
            (max_x + 1) as f64,
            (max_y + 1) as f64,
        )?;
        let confidence = (count as f64 / bbox.area()).min(1.0) as f32;
        Ok(vec![Detection::new(self.class_id, confidence, bbox)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    #[test]
    fn boxes_a_bright_square() -> Result<()> {
        let mut image = RgbImage::from_pixel(100, 80, Rgb([10, 10, 10]));
        draw_filled_rect_mut(&mut image, Rect::at(20, 30).of_size(40, 20), Rgb([250, 250, 250]));
        let frame = Frame::new(image, 1);

        let detections = BlobBackend::default().detect(&frame)?;
        assert_eq!(detections.len(), 1);
        let bbox = detections[0].bbox;
        assert_eq!((bbox.x1(), bbox.y1(), bbox.x2(), bbox.y2()), (20.0, 30.0, 60.0, 50.0));
        assert!((detections[0].confidence - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn disc_scores_near_quarter_pi() -> Result<()> {
        let mut image = RgbImage::from_pixel(120, 120, Rgb([10, 10, 10]));
        draw_filled_circle_mut(&mut image, (60, 60), 40, Rgb([250, 250, 250]));
        let detections = BlobBackend::default().detect(&Frame::new(image, 1))?;
        let confidence = detections[0].confidence;
        assert!(confidence > 0.7 && confidence < 0.85, "confidence {}", confidence);
        Ok(())
    }

    #[test]
    fn dark_frame_has_no_detection() -> Result<()> {
        let image = RgbImage::from_pixel(32, 32, Rgb([10, 10, 10]));
        assert!(BlobBackend::default().detect(&Frame::new(image, 1))?.is_empty());
        Ok(())
    }
}
