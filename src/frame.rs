//! Captured frames.
//!
//! - `Frame`: one RGB8 image from a camera plus its sequence number.
//! - Grayscale conversion for fiducial and chessboard detectors.
//!
//! Frames are produced fresh by the ingestion layer each iteration and dropped
//! once the loop has processed and rendered them.

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage};

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured RGB frame.
pub struct Frame {
    image: RgbImage,
    /// Monotonic capture counter, starting at 1 for each source.
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    /// Wrap a packed RGB24 buffer. The buffer length must match the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::new(image, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Mutable access for overlay drawing.
    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Packed RGB24 pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Luma conversion (Rec. 601 weights).
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 1).is_err());
        let frame = Frame::from_rgb(vec![7u8; 12], 2, 2, 1).unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.pixels().len(), 12);
    }

    #[test]
    fn gray_conversion_keeps_neutral_levels() {
        let frame = Frame::from_rgb(vec![128u8; 3 * 4 * 3], 4, 3, 1).unwrap();
        let gray = frame.to_gray();
        assert_eq!(gray.dimensions(), (4, 3));
        assert!(gray.pixels().all(|p| p.0[0] == 128));
    }
}
