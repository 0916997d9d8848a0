use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Object detector backend trait.
///
/// A backend consumes one frame and returns zero or more detections in frame
/// pixel coordinates. Confidence filtering happens in the backend when the
/// model supports it; the ranging stage applies the configured threshold again,
/// so backends may return low-confidence boxes.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, called once before the frame loop starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
