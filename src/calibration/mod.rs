//! Chessboard camera calibration.
//!
//! The flow: show a chessboard to the camera, capture views where the inner
//! corners were found, and once enough views exist hand them to a calibration
//! routine that solves the camera matrix and distortion coefficients.
//!
//! Corner finding and the solve itself live behind `CornerFinder` and
//! `Calibrator`; the OpenCV backend implements both (feature: backend-opencv).

mod artifacts;
#[cfg(feature = "backend-opencv")]
mod opencv_backend;

use anyhow::{anyhow, Result};
use image::GrayImage;

pub use artifacts::{ArtifactPaths, CalibrationArtifacts};
#[cfg(feature = "backend-opencv")]
pub use opencv_backend::OpenCvCalibration;

/// Views required before a solve is attempted.
pub const MIN_CALIBRATION_SAMPLES: usize = 15;

// ----------------------------------------------------------------------------
// Pattern
// ----------------------------------------------------------------------------

/// Chessboard described by its inner corner grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChessboardPattern {
    pub inner_cols: u32,
    pub inner_rows: u32,
    /// Square edge length. The default unit lattice leaves the camera matrix
    /// unaffected; only extrinsics would scale with it.
    pub square_size: f64,
}

impl Default for ChessboardPattern {
    fn default() -> Self {
        Self {
            inner_cols: 9,
            inner_rows: 6,
            square_size: 1.0,
        }
    }
}

impl ChessboardPattern {
    pub fn corner_count(&self) -> usize {
        (self.inner_cols * self.inner_rows) as usize
    }

    /// Reference lattice `(i, j, 0) * square_size`, x varying fastest.
    pub fn object_points(&self) -> Vec<[f64; 3]> {
        (0..self.inner_rows)
            .flat_map(|j| {
                (0..self.inner_cols).map(move |i| {
                    [i as f64 * self.square_size, j as f64 * self.square_size, 0.0]
                })
            })
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Backends
// ----------------------------------------------------------------------------

/// Locates the inner chessboard corners in a grayscale frame.
pub trait CornerFinder {
    /// `Ok(None)` when the full pattern is not visible.
    fn find_corners(
        &mut self,
        gray: &GrayImage,
        pattern: &ChessboardPattern,
    ) -> Result<Option<Vec<[f32; 2]>>>;
}

/// Solves intrinsics and distortion from matched lattice/image points.
pub trait Calibrator {
    fn calibrate(
        &mut self,
        views: &[CalibrationView],
        image_size: (u32, u32),
    ) -> Result<CalibrationArtifacts>;
}

/// One captured view: the reference lattice and where its corners were seen.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationView {
    pub object_points: Vec<[f64; 3]>,
    pub image_points: Vec<[f32; 2]>,
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// Outcome of asking to finish capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishDecision {
    Ready,
    NeedMoreSamples { have: usize, need: usize },
}

/// Accumulates captured views for one calibration run.
#[derive(Debug)]
pub struct CalibrationSession {
    pattern: ChessboardPattern,
    min_samples: usize,
    views: Vec<CalibrationView>,
    image_size: Option<(u32, u32)>,
}

impl CalibrationSession {
    pub fn new(pattern: ChessboardPattern, min_samples: usize) -> Self {
        Self {
            pattern,
            min_samples: min_samples.max(1),
            views: Vec::new(),
            image_size: None,
        }
    }

    pub fn pattern(&self) -> &ChessboardPattern {
        &self.pattern
    }

    pub fn sample_count(&self) -> usize {
        self.views.len()
    }

    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.image_size
    }

    /// Store a view whose corners were found. Returns the new sample count.
    pub fn capture(&mut self, corners: Vec<[f32; 2]>, image_size: (u32, u32)) -> Result<usize> {
        if corners.len() != self.pattern.corner_count() {
            return Err(anyhow!(
                "expected {} corners for a {}x{} pattern, got {}",
                self.pattern.corner_count(),
                self.pattern.inner_cols,
                self.pattern.inner_rows,
                corners.len()
            ));
        }
        match self.image_size {
            Some(size) if size != image_size => {
                return Err(anyhow!(
                    "view is {}x{} but earlier views were {}x{}",
                    image_size.0,
                    image_size.1,
                    size.0,
                    size.1
                ));
            }
            _ => self.image_size = Some(image_size),
        }
        self.views.push(CalibrationView {
            object_points: self.pattern.object_points(),
            image_points: corners,
        });
        Ok(self.views.len())
    }

    pub fn request_finish(&self) -> FinishDecision {
        if self.views.len() >= self.min_samples {
            FinishDecision::Ready
        } else {
            FinishDecision::NeedMoreSamples {
                have: self.views.len(),
                need: self.min_samples,
            }
        }
    }

    /// Run the solve. Refuses to run before enough views were captured.
    pub fn calibrate(&self, calibrator: &mut dyn Calibrator) -> Result<CalibrationArtifacts> {
        if let FinishDecision::NeedMoreSamples { have, need } = self.request_finish() {
            return Err(anyhow!(
                "only {} of {} calibration views captured",
                have,
                need
            ));
        }
        let image_size = self
            .image_size
            .ok_or_else(|| anyhow!("no calibration views captured"))?;
        calibrator.calibrate(&self.views, image_size)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCalibrator {
        seen_views: usize,
    }

    impl Calibrator for FixedCalibrator {
        fn calibrate(
            &mut self,
            views: &[CalibrationView],
            image_size: (u32, u32),
        ) -> Result<CalibrationArtifacts> {
            self.seen_views = views.len();
            let (w, h) = image_size;
            Ok(CalibrationArtifacts::new(
                [[700.0, 0.0, w as f64 / 2.0], [0.0, 700.0, h as f64 / 2.0], [0.0, 0.0, 1.0]],
                vec![0.0; 5],
            ))
        }
    }

    fn corners(pattern: &ChessboardPattern) -> Vec<[f32; 2]> {
        vec![[1.0, 1.0]; pattern.corner_count()]
    }

    #[test]
    fn lattice_is_row_major_unit_grid() {
        let pattern = ChessboardPattern::default();
        let pts = pattern.object_points();
        assert_eq!(pts.len(), 54);
        assert_eq!(pts[0], [0.0, 0.0, 0.0]);
        assert_eq!(pts[1], [1.0, 0.0, 0.0]);
        assert_eq!(pts[9], [0.0, 1.0, 0.0]);
        assert_eq!(pts[53], [8.0, 5.0, 0.0]);
    }

    #[test]
    fn lattice_scales_with_square_size() {
        let pattern = ChessboardPattern {
            square_size: 2.5,
            ..ChessboardPattern::default()
        };
        assert_eq!(pattern.object_points()[10], [2.5, 2.5, 0.0]);
    }

    #[test]
    fn finish_waits_for_minimum_samples() -> Result<()> {
        let pattern = ChessboardPattern::default();
        let mut session = CalibrationSession::new(pattern, MIN_CALIBRATION_SAMPLES);
        for _ in 0..14 {
            session.capture(corners(&pattern), (640, 480))?;
        }
        assert_eq!(
            session.request_finish(),
            FinishDecision::NeedMoreSamples { have: 14, need: 15 }
        );
        let mut calibrator = FixedCalibrator { seen_views: 0 };
        assert!(session.calibrate(&mut calibrator).is_err());

        session.capture(corners(&pattern), (640, 480))?;
        assert_eq!(session.request_finish(), FinishDecision::Ready);
        let artifacts = session.calibrate(&mut calibrator)?;
        assert_eq!(calibrator.seen_views, 15);
        assert_eq!(artifacts.camera_matrix[0][2], 320.0);
        Ok(())
    }

    #[test]
    fn capture_rejects_partial_patterns_and_size_changes() -> Result<()> {
        let pattern = ChessboardPattern::default();
        let mut session = CalibrationSession::new(pattern, 15);
        assert!(session.capture(vec![[0.0, 0.0]; 10], (640, 480)).is_err());
        session.capture(corners(&pattern), (640, 480))?;
        assert!(session.capture(corners(&pattern), (320, 240)).is_err());
        assert_eq!(session.sample_count(), 1);
        Ok(())
    }
}
