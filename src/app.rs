//! The three frame loops.
//!
//! Each loop is synchronous: read a frame, process it, draw the overlay, save
//! it if an annotation directory is configured, then poll the controls once.
//! A frame-read error ends the loop the same way end of stream does. The
//! camera is owned by the `FrameLoop` and released when it is dropped.

use anyhow::{anyhow, Context, Result};

use crate::calibration::{CalibrationSession, CornerFinder, FinishDecision};
use crate::controls::{Command, ControlSource};
use crate::detect::{ClassNames, DetectorBackend};
use crate::fiducial::FiducialDetector;
use crate::frame::Frame;
use crate::geometry::{format_metres, CameraIntrinsics, DistanceEstimator};
use crate::ingest::Camera;
use crate::overlay::{self, AnnotationSink};
use crate::ranging::{detection_label, range_detections};
use crate::ui::CaptureProgress;

/// Why a loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    Escape,
    EndOfStream,
    ReadError,
    FrameLimit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationSummary {
    pub frames: u64,
    /// Frames where the full chessboard was visible.
    pub frames_with_corners: u64,
    pub samples: usize,
    pub exit: LoopExit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionSummary {
    pub frames: u64,
    /// Detections reported (ranged, when ranging is on).
    pub detections: u64,
    /// Smallest distance seen, cm.
    pub nearest_cm: Option<f64>,
    pub exit: LoopExit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TagPoseSummary {
    pub frames: u64,
    pub markers: u64,
    pub exit: LoopExit,
}

enum Step {
    Frame(Frame),
    Stop(LoopExit),
}

/// Camera, controls and annotation output shared by every loop.
pub struct FrameLoop<C> {
    camera: Camera,
    controls: C,
    sink: AnnotationSink,
    max_frames: Option<u64>,
    frames: u64,
}

impl<C: ControlSource> FrameLoop<C> {
    pub fn new(camera: Camera, controls: C) -> Self {
        Self {
            camera,
            controls,
            sink: AnnotationSink::disabled(),
            max_frames: None,
            frames: 0,
        }
    }

    pub fn with_sink(mut self, sink: AnnotationSink) -> Self {
        self.sink = sink;
        self
    }

    /// Stop after `max_frames` frames; `None` runs until a command or end of
    /// stream.
    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn sink(&self) -> &AnnotationSink {
        &self.sink
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    fn read(&mut self) -> Step {
        if self.max_frames.is_some_and(|max| self.frames >= max) {
            return Step::Stop(LoopExit::FrameLimit);
        }
        match self.camera.next_frame() {
            Ok(Some(frame)) => {
                self.frames += 1;
                Step::Frame(frame)
            }
            Ok(None) => {
                log::info!("camera stream ended");
                Step::Stop(LoopExit::EndOfStream)
            }
            Err(e) => {
                log::warn!("failed to read frame: {:#}", e);
                Step::Stop(LoopExit::ReadError)
            }
        }
    }

    fn save(&mut self, frame: &Frame) -> Result<()> {
        self.sink.save(frame)
    }

    // ------------------------------------------------------------------------
    // Calibration capture
    // ------------------------------------------------------------------------

    /// Collect chessboard views until the operator quits with enough samples.
    ///
    /// `Capture` stores the current view only when its corners were found. A
    /// view the session refuses (say, a different frame size) is logged and
    /// skipped.
    /// `Quit` with too few samples is refused and capture continues. Escape or
    /// end of stream before the minimum is reached is an error.
    pub fn run_calibration(
        &mut self,
        finder: &mut dyn CornerFinder,
        session: &mut CalibrationSession,
        progress: &CaptureProgress,
    ) -> Result<CalibrationSummary> {
        let start_frames = self.frames;
        let mut frames_with_corners = 0u64;
        let pattern = *session.pattern();

        let exit = loop {
            let mut frame = match self.read() {
                Step::Frame(frame) => frame,
                Step::Stop(exit) => break exit,
            };
            let gray = frame.to_gray();
            let corners = finder
                .find_corners(&gray, &pattern)
                .context("chessboard corner search failed")?;
            let size = (frame.width(), frame.height());
            if let Some(corners) = &corners {
                frames_with_corners += 1;
                if self.sink.is_enabled() {
                    overlay::draw_corners(frame.image_mut(), corners);
                }
            }
            if self.sink.is_enabled() {
                overlay::draw_capture_count(frame.image_mut(), session.sample_count())?;
            }
            self.save(&frame)?;

            match self.controls.poll() {
                Some(Command::Capture) => match corners {
                    Some(corners) => match session.capture(corners, size) {
                        Ok(count) => {
                            progress.set_samples(count);
                            log::info!("captured calibration view {}", count);
                        }
                        Err(e) => log::warn!("calibration view refused: {:#}", e),
                    },
                    None => log::warn!("chessboard not found in this frame; nothing captured"),
                },
                Some(Command::Quit) => match session.request_finish() {
                    FinishDecision::Ready => break LoopExit::Quit,
                    FinishDecision::NeedMoreSamples { have, need } => {
                        log::warn!(
                            "need at least {} calibration views, have {}; keep capturing",
                            need,
                            have
                        );
                    }
                },
                Some(Command::Escape) => break LoopExit::Escape,
                None => {}
            }
        };

        let summary = CalibrationSummary {
            frames: self.frames - start_frames,
            frames_with_corners,
            samples: session.sample_count(),
            exit,
        };
        if let FinishDecision::NeedMoreSamples { have, need } = session.request_finish() {
            return Err(anyhow!(
                "calibration stopped ({:?}) with {} of {} views captured",
                exit,
                have,
                need
            ));
        }
        Ok(summary)
    }

    // ------------------------------------------------------------------------
    // Detection
    // ------------------------------------------------------------------------

    /// Detect objects per frame and, with an estimator, range them.
    ///
    /// Ends on `Quit`, `Escape`, end of stream or a read error.
    pub fn run_detection(
        &mut self,
        detector: &mut dyn DetectorBackend,
        estimator: Option<&DistanceEstimator>,
        names: &ClassNames,
        min_confidence: f32,
    ) -> Result<DetectionSummary> {
        let start_frames = self.frames;
        let mut reported = 0u64;
        let mut nearest_cm: Option<f64> = None;

        let exit = loop {
            let mut frame = match self.read() {
                Step::Frame(frame) => frame,
                Step::Stop(exit) => break exit,
            };
            let detections = detector
                .detect(&frame)
                .with_context(|| format!("detector {} failed", detector.name()))?;

            match estimator {
                Some(estimator) => {
                    let ranged = range_detections(&detections, estimator, names, min_confidence);
                    for item in &ranged {
                        log::info!("frame {}: {}", frame.sequence, item.label());
                        nearest_cm = Some(match nearest_cm {
                            Some(best) => best.min(item.distance_cm),
                            None => item.distance_cm,
                        });
                        if self.sink.is_enabled() {
                            let color = overlay::class_color(item.detection.class_id);
                            overlay::draw_labeled_box(
                                frame.image_mut(),
                                &item.detection.bbox,
                                &item.label(),
                                color,
                            )?;
                        }
                    }
                    reported += ranged.len() as u64;
                }
                None => {
                    for det in detections.iter().filter(|d| d.confidence >= min_confidence) {
                        let label = detection_label(det, names);
                        log::info!("frame {}: {}", frame.sequence, label);
                        if self.sink.is_enabled() {
                            let color = overlay::class_color(det.class_id);
                            overlay::draw_labeled_box(frame.image_mut(), &det.bbox, &label, color)?;
                        }
                        reported += 1;
                    }
                }
            }
            self.save(&frame)?;

            match self.controls.poll() {
                Some(Command::Quit) => break LoopExit::Quit,
                Some(Command::Escape) => break LoopExit::Escape,
                Some(Command::Capture) | None => {}
            }
        };

        Ok(DetectionSummary {
            frames: self.frames - start_frames,
            detections: reported,
            nearest_cm,
            exit,
        })
    }

    // ------------------------------------------------------------------------
    // Fiducial pose
    // ------------------------------------------------------------------------

    /// Detect markers per frame and report their camera-frame translation.
    pub fn run_tag_pose(
        &mut self,
        detector: &mut dyn FiducialDetector,
        intrinsics: &CameraIntrinsics,
        tag_size_cm: f64,
    ) -> Result<TagPoseSummary> {
        let start_frames = self.frames;
        let mut markers = 0u64;

        let exit = loop {
            let mut frame = match self.read() {
                Step::Frame(frame) => frame,
                Step::Stop(exit) => break exit,
            };
            let gray = frame.to_gray();
            let poses = detector
                .detect(&gray, intrinsics, tag_size_cm)
                .with_context(|| format!("fiducial detector {} failed", detector.name()))?;
            for pose in &poses {
                log::info!(
                    "frame {}: {} range {}",
                    frame.sequence,
                    pose.labels().join(" "),
                    format_metres(pose.range_cm())
                );
                if self.sink.is_enabled() {
                    overlay::draw_marker_pose(frame.image_mut(), pose)?;
                }
            }
            markers += poses.len() as u64;
            self.save(&frame)?;

            match self.controls.poll() {
                Some(Command::Quit) => break LoopExit::Quit,
                Some(Command::Escape) => break LoopExit::Escape,
                Some(Command::Capture) | None => {}
            }
        };

        Ok(TagPoseSummary {
            frames: self.frames - start_frames,
            markers,
            exit,
        })
    }
}
