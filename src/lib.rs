//! vision-range
//!
//! Monocular ranging and pose tools for a small camera rig.
//!
//! # Tools
//!
//! - `calibrate`: capture chessboard views and persist the camera matrix and
//!   distortion coefficients.
//! - `range-detect`: run an object detector per frame and estimate each
//!   detection's distance from its apparent size.
//! - `tag-pose`: detect AprilTags and report their camera-frame translation.
//!
//! # Module Structure
//!
//! - `geometry`: bounding boxes, intrinsics and the distance estimator
//! - `ingest`: cameras (V4L2, image directories, synthetic scene)
//! - `detect`: detector backends and YOLO output decoding
//! - `ranging`: per-frame confidence filtering and distance labels
//! - `fiducial`: marker detector seam and pose labels
//! - `calibration`: chessboard session, solver seam and artifact files
//! - `app`: the frame loops the binaries drive
//!
//! Physical lengths are centimetres throughout; labels render metres.

pub mod app;
pub mod calibration;
pub mod config;
pub mod controls;
pub mod detect;
pub mod fiducial;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod overlay;
pub mod ranging;
pub mod ui;

pub use app::{CalibrationSummary, DetectionSummary, FrameLoop, LoopExit, TagPoseSummary};
pub use calibration::{
    ArtifactPaths, CalibrationArtifacts, CalibrationSession, Calibrator, ChessboardPattern,
    CornerFinder, FinishDecision, MIN_CALIBRATION_SAMPLES,
};
pub use config::RangeConfig;
pub use controls::{Command, ControlSource, ScriptedControls, TerminalControls};
pub use detect::{BackendRegistry, BlobBackend, ClassNames, Detection, DetectorBackend};
pub use fiducial::{FiducialDetector, MarkerPose};
pub use frame::Frame;
pub use geometry::{estimate_distance, BoundingBox, CameraIntrinsics, DistanceEstimator, ObjectSpec};
pub use ingest::{Camera, CameraConfig, SyntheticConfig};
pub use overlay::AnnotationSink;
pub use ranging::{range_detections, RangedDetection};
