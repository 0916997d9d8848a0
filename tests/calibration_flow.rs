use anyhow::Result;
use image::{GrayImage, Rgb, RgbImage};

use vision_range::calibration::CalibrationView;
use vision_range::fiducial::{MarkerPose, ScriptedFiducials};
use vision_range::ui::CaptureProgress;
use vision_range::{
    ArtifactPaths, CalibrationArtifacts, CalibrationSession, Calibrator, Camera, CameraConfig,
    ChessboardPattern, Command, CornerFinder, FrameLoop, LoopExit, ScriptedControls,
    SyntheticConfig,
};

/// Reports the pattern on every frame at a fixed image position.
struct VisibleBoard;

impl CornerFinder for VisibleBoard {
    fn find_corners(
        &mut self,
        _gray: &GrayImage,
        pattern: &ChessboardPattern,
    ) -> Result<Option<Vec<[f32; 2]>>> {
        Ok(Some(
            pattern
                .object_points()
                .iter()
                .map(|p| [100.0 + 20.0 * p[0] as f32, 80.0 + 20.0 * p[1] as f32])
                .collect(),
        ))
    }
}

/// Centres the principal point and records what it was given.
#[derive(Default)]
struct RecordingCalibrator {
    views: usize,
    image_size: Option<(u32, u32)>,
}

impl Calibrator for RecordingCalibrator {
    fn calibrate(
        &mut self,
        views: &[CalibrationView],
        image_size: (u32, u32),
    ) -> Result<CalibrationArtifacts> {
        self.views = views.len();
        self.image_size = Some(image_size);
        let (w, h) = image_size;
        Ok(CalibrationArtifacts::new(
            [[712.0, 0.0, w as f64 / 2.0], [0.0, 708.0, h as f64 / 2.0], [0.0, 0.0, 1.0]],
            vec![0.1, -0.2, 0.0, 0.0, 0.05],
        )
        .with_rms_error(0.31))
    }
}

fn camera() -> Camera {
    Camera::synthetic(SyntheticConfig {
        width: 320,
        height: 240,
        frame_limit: Some(200),
        ..SyntheticConfig::default()
    })
    .expect("synthetic camera")
}

#[test]
fn fifteen_captures_then_quit_produce_artifacts() -> Result<()> {
    let mut script = vec![Some(Command::Capture); 15];
    // An early quit is refused and capture carries on.
    script.insert(5, Some(Command::Quit));
    script.push(None);
    script.push(Some(Command::Quit));

    let pattern = ChessboardPattern::default();
    let mut session = CalibrationSession::new(pattern, 15);
    let mut frames = FrameLoop::new(camera(), ScriptedControls::new(script));
    let progress = CaptureProgress::hidden(15);
    let summary = frames.run_calibration(&mut VisibleBoard, &mut session, &progress)?;

    assert_eq!(summary.exit, LoopExit::Quit);
    assert_eq!(summary.samples, 15);
    assert_eq!(summary.frames, 18);
    assert_eq!(summary.frames_with_corners, 18);
    assert_eq!(progress.samples(), 15);

    let mut calibrator = RecordingCalibrator::default();
    let artifacts = session.calibrate(&mut calibrator)?;
    assert_eq!(calibrator.views, 15);
    assert_eq!(calibrator.image_size, Some((320, 240)));

    let dir = tempfile::tempdir()?;
    let paths = ArtifactPaths::in_dir(dir.path());
    artifacts.save(&paths)?;
    let loaded = CalibrationArtifacts::load(&paths)?;
    let intrinsics = loaded.intrinsics()?;
    assert_eq!(intrinsics.focal_length_px(), 710.0);
    assert_eq!((intrinsics.cx, intrinsics.cy), (160.0, 120.0));
    assert_eq!(loaded.dist_coeffs.len(), 5);
    Ok(())
}

#[test]
fn view_with_a_different_size_is_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sizes = [(160, 120), (160, 120), (80, 60), (160, 120)];
    for (i, (w, h)) in sizes.into_iter().enumerate() {
        RgbImage::from_pixel(w, h, Rgb([90, 90, 90]))
            .save(dir.path().join(format!("frame_{}.png", i)))?;
    }
    let camera = Camera::open(&CameraConfig {
        device: format!("dir://{}", dir.path().display()),
        ..CameraConfig::default()
    })?;
    let script = vec![Some(Command::Capture); sizes.len()];
    let mut frames = FrameLoop::new(camera, ScriptedControls::new(script));
    let mut session = CalibrationSession::new(ChessboardPattern::default(), 3);

    let summary =
        frames.run_calibration(&mut VisibleBoard, &mut session, &CaptureProgress::hidden(3))?;
    assert_eq!(summary.exit, LoopExit::EndOfStream);
    assert_eq!(summary.frames, 4);
    assert_eq!(summary.samples, 3);

    let mut calibrator = RecordingCalibrator::default();
    session.calibrate(&mut calibrator)?;
    assert_eq!(calibrator.views, 3);
    assert_eq!(calibrator.image_size, Some((160, 120)));
    Ok(())
}

#[test]
fn escape_before_enough_views_is_an_error() {
    let script = vec![
        Some(Command::Capture),
        Some(Command::Capture),
        Some(Command::Escape),
    ];
    let mut session = CalibrationSession::new(ChessboardPattern::default(), 15);
    let mut frames = FrameLoop::new(camera(), ScriptedControls::new(script));
    let err = frames
        .run_calibration(&mut VisibleBoard, &mut session, &CaptureProgress::hidden(15))
        .expect_err("two views are not enough");
    assert!(err.to_string().contains("2 of 15"));
    assert_eq!(session.sample_count(), 2);
}

#[test]
fn calibrated_intrinsics_drive_tag_pose() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let paths = ArtifactPaths::in_dir(dir.path());
    assert!(CalibrationArtifacts::load(&paths).is_err());

    CalibrationArtifacts::new(
        [[839.65, 0.0, 160.0], [0.0, 839.65, 120.0], [0.0, 0.0, 1.0]],
        vec![0.0; 5],
    )
    .save(&paths)?;
    let intrinsics = CalibrationArtifacts::load(&paths)?.intrinsics()?;

    let pose = MarkerPose {
        tag_id: 7,
        corners: [[150.0, 110.0], [170.0, 110.0], [170.0, 130.0], [150.0, 130.0]],
        center: [160.0, 120.0],
        translation_cm: [12.0, -4.0, 80.0],
    };
    let mut detector = ScriptedFiducials::new(vec![vec![pose.clone()]; 4]);
    let mut frames =
        FrameLoop::new(camera(), ScriptedControls::silent()).with_max_frames(Some(4));
    let summary = frames.run_tag_pose(&mut detector, &intrinsics, 7.7)?;

    assert_eq!(summary.exit, LoopExit::FrameLimit);
    assert_eq!(summary.markers, 4);
    assert_eq!(
        pose.labels(),
        [
            "ID: 7".to_string(),
            "X: 0.12 m".to_string(),
            "Y: -0.04 m".to_string(),
            "Z: 0.80 m".to_string(),
        ]
    );
    Ok(())
}
