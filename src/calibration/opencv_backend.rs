use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use opencv::calib3d;
use opencv::core::{Mat, Point2f, Point3f, Size, Vector};
use opencv::prelude::*;

use super::{CalibrationArtifacts, CalibrationView, Calibrator, ChessboardPattern, CornerFinder};

/// OpenCV chessboard corner search and `calibrateCamera` solve.
#[derive(Default)]
pub struct OpenCvCalibration;

impl OpenCvCalibration {
    pub fn new() -> Self {
        Self
    }
}

fn gray_to_mat(gray: &GrayImage) -> Result<Mat> {
    let borrowed = Mat::new_rows_cols_with_data(
        gray.height() as i32,
        gray.width() as i32,
        gray.as_raw().as_slice(),
    )
    .context("wrap grayscale frame")?;
    Ok(borrowed.try_clone()?)
}

impl CornerFinder for OpenCvCalibration {
    fn find_corners(
        &mut self,
        gray: &GrayImage,
        pattern: &ChessboardPattern,
    ) -> Result<Option<Vec<[f32; 2]>>> {
        let image = gray_to_mat(gray)?;
        let size = Size::new(pattern.inner_cols as i32, pattern.inner_rows as i32);
        let mut corners = Vector::<Point2f>::new();
        let found = calib3d::find_chessboard_corners_def(&image, size, &mut corners)
            .context("chessboard corner search failed")?;
        if !found {
            return Ok(None);
        }
        Ok(Some(corners.iter().map(|p| [p.x, p.y]).collect()))
    }
}

impl Calibrator for OpenCvCalibration {
    fn calibrate(
        &mut self,
        views: &[CalibrationView],
        image_size: (u32, u32),
    ) -> Result<CalibrationArtifacts> {
        let mut object_points = Vector::<Vector<Point3f>>::new();
        let mut image_points = Vector::<Vector<Point2f>>::new();
        for view in views {
            object_points.push(
                view.object_points
                    .iter()
                    .map(|p| Point3f::new(p[0] as f32, p[1] as f32, p[2] as f32))
                    .collect(),
            );
            image_points.push(
                view.image_points
                    .iter()
                    .map(|p| Point2f::new(p[0], p[1]))
                    .collect(),
            );
        }

        let mut camera_matrix = Mat::default();
        let mut dist_coeffs = Mat::default();
        let mut rvecs = Vector::<Mat>::new();
        let mut tvecs = Vector::<Mat>::new();
        let rms = calib3d::calibrate_camera_def(
            &object_points,
            &image_points,
            Size::new(image_size.0 as i32, image_size.1 as i32),
            &mut camera_matrix,
            &mut dist_coeffs,
            &mut rvecs,
            &mut tvecs,
        )
        .context("calibrateCamera failed")?;

        let mut matrix = [[0.0f64; 3]; 3];
        for (r, row) in matrix.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = *camera_matrix.at_2d::<f64>(r as i32, c as i32)?;
            }
        }
        let dist: Vec<f64> = dist_coeffs.data_typed::<f64>()?.to_vec();
        if dist.is_empty() {
            return Err(anyhow!("calibration returned no distortion coefficients"));
        }
        Ok(CalibrationArtifacts::new(matrix, dist).with_rms_error(rms))
    }
}
