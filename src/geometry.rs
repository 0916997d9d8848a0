//! Pinhole-camera geometry and distance estimation.
//!
//! Every physical length in this crate is expressed in centimetres. Pixel
//! quantities are `f64` so sub-pixel boxes from detectors survive unchanged.
//!
//! Distance follows from similar triangles: an object of known size `S` at
//! distance `Z` projects to `s = f * S / Z` pixels, so `Z = S * f / s`.

use anyhow::{anyhow, Result};

/// Centimetres per metre, used when rendering labels.
pub const CM_PER_M: f64 = 100.0;

// ----------------------------------------------------------------------------
// BoundingBox
// ----------------------------------------------------------------------------

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl BoundingBox {
    /// Build a box from its corners. `x2 >= x1` and `y2 >= y1` are required.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(anyhow!("bounding box coordinates must be finite"));
        }
        if x2 < x1 || y2 < y1 {
            return Err(anyhow!(
                "inverted bounding box ({}, {}) -> ({}, {})",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Build a box from a centre point and its size.
    pub fn from_center(cx: f64, cy: f64, width: f64, height: f64) -> Result<Self> {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn x1(&self) -> f64 {
        self.x1
    }

    pub fn y1(&self) -> f64 {
        self.y1
    }

    pub fn x2(&self) -> f64 {
        self.x2
    }

    pub fn y2(&self) -> f64 {
        self.y2
    }

    pub fn pixel_width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn pixel_height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Mean of width and height. Treats the object as roughly round or square
    /// in projection.
    pub fn apparent_size(&self) -> f64 {
        (self.pixel_width() + self.pixel_height()) / 2.0
    }

    pub fn area(&self) -> f64 {
        self.pixel_width() * self.pixel_height()
    }

    /// Intersection over union with another box. Zero when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clamp the box to a `width x height` image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let w = width as f64;
        let h = height as f64;
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

// ----------------------------------------------------------------------------
// Camera and object parameters
// ----------------------------------------------------------------------------

/// Pinhole intrinsics. Ranging uses `focal_length_px`, the mean of `fx` and `fy`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self> {
        for (name, value) in [("fx", fx), ("fy", fy)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(anyhow!("{} must be a positive focal length, got {}", name, value));
            }
        }
        if !(cx.is_finite() && cy.is_finite()) {
            return Err(anyhow!("principal point must be finite"));
        }
        Ok(Self { fx, fy, cx, cy })
    }

    /// Square pixels with the principal point at the frame centre.
    pub fn from_focal_length(focal_length_px: f64, width: u32, height: u32) -> Result<Self> {
        Self::new(
            focal_length_px,
            focal_length_px,
            width as f64 / 2.0,
            height as f64 / 2.0,
        )
    }

    /// Read intrinsics out of a row-major 3x3 camera matrix.
    pub fn from_camera_matrix(matrix: &[[f64; 3]; 3]) -> Result<Self> {
        Self::new(matrix[0][0], matrix[1][1], matrix[0][2], matrix[1][2])
    }

    pub fn focal_length_px(&self) -> f64 {
        (self.fx + self.fy) / 2.0
    }
}

/// Physical description of the tracked object class.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSpec {
    pub name: String,
    pub real_size_cm: f64,
}

impl ObjectSpec {
    pub fn new(name: impl Into<String>, real_size_cm: f64) -> Result<Self> {
        if !(real_size_cm.is_finite() && real_size_cm > 0.0) {
            return Err(anyhow!(
                "object size must be a positive length in cm, got {}",
                real_size_cm
            ));
        }
        Ok(Self {
            name: name.into(),
            real_size_cm,
        })
    }
}

// ----------------------------------------------------------------------------
// Distance estimation
// ----------------------------------------------------------------------------

/// Distance along the optical axis, in the units of `real_size_cm`.
///
/// Fails when the box has no apparent size or the constants are not positive.
pub fn estimate_distance(bbox: &BoundingBox, real_size_cm: f64, focal_length_px: f64) -> Result<f64> {
    let apparent = bbox.apparent_size();
    if !(apparent > 0.0) {
        return Err(anyhow!(
            "cannot range a degenerate box (apparent size {} px)",
            apparent
        ));
    }
    if !(real_size_cm.is_finite() && real_size_cm > 0.0) {
        return Err(anyhow!("real size must be positive, got {}", real_size_cm));
    }
    if !(focal_length_px.is_finite() && focal_length_px > 0.0) {
        return Err(anyhow!("focal length must be positive, got {}", focal_length_px));
    }
    Ok(real_size_cm * focal_length_px / apparent)
}

/// Fixed object and camera parameters for one run.
#[derive(Clone, Debug)]
pub struct DistanceEstimator {
    object: ObjectSpec,
    intrinsics: CameraIntrinsics,
}

impl DistanceEstimator {
    pub fn new(object: ObjectSpec, intrinsics: CameraIntrinsics) -> Self {
        Self { object, intrinsics }
    }

    pub fn object(&self) -> &ObjectSpec {
        &self.object
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    /// Distance in cm, or `None` for a box with no apparent size.
    pub fn estimate(&self, bbox: &BoundingBox) -> Option<f64> {
        if bbox.apparent_size() <= 0.0 {
            return None;
        }
        estimate_distance(
            bbox,
            self.object.real_size_cm,
            self.intrinsics.focal_length_px(),
        )
        .ok()
    }
}

/// Render a centimetre length as metres with two decimals.
pub fn format_metres(length_cm: f64) -> String {
    format!("{:.2} m", length_cm / CM_PER_M)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
