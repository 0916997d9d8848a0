//! Decoding of YOLO-style (v8/v11 export) detector output.
//!
//! The exported head produces a `(1, 4 + classes, anchors)` tensor: per anchor a
//! centre/size box in model-input pixels followed by one score per class. This
//! module turns that tensor into frame-space detections and suppresses
//! overlapping boxes of the same class.
//!
//! Frames reach the model letterboxed, the way the models are trained: scaled
//! to fit the square input with the aspect ratio kept, then centred on grey
//! padding. `Letterbox` records that mapping so boxes can be taken back.

use anyhow::{anyhow, Result};

use super::result::Detection;
use crate::geometry::BoundingBox;

/// Decoder settings.
#[derive(Clone, Debug)]
pub struct YoloParams {
    /// Square model input size (640 for the usual export).
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}

/// Padding value used around a letterboxed frame.
pub const LETTERBOX_FILL: u8 = 114;

/// Placement of a frame inside the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    /// Model pixels per frame pixel.
    pub scale: f64,
    pub resized_width: u32,
    pub resized_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Letterbox {
    pub fn fit(frame_width: u32, frame_height: u32, input_size: u32) -> Result<Self> {
        if frame_width == 0 || frame_height == 0 || input_size == 0 {
            return Err(anyhow!(
                "cannot letterbox a {}x{} frame into {} pixels",
                frame_width,
                frame_height,
                input_size
            ));
        }
        let size = input_size as f64;
        let scale = (size / frame_width as f64).min(size / frame_height as f64);
        let resized_width = ((frame_width as f64 * scale).round() as u32).clamp(1, input_size);
        let resized_height = ((frame_height as f64 * scale).round() as u32).clamp(1, input_size);
        Ok(Self {
            scale,
            resized_width,
            resized_height,
            pad_x: (input_size - resized_width) / 2,
            pad_y: (input_size - resized_height) / 2,
            frame_width,
            frame_height,
        })
    }

    /// Map a model-input point back to frame pixels.
    pub fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Decode a channel-major output tensor into detections in frame pixels.
pub fn decode_output(
    output: &[f32],
    num_classes: usize,
    letterbox: &Letterbox,
    params: &YoloParams,
) -> Result<Vec<Detection>> {
    if num_classes == 0 {
        return Err(anyhow!("model reports zero classes"));
    }
    let channels = 4 + num_classes;
    if output.is_empty() || output.len() % channels != 0 {
        return Err(anyhow!(
            "output of {} values does not split into {} channels",
            output.len(),
            channels
        ));
    }
    let anchors = output.len() / channels;
    let at = |channel: usize, anchor: usize| output[channel * anchors + anchor];

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (0..num_classes)
            .map(|class| (class, at(4 + class, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
        if !(score >= params.conf_threshold) {
            continue;
        }
        let (cx, cy) = letterbox.to_frame(at(0, anchor) as f64, at(1, anchor) as f64);
        let w = (at(2, anchor) as f64 / letterbox.scale).max(0.0);
        let h = (at(3, anchor) as f64 / letterbox.scale).max(0.0);
        let Ok(bbox) = BoundingBox::from_center(cx, cy, w, h) else {
            continue;
        };
        candidates.push(Detection::new(
            class_id,
            score,
            bbox.clamp_to(letterbox.frame_width, letterbox.frame_height),
        ));
    }

    Ok(non_max_suppression(
        candidates,
        params.iou_threshold,
        params.max_detections,
    ))
}

/// Greedy per-class non-maximum suppression, highest confidence first.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for det in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold as f64
        });
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a channel-major tensor from per-anchor rows `[cx, cy, w, h, s0, s1..]`.
    fn tensor(rows: &[Vec<f32>]) -> Vec<f32> {
        let channels = rows[0].len();
        let mut out = vec![0.0; channels * rows.len()];
        for (anchor, row) in rows.iter().enumerate() {
            for (channel, value) in row.iter().enumerate() {
                out[channel * rows.len() + anchor] = *value;
            }
        }
        out
    }

    fn square(size: u32) -> Letterbox {
        Letterbox::fit(size, size, size).unwrap()
    }

    #[test]
    fn letterbox_keeps_aspect_and_centres() -> Result<()> {
        let wide = Letterbox::fit(640, 480, 640)?;
        assert_eq!(wide.scale, 1.0);
        assert_eq!((wide.resized_width, wide.resized_height), (640, 480));
        assert_eq!((wide.pad_x, wide.pad_y), (0, 80));

        let tall = Letterbox::fit(480, 640, 320)?;
        assert_eq!(tall.scale, 0.5);
        assert_eq!((tall.resized_width, tall.resized_height), (240, 320));
        assert_eq!((tall.pad_x, tall.pad_y), (40, 0));
        assert_eq!(tall.to_frame(40.0, 0.0), (0.0, 0.0));
        assert_eq!(tall.to_frame(280.0, 320.0), (480.0, 640.0));

        assert!(Letterbox::fit(0, 480, 640).is_err());
        Ok(())
    }

    #[test]
    fn decodes_and_undoes_the_letterbox() -> Result<()> {
        let out = tensor(&[
            vec![320.0, 320.0, 64.0, 64.0, 0.9, 0.1],
            vec![100.0, 100.0, 20.0, 20.0, 0.2, 0.3],
        ]);
        // 1280x640 is halved to 640x320 and padded by 160 rows top and bottom.
        let letterbox = Letterbox::fit(1280, 640, 640)?;
        let dets = decode_output(&out, 2, &letterbox, &YoloParams::default())?;
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!(d.class_id, 0);
        assert_eq!((d.bbox.x1(), d.bbox.x2()), (576.0, 704.0));
        assert_eq!((d.bbox.y1(), d.bbox.y2()), (256.0, 384.0));
        Ok(())
    }

    #[test]
    fn boxes_reaching_into_padding_are_clamped() -> Result<()> {
        let out = tensor(&[vec![320.0, 170.0, 100.0, 40.0, 0.8]]);
        let letterbox = Letterbox::fit(1280, 640, 640)?;
        let dets = decode_output(&out, 1, &letterbox, &YoloParams::default())?;
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox.y1(), 0.0);
        assert_eq!(dets[0].bbox.y2(), 60.0);
        Ok(())
    }

    #[test]
    fn overlapping_boxes_of_one_class_are_suppressed() -> Result<()> {
        let out = tensor(&[
            vec![100.0, 100.0, 50.0, 50.0, 0.8, 0.0],
            vec![102.0, 101.0, 50.0, 50.0, 0.95, 0.0],
            vec![104.0, 100.0, 50.0, 50.0, 0.0, 0.7],
            vec![400.0, 400.0, 50.0, 50.0, 0.6, 0.0],
        ]);
        let dets = decode_output(&out, 2, &square(640), &YoloParams::default())?;
        assert_eq!(dets.len(), 3);
        assert!((dets[0].confidence - 0.95).abs() < 1e-6);
        assert_eq!(dets.iter().filter(|d| d.class_id == 1).count(), 1);
        Ok(())
    }

    #[test]
    fn max_detections_caps_output() {
        let dets = (0..5)
            .map(|i| {
                let x = i as f64 * 100.0;
                Detection::new(0, 0.9, BoundingBox::new(x, 0.0, x + 10.0, 10.0).unwrap())
            })
            .collect();
        assert_eq!(non_max_suppression(dets, 0.5, 3).len(), 3);
    }

    #[test]
    fn malformed_tensor_is_rejected() {
        let letterbox = Letterbox::fit(640, 480, 640).unwrap();
        assert!(decode_output(&[0.0; 7], 2, &letterbox, &YoloParams::default()).is_err());
        assert!(decode_output(&[0.0; 8], 0, &letterbox, &YoloParams::default()).is_err());
    }
}
