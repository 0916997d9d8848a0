#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::yolo::{decode_output, Letterbox, YoloParams, LETTERBOX_FILL};
use crate::frame::Frame;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Loads a local model exported with a `(1, 3, S, S)` float input, letterboxes
/// each frame into `S x S`, and decodes the `(1, 4 + classes, anchors)` output
/// back into frame pixels.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    params: YoloParams,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, params: YoloParams) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = params.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} (input {}x{})",
            model_path.display(),
            size,
            size
        );
        Ok(Self { model, params })
    }

    fn build_input(&self, frame: &Frame, letterbox: &Letterbox) -> Tensor {
        let size = self.params.input_size;
        let resized = image::imageops::resize(
            frame.image(),
            letterbox.resized_width,
            letterbox.resized_height,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
        image::imageops::replace(
            &mut canvas,
            &resized,
            letterbox.pad_x as i64,
            letterbox.pad_y as i64,
        );
        let size = size as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            canvas.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0
        })
        .into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let letterbox = Letterbox::fit(frame.width(), frame.height(), self.params.input_size)?;
        let input = self.build_input(frame, &letterbox);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let shape = output.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(anyhow!(
                "unexpected detector output shape {:?}, want (1, 4 + classes, anchors)",
                shape
            ));
        }
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let values: Vec<f32> = view.iter().copied().collect();
        decode_output(&values, shape[1] - 4, &letterbox, &self.params)
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.params.input_size;
        let blank = Frame::from_rgb(vec![0u8; (size * size * 3) as usize], size, size, 0)?;
        self.detect(&blank).map(|_| ())
    }
}
