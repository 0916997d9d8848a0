//! Synthetic camera (`stub://`).
//!
//! Renders a bright ball on a dark, slightly noisy background. The ball's
//! diameter sweeps between two sizes so the detector and range estimator see an
//! object approaching and receding without any hardware attached.

use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::Frame;

pub const BACKGROUND_LEVEL: u8 = 24;
pub const BALL_COLOR: [u8; 3] = [240, 200, 40];
const NOISE_AMPLITUDE: i16 = 6;

/// Configuration for the synthetic scene.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Ball diameter in pixels at the start of each sweep.
    pub start_diameter_px: u32,
    /// Ball diameter in pixels at the end of each sweep.
    pub end_diameter_px: u32,
    /// Frames per sweep. The sweep reverses direction at each end.
    pub sweep_frames: u64,
    /// End of stream after this many frames. `None` runs forever.
    pub frame_limit: Option<u64>,
    /// Seed for background noise.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            start_diameter_px: 40,
            end_diameter_px: 200,
            sweep_frames: 100,
            frame_limit: None,
            seed: 0x5eed,
        }
    }
}

pub(crate) struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    rng: StdRng,
}

impl SyntheticSource {
    pub(crate) fn new(config: SyntheticConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            frame_count: 0,
            rng,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected ({}x{}, ball {}..{} px)",
            self.config.width,
            self.config.height,
            self.config.start_diameter_px,
            self.config.end_diameter_px
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        self.frame_count += 1;
        let diameter = self.diameter_at(self.frame_count);
        let image = self.render(diameter);
        Ok(Some(Frame::new(image, self.frame_count)))
    }

    /// Ball diameter for a 1-based frame number.
    pub(crate) fn diameter_at(&self, frame: u64) -> u32 {
        let start = self.config.start_diameter_px as f64;
        let end = self.config.end_diameter_px as f64;
        let span = self.config.sweep_frames.max(1);
        let step = (frame - 1) % (2 * span);
        let t = if step <= span {
            step as f64 / span as f64
        } else {
            (2 * span - step) as f64 / span as f64
        };
        (start + (end - start) * t).round() as u32
    }

    fn render(&mut self, diameter: u32) -> RgbImage {
        let mut image = RgbImage::from_fn(self.config.width, self.config.height, |_, _| {
            let level = BACKGROUND_LEVEL as i16
                + self.rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
            let level = level.clamp(0, 255) as u8;
            Rgb([level, level, level])
        });
        if diameter > 0 {
            let center = (
                (self.config.width / 2) as i32,
                (self.config.height / 2) as i32,
            );
            let radius = (diameter / 2) as i32;
            draw_filled_circle_mut(&mut image, center, radius, Rgb(BALL_COLOR));
        }
        image
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_reverses_at_both_ends() {
        let source = SyntheticSource::new(SyntheticConfig {
            start_diameter_px: 10,
            end_diameter_px: 110,
            sweep_frames: 10,
            ..SyntheticConfig::default()
        });
        assert_eq!(source.diameter_at(1), 10);
        assert_eq!(source.diameter_at(6), 60);
        assert_eq!(source.diameter_at(11), 110);
        assert_eq!(source.diameter_at(16), 60);
        assert_eq!(source.diameter_at(21), 10);
    }

    #[test]
    fn frame_limit_ends_stream() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 64,
            height: 48,
            start_diameter_px: 10,
            end_diameter_px: 20,
            frame_limit: Some(2),
            ..SyntheticConfig::default()
        });
        source.connect()?;
        assert_eq!(source.next_frame()?.map(|f| f.sequence), Some(1));
        assert_eq!(source.next_frame()?.map(|f| f.sequence), Some(2));
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.frames_captured(), 2);
        Ok(())
    }

    #[test]
    fn ball_is_drawn_at_center() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 64,
            height: 48,
            start_diameter_px: 20,
            end_diameter_px: 20,
            ..SyntheticConfig::default()
        });
        let frame = source.next_frame()?.expect("frame");
        assert_eq!(frame.image().get_pixel(32, 24).0, BALL_COLOR);
        assert!(frame.image().get_pixel(0, 0).0[0] < 64);
        Ok(())
    }
}
