//! Frame overlays and annotated-frame output.
//!
//! Boxes are colour-coded by class id, marker outlines are green, chessboard
//! corners are red crosses. Labels are rasterised with the bundled DejaVu Sans
//! face: detection labels sit on a filled strip above their box, marker labels
//! are stacked around the tag centre and the calibration view count is shown
//! in the top-left corner.

use ab_glyph::FontRef;
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_cross_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use crate::fiducial::MarkerPose;
use crate::frame::Frame;
use crate::geometry::BoundingBox;

static LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Per-class colours, indexed by `class_id % len`.
pub const CLASS_COLORS: [Rgb<u8>; 6] = [
    Rgb([0, 0, 255]),
    Rgb([0, 255, 0]),
    Rgb([255, 0, 0]),
    Rgb([0, 255, 255]),
    Rgb([255, 255, 0]),
    Rgb([255, 0, 255]),
];

pub const MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const CORNER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const TAG_ID_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const TAG_AXIS_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
pub const CAPTURE_COUNT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

const BOX_THICKNESS: u32 = 2;
/// Glyph height in pixels.
const LABEL_SCALE: f32 = 18.0;
const LABEL_PAD: u32 = 2;
/// Vertical offsets of the id and x/y/z lines relative to the tag centre.
const TAG_LINE_OFFSETS: [i32; 4] = [-40, -20, 0, 20];
const CAPTURE_COUNT_ORIGIN: (i32, i32) = (30, 10);

fn label_font() -> Result<FontRef<'static>> {
    FontRef::try_from_slice(LABEL_FONT).map_err(|e| anyhow!("bundled label font: {e}"))
}

pub fn class_color(class_id: usize) -> Rgb<u8> {
    CLASS_COLORS[class_id % CLASS_COLORS.len()]
}

/// Draw a box outline, `BOX_THICKNESS` pixels wide, growing inwards.
pub fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let bbox = bbox.clamp_to(image.width(), image.height());
    for inset in 0..BOX_THICKNESS {
        let inset = inset as f64;
        let x = (bbox.x1() + inset).round();
        let y = (bbox.y1() + inset).round();
        let w = (bbox.pixel_width() - 2.0 * inset).round();
        let h = (bbox.pixel_height() - 2.0 * inset).round();
        if w < 1.0 || h < 1.0 {
            break;
        }
        draw_hollow_rect_mut(
            image,
            Rect::at(x as i32, y as i32).of_size(w as u32, h as u32),
            color,
        );
    }
}

/// Close the marker quadrilateral through its four corners.
pub fn draw_marker(image: &mut RgbImage, corners: &[[f64; 2]; 4]) {
    for i in 0..corners.len() {
        let start = corners[i];
        let end = corners[(i + 1) % corners.len()];
        draw_line_segment_mut(
            image,
            (start[0] as f32, start[1] as f32),
            (end[0] as f32, end[1] as f32),
            MARKER_COLOR,
        );
    }
}

pub fn draw_corners(image: &mut RgbImage, corners: &[[f32; 2]]) {
    for corner in corners {
        draw_cross_mut(
            image,
            CORNER_COLOR,
            corner[0].round() as i32,
            corner[1].round() as i32,
        );
    }
}

/// Draw `text` with its top-left corner at `origin`, no background.
pub fn draw_text(
    image: &mut RgbImage,
    origin: (i32, i32),
    text: &str,
    color: Rgb<u8>,
) -> Result<()> {
    let font = label_font()?;
    draw_text_mut(image, color, origin.0, origin.1, LABEL_SCALE, &font, text);
    Ok(())
}

/// Draw `text` in white on a filled `background` strip whose bottom-left
/// corner is `anchor`, typically the top-left corner of a box. The strip is
/// pushed down when it would leave the top of the image.
pub fn draw_label(
    image: &mut RgbImage,
    anchor: (i32, i32),
    text: &str,
    background: Rgb<u8>,
) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let font = label_font()?;
    let (w, h) = text_size(LABEL_SCALE, &font, text);
    let strip_w = w + 2 * LABEL_PAD;
    let strip_h = h + 2 * LABEL_PAD;
    let top = (anchor.1 - strip_h as i32).max(0);
    let strip = Rect::at(anchor.0, top).of_size(strip_w, strip_h);
    draw_filled_rect_mut(image, strip, background);
    draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        anchor.0 + LABEL_PAD as i32,
        top + LABEL_PAD as i32,
        LABEL_SCALE,
        &font,
        text,
    );
    Ok(())
}

/// Box outline plus its label strip.
pub fn draw_labeled_box(
    image: &mut RgbImage,
    bbox: &BoundingBox,
    text: &str,
    color: Rgb<u8>,
) -> Result<()> {
    draw_box(image, bbox, color);
    let anchor = (bbox.x1().round() as i32, bbox.y1().round() as i32);
    draw_label(image, anchor, text, color)
}

/// Marker outline with the id line in red and x/y/z lines in cyan around the
/// tag centre.
pub fn draw_marker_pose(image: &mut RgbImage, pose: &MarkerPose) -> Result<()> {
    draw_marker(image, &pose.corners);
    let x = pose.center[0].round() as i32;
    let y = pose.center[1].round() as i32;
    for (i, (line, dy)) in pose.labels().iter().zip(TAG_LINE_OFFSETS).enumerate() {
        let color = if i == 0 { TAG_ID_COLOR } else { TAG_AXIS_COLOR };
        draw_text(image, (x, y + dy), line, color)?;
    }
    Ok(())
}

pub fn draw_capture_count(image: &mut RgbImage, count: usize) -> Result<()> {
    draw_text(
        image,
        CAPTURE_COUNT_ORIGIN,
        &format!("Captured: {count}"),
        CAPTURE_COUNT_COLOR,
    )
}

/// Optional directory receiving annotated frames as PNG files.
#[derive(Clone, Debug, Default)]
pub struct AnnotationSink {
    dir: Option<PathBuf>,
    written: u64,
}

impl AnnotationSink {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create the directory if needed.
    pub fn to_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating annotation directory {}", dir.display()))?;
        Ok(Self {
            dir: Some(dir),
            written: 0,
        })
    }

    /// `to_dir` when a directory is configured, otherwise disabled.
    pub fn optional(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Self::to_dir(dir),
            None => Ok(Self::disabled()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn save(&mut self, frame: &Frame) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let path = dir.join(format!("frame_{:06}.png", frame.sequence));
        frame
            .image()
            .save(&path)
            .with_context(|| format!("writing annotated frame {}", path.display()))?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_outline_leaves_interior_untouched() {
        let mut image = RgbImage::new(40, 40);
        let bbox = BoundingBox::new(10.0, 10.0, 30.0, 30.0).unwrap();
        draw_box(&mut image, &bbox, class_color(0));
        assert_eq!(*image.get_pixel(10, 20), CLASS_COLORS[0]);
        assert_eq!(*image.get_pixel(11, 20), CLASS_COLORS[0]);
        assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn degenerate_box_draws_nothing() {
        let mut image = RgbImage::new(10, 10);
        let bbox = BoundingBox::new(5.0, 5.0, 5.0, 5.0).unwrap();
        draw_box(&mut image, &bbox, class_color(1));
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn label_strip_sits_above_the_box() -> Result<()> {
        let mut image = RgbImage::new(200, 120);
        let bbox = BoundingBox::new(40.0, 60.0, 120.0, 100.0)?;
        let color = class_color(0);
        draw_labeled_box(&mut image, &bbox, "ball: 0.49 m", color)?;

        assert_eq!(*image.get_pixel(40, 59), color);
        let strip: Vec<&Rgb<u8>> = (30..60)
            .flat_map(|y| (40..200).map(move |x| (x, y)))
            .map(|(x, y)| image.get_pixel(x, y))
            .collect();
        // White glyph pixels blend into the blue strip, raising red and green.
        assert!(strip.iter().any(|p| p[0] > 0 && p[1] > 0));
        assert_eq!(*image.get_pixel(20, 40), Rgb([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn label_at_top_edge_stays_in_frame() -> Result<()> {
        let mut image = RgbImage::new(120, 60);
        draw_label(&mut image, (0, 0), "close", class_color(2))?;
        assert_eq!(*image.get_pixel(0, 0), class_color(2));
        Ok(())
    }

    #[test]
    fn marker_pose_text_is_drawn_around_the_centre() -> Result<()> {
        let mut image = RgbImage::new(160, 120);
        let pose = MarkerPose {
            tag_id: 4,
            corners: [[60.0, 40.0], [100.0, 40.0], [100.0, 80.0], [60.0, 80.0]],
            center: [80.0, 60.0],
            translation_cm: [1.0, -2.0, 40.0],
        };
        draw_marker_pose(&mut image, &pose)?;
        assert_eq!(*image.get_pixel(80, 40), MARKER_COLOR);
        let id_row_painted = (20..40)
            .flat_map(|y| (80..160).map(move |x| (x, y)))
            .any(|(x, y)| image.get_pixel(x, y)[0] > 0 && image.get_pixel(x, y)[1] == 0);
        assert!(id_row_painted);
        Ok(())
    }

    #[test]
    fn capture_count_is_painted_top_left() -> Result<()> {
        let mut image = RgbImage::new(200, 60);
        draw_capture_count(&mut image, 7)?;
        assert!(image.pixels().any(|p| p[1] > 0));
        assert!(image.pixels().all(|p| p[0] == 0 && p[2] == 0));
        Ok(())
    }

    #[test]
    fn class_colors_wrap() {
        assert_eq!(class_color(7), class_color(1));
    }

    #[test]
    fn sink_writes_numbered_png() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = AnnotationSink::to_dir(dir.path().join("out"))?;
        let frame = Frame::new(RgbImage::new(4, 4), 12);
        sink.save(&frame)?;
        assert!(dir.path().join("out").join("frame_000012.png").exists());
        assert_eq!(sink.written(), 1);

        let mut disabled = AnnotationSink::disabled();
        disabled.save(&frame)?;
        assert_eq!(disabled.written(), 0);
        Ok(())
    }
}
