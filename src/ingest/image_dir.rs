//! Still-image directory source (`dir://<path>`).
//!
//! Plays back the PNG/JPEG files of a directory in file-name order, one frame
//! per file. Useful for replaying captured calibration views or test footage.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub(crate) struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
}

impl ImageDirSource {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            cursor: 0,
            frame_count: 0,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("open image directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no PNG or JPEG images in {}", self.dir.display()));
        }
        files.sort();
        log::info!(
            "ImageDirSource: connected to {} ({} images)",
            self.dir.display(),
            files.len()
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let image = image::open(path)
            .with_context(|| format!("decode image {}", path.display()))?
            .to_rgb8();
        self.frame_count += 1;
        Ok(Some(Frame::new(image, self.frame_count)))
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn plays_images_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::from_pixel(4, 2, Rgb([200, 0, 0])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(4, 2, Rgb([0, 200, 0])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let mut source = ImageDirSource::new(dir.path());
        source.connect()?;
        let first = source.next_frame()?.expect("first frame");
        assert_eq!(first.image().get_pixel(0, 0).0, [0, 200, 0]);
        let second = source.next_frame()?.expect("second frame");
        assert_eq!(second.sequence, 2);
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_open() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = ImageDirSource::new(dir.path());
        assert!(source.connect().is_err());
        Ok(())
    }
}
