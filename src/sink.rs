//! Diagnostics sinks.
//! The recognizer reports the color crop and every classified square to a
//! [`RecognitionSink`] so the pipeline itself stays free of file I/O.
//! Crops written here are for inspection only and are never read back.

use anyhow::{Context, Result};
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::active_color::ActiveColor;
use crate::classify::SquareLabel;
use crate::slicer::Square;

pub const COLOR_PATCH_FILE: &str = "black-or-white.png";

pub trait RecognitionSink {
    /// Called once before anything else in a recognition run.
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_color_patch(&mut self, _patch: &RgbImage, _color: ActiveColor) -> Result<()> {
        Ok(())
    }

    /// Called for every square in board order after classification.
    fn on_square(
        &mut self,
        _square: Square,
        _image: &RgbImage,
        _label: SquareLabel,
        _color: ActiveColor,
    ) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
pub struct NullSink;

impl RecognitionSink for NullSink {}

/// Writes crops to two directories:
/// `photos/` gets the color crop and every occupied square as `{square}_{label}.png`,
/// `parser/` gets every raw square as `{color prefix}{square}.png`.
pub struct DiskSink {
    photos_dir: PathBuf,
    parser_dir: PathBuf,
}

impl DiskSink {
    pub fn new(photos_dir: impl Into<PathBuf>, parser_dir: impl Into<PathBuf>) -> Self {
        Self {
            photos_dir: photos_dir.into(),
            parser_dir: parser_dir.into(),
        }
    }

    pub fn occupied_path(&self, square: Square, label: SquareLabel) -> PathBuf {
        self.photos_dir.join(format!("{}_{}.png", square, label))
    }

    pub fn raw_path(&self, square: Square, color: ActiveColor) -> PathBuf {
        self.parser_dir
            .join(format!("{}{}.png", color.file_prefix(), square))
    }
}

/// Creates `dir` if needed and removes any `*.png` in it.
fn reset_png_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "png") {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

impl RecognitionSink for DiskSink {
    fn begin(&mut self) -> Result<()> {
        reset_png_dir(&self.photos_dir)?;
        reset_png_dir(&self.parser_dir)
    }

    fn on_color_patch(&mut self, patch: &RgbImage, _color: ActiveColor) -> Result<()> {
        if patch.width() == 0 || patch.height() == 0 {
            return Ok(());
        }
        let path = self.photos_dir.join(COLOR_PATCH_FILE);
        patch
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))
    }

    fn on_square(
        &mut self,
        square: Square,
        image: &RgbImage,
        label: SquareLabel,
        color: ActiveColor,
    ) -> Result<()> {
        let raw = self.raw_path(square, color);
        image
            .save(&raw)
            .with_context(|| format!("Failed to save {}", raw.display()))?;

        if label != SquareLabel::Empty {
            let path = self.occupied_path(square, label);
            image
                .save(&path)
                .with_context(|| format!("Failed to save {}", path.display()))?;
            debug!("Saved: {}", path.display());
        }
        Ok(())
    }
}
