//! Reference templates.
//! Six grayscale images loaded once from a fixed directory by fixed filename.
//! Descriptors are computed at load time and shared read-only by every comparison.

use anyhow::{Context, Result};
use image::GrayImage;
use std::path::Path;
use tracing::debug;

use crate::classify::SquareLabel;
use crate::matcher::{FeatureMatcher, Features};

pub const BLACK_PAWN_DARK_FILE: &str = "black-pawn-dark-square.png";
pub const BLACK_PAWN_LIGHT_FILE: &str = "black-pawn-light-square.png";
pub const WHITE_PAWN_DARK_FILE: &str = "white-pawn-dark-square.png";
pub const WHITE_PAWN_LIGHT_FILE: &str = "white-pawn-light-square.png";
pub const WHITE_SWATCH_FILE: &str = "white.png";
pub const BLACK_SWATCH_FILE: &str = "black.png";

pub struct Template {
    name: String,
    image: GrayImage,
    features: Features,
}

impl Template {
    pub fn new(name: impl Into<String>, image: GrayImage, matcher: &FeatureMatcher) -> Self {
        let features = matcher.features(&image);
        Self {
            name: name.into(),
            image,
            features,
        }
    }

    pub fn load(path: &Path, matcher: &FeatureMatcher) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("Failed to load template {}", path.display()))?
            .to_luma8();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let template = Self::new(name, image, matcher);
        debug!(
            template = %template.name,
            descriptors = template.features.len(),
            "loaded template"
        );
        Ok(template)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn features(&self) -> &Features {
        &self.features
    }
}

pub struct TemplateSet {
    pub black_pawn_dark: Template,
    pub black_pawn_light: Template,
    pub white_pawn_dark: Template,
    pub white_pawn_light: Template,
    pub white: Template,
    pub black: Template,
}

impl TemplateSet {
    /// Loads all six templates; any missing or unreadable file is fatal.
    pub fn load(dir: &Path, matcher: &FeatureMatcher) -> Result<Self> {
        let load = |file: &str| Template::load(&dir.join(file), matcher);
        Ok(Self {
            black_pawn_dark: load(BLACK_PAWN_DARK_FILE)?,
            black_pawn_light: load(BLACK_PAWN_LIGHT_FILE)?,
            white_pawn_dark: load(WHITE_PAWN_DARK_FILE)?,
            white_pawn_light: load(WHITE_PAWN_LIGHT_FILE)?,
            white: load(WHITE_SWATCH_FILE)?,
            black: load(BLACK_SWATCH_FILE)?,
        })
    }

    /// Pawn templates in classification priority order.
    pub fn pawns(&self) -> [(SquareLabel, &Template); 4] {
        [
            (SquareLabel::BlackPawnDarkSquare, &self.black_pawn_dark),
            (SquareLabel::BlackPawnLightSquare, &self.black_pawn_light),
            (SquareLabel::WhitePawnDarkSquare, &self.white_pawn_dark),
            (SquareLabel::WhitePawnLightSquare, &self.white_pawn_light),
        ]
    }
}
