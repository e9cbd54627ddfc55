//! Active-color detector.
//! Matches the a1 corner crop against the black swatch, then the white one.

use image::GrayImage;
use std::fmt;

use crate::matcher::FeatureMatcher;
use crate::templates::Template;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActiveColor {
    White,
    Black,
    #[default]
    Unknown,
}

impl ActiveColor {
    /// Side-to-move field. Anything not recognized as white is reported as black.
    pub fn fen_char(self) -> char {
        match self {
            ActiveColor::White => 'w',
            ActiveColor::Black | ActiveColor::Unknown => 'b',
        }
    }

    /// Filename prefix for raw square crops.
    pub fn file_prefix(self) -> &'static str {
        match self {
            ActiveColor::White => "white_",
            ActiveColor::Black => "black_",
            ActiveColor::Unknown => "whoareyou_",
        }
    }
}

impl fmt::Display for ActiveColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveColor::White => write!(f, "white"),
            ActiveColor::Black => write!(f, "black"),
            ActiveColor::Unknown => write!(f, "unknown"),
        }
    }
}

pub fn detect_active_color(
    corner_patch: &GrayImage,
    white_template: &Template,
    black_template: &Template,
    matcher: &FeatureMatcher,
    threshold: u32,
) -> ActiveColor {
    let patch = matcher.features(corner_patch);
    if matcher
        .compare_features(&patch, black_template.features(), threshold)
        .matched
    {
        ActiveColor::Black
    } else if matcher
        .compare_features(&patch, white_template.features(), threshold)
        .matched
    {
        ActiveColor::White
    } else {
        ActiveColor::Unknown
    }
}
