//! Board recognition pipeline.
//! slice -> classify squares -> detect side to move -> assemble FEN.
//! A [`Recognizer`] is built once (templates, thresholds, matcher) and is
//! read-only afterwards; square classification runs in parallel since the
//! squares are independent.

use anyhow::{Context, Result};
use image::{imageops, DynamicImage};
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::active_color::{detect_active_color, ActiveColor};
use crate::classify::{classify, SquareLabel};
use crate::config::Config;
use crate::fen::{assemble, validate_fen, GridBuilder, OccupancyGrid, Occupant};
use crate::matcher::FeatureMatcher;
use crate::sink::RecognitionSink;
use crate::slicer::{color_patch, slice, Square};
use crate::templates::TemplateSet;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub piece: u32,
    pub color: u32,
    pub color_crop_divisor: f32,
}

impl From<&Config> for Thresholds {
    fn from(cfg: &Config) -> Self {
        Self {
            piece: cfg.piece_threshold,
            color: cfg.color_threshold,
            color_crop_divisor: cfg.color_crop_divisor,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Recognition {
    pub grid: OccupancyGrid,
    pub active_color: ActiveColor,
    /// Per-square labels in [`Square::all`] order.
    pub labels: Vec<(Square, SquareLabel)>,
    pub fen: String,
}

pub struct Recognizer {
    templates: TemplateSet,
    matcher: FeatureMatcher,
    thresholds: Thresholds,
}

impl Recognizer {
    pub fn new(templates: TemplateSet, matcher: FeatureMatcher, thresholds: Thresholds) -> Self {
        Self {
            templates,
            matcher,
            thresholds,
        }
    }

    /// Loads the template set named by the config. Fails if any template is missing.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let matcher = FeatureMatcher::new(cfg.matcher.clone());
        let templates = TemplateSet::load(&cfg.templates_dir, &matcher).with_context(|| {
            format!(
                "Failed to load templates from {}",
                cfg.templates_dir.display()
            )
        })?;
        Ok(Self::new(templates, matcher, Thresholds::from(cfg)))
    }

    pub fn recognize_file(&self, path: &Path, sink: &mut dyn RecognitionSink) -> Result<Recognition> {
        let board = image::open(path)
            .with_context(|| format!("Failed to load board image {}", path.display()))?;
        self.recognize(&board, sink)
    }

    pub fn recognize(&self, board: &DynamicImage, sink: &mut dyn RecognitionSink) -> Result<Recognition> {
        let start = Instant::now();
        report(sink.begin());

        let sliced = slice(board)?;
        let patch = color_patch(board, self.thresholds.color_crop_divisor)?;
        let active_color = detect_active_color(
            &imageops::grayscale(&patch),
            &self.templates.white,
            &self.templates.black,
            &self.matcher,
            self.thresholds.color,
        );
        debug!(%active_color, "detected side to move");
        report(sink.on_color_patch(&patch, active_color));

        let labels: Vec<(Square, SquareLabel)> = sliced
            .squares
            .par_iter()
            .map(|sq| {
                let gray = imageops::grayscale(&sq.image);
                let label = classify(&gray, &self.templates, &self.matcher, self.thresholds.piece);
                (sq.square, label)
            })
            .collect();

        let mut builder = GridBuilder::new();
        for (sq, &(square, label)) in sliced.squares.iter().zip(&labels) {
            if label != SquareLabel::Empty {
                debug!(%square, %label, "occupied");
            }
            builder.set(square, label.occupant())?;
            report(sink.on_square(square, &sq.image, label, active_color));
        }
        let grid = builder.build()?;

        let fen = assemble(&grid, active_color);
        validate_fen(&fen)?;

        info!(
            white_pawns = grid.count(Occupant::WhitePawn),
            black_pawns = grid.count(Occupant::BlackPawn),
            %active_color,
            elapsed = ?start.elapsed(),
            "board recognized"
        );

        Ok(Recognition {
            grid,
            active_color,
            labels,
            fen,
        })
    }
}

/// Diagnostics failures never abort recognition.
fn report(result: Result<()>) {
    if let Err(e) = result {
        warn!("Diagnostics sink failed: {:#}", e);
    }
}
