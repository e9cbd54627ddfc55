//! Config module.
//! Manages I/O for board_config.json (capture region, template directory, thresholds).
//! Uses serde for JSON serialization; a missing file means defaults.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::matcher::MatcherParams;

pub const DEFAULT_CONFIG_PATH: &str = "board_config.json";

/// Smallest region that can plausibly hold a readable board.
const MIN_REGION_SIDE: u32 = 64;

/// Shortest allowed pause between screenshots in `watch`.
pub const MIN_INTERVAL_MS: u64 = 50;

/// Screen rectangle in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn validate(&self) -> Result<()> {
        if self.width < MIN_REGION_SIDE || self.height < MIN_REGION_SIDE {
            bail!(
                "Region {} too small for a chessboard (min {}x{} pixels)",
                self,
                MIN_REGION_SIDE,
                MIN_REGION_SIDE
            );
        }
        Ok(())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for Region {
    type Err = String;

    /// `x,y,width,height`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid region '{s}': {e}"))?;
        match parts[..] {
            [x, y, width, height] => Ok(Region {
                x,
                y,
                width,
                height,
            }),
            _ => Err(format!("invalid region '{s}', expected x,y,width,height")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub templates_dir: PathBuf,
    /// Matches a pawn template must exceed.
    pub piece_threshold: u32,
    /// Matches the color swatch must exceed.
    pub color_threshold: u32,
    /// The color marker is the top-left `1/color_crop_divisor` of a1.
    pub color_crop_divisor: f32,
    pub photos_dir: PathBuf,
    pub parser_dir: PathBuf,
    pub region: Option<Region>,
    pub interval_ms: u64,
    pub matcher: MatcherParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            piece_threshold: 20,
            color_threshold: 20,
            color_crop_divisor: 3.6,
            photos_dir: PathBuf::from("photos"),
            parser_dir: PathBuf::from("parser"),
            region: None,
            interval_ms: 1000,
            matcher: MatcherParams::default(),
        }
    }
}

impl Config {
    /// Reads `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Screenshot period for `watch`; `override_ms` comes from the command line.
    pub fn watch_interval(&self, override_ms: Option<u64>) -> Result<Duration> {
        let ms = override_ms.unwrap_or(self.interval_ms);
        if ms < MIN_INTERVAL_MS {
            bail!(
                "Capture interval {}ms is below the minimum of {}ms",
                ms,
                MIN_INTERVAL_MS
            );
        }
        Ok(Duration::from_millis(ms))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, raw)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}
