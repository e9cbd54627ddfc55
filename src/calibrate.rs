//! Calibration module.
//! One-time setup: the user enters the screen rectangle that holds the board.
//! Uses `dialoguer` for terminal prompts; the result is stored in the config.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input};

use crate::config::Region;

/// Prompts for the capture rectangle, offering `current` as the default.
pub fn run_calibration(current: Option<Region>) -> Result<Region> {
    eprintln!("Board region calibration.");
    eprintln!("Enter the screen coordinates of the board's top-left corner and its size in pixels.");
    eprintln!("The region should cover exactly the 64 squares, rank 8 at the top.");

    loop {
        let region = Region {
            x: prompt_u32("Left (x)", current.map(|r| r.x))?,
            y: prompt_u32("Top (y)", current.map(|r| r.y))?,
            width: prompt_u32("Width", current.map(|r| r.width))?,
            height: prompt_u32("Height", current.map(|r| r.height))?,
        };

        if let Err(e) = region.validate() {
            eprintln!("{:#}", e);
            continue;
        }

        let confirmed = Confirm::new()
            .with_prompt(format!("Use region {}?", region))
            .default(true)
            .interact()
            .context("Failed to read confirmation")?;
        if confirmed {
            return Ok(region);
        }
    }
}

fn prompt_u32(prompt: &str, default: Option<u32>) -> Result<u32> {
    let mut input = Input::<u32>::new().with_prompt(prompt);
    if let Some(value) = default {
        input = input.default(value);
    }
    input
        .interact_text()
        .with_context(|| format!("Failed to read {}", prompt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "interactive; needs a terminal"]
    fn test_calibration_flow() {
        let region = run_calibration(None).unwrap();
        assert!(region.validate().is_ok());
    }
}
