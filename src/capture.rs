//! Screen capture module
//! Uses `xcap` to screenshot the primary display and crops to the configured board region.
//! Permissions note: On macOS, grant "Screen & System Audio Recording" permission to the
//! terminal app in System Settings > Privacy & Security.

use anyhow::{bail, Context, Result};
use image::{DynamicImage, GenericImageView};
use std::time::Instant;
use tracing::debug;
use xcap::Monitor;

use crate::config::Region;

/// Captures the primary monitor and crops it to `region`.
pub fn capture_region(region: &Region) -> Result<DynamicImage> {
    let start = Instant::now();

    let monitors = Monitor::all().context("Failed to enumerate monitors")?;

    let primary_monitor = monitors.first().cloned().context("No monitors found")?;

    let screenshot_raw = primary_monitor
        .capture_image()
        .context("Failed to capture image. On macOS, ensure the terminal has Screen Recording permission in System Settings > Privacy & Security > Screen & System Audio Recording")?;

    let screenshot = DynamicImage::ImageRgba8(screenshot_raw);
    if screenshot.dimensions() == (0, 0) {
        bail!("Captured empty screenshot - possible permission issue or no display");
    }

    let cropped = crop_to_region(&screenshot, region)?;
    debug!(latency = ?start.elapsed(), %region, "captured board region");
    Ok(cropped)
}

/// Crops `screenshot` to `region`, rejecting regions that leave the screen.
pub fn crop_to_region(screenshot: &DynamicImage, region: &Region) -> Result<DynamicImage> {
    region.validate()?;

    let (screen_w, screen_h) = screenshot.dimensions();
    if region.x >= screen_w
        || region.y >= screen_h
        || region.x.saturating_add(region.width) > screen_w
        || region.y.saturating_add(region.height) > screen_h
    {
        bail!(
            "Crop region ({}) exceeds screenshot dimensions {}x{}",
            region,
            screen_w,
            screen_h
        );
    }

    Ok(screenshot.crop_imm(region.x, region.y, region.width, region.height))
}
