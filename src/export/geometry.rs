//! Contain-fit geometry
//!
//! Computes where a source frame lands inside the target buffer: uniformly
//! scaled to fit, centred, never cropped.

use crate::config::ExportConfig;
use crate::export::types::ExportPreset;
use crate::media::SourceMetadata;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Source dimensions are zero ({width}x{height})")]
    ZeroSource { width: u32, height: u32 },
}

/// Placement of the scaled source inside the target buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawRect {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

/// Fit a `source_w`x`source_h` frame inside a `target_w`x`target_h` buffer
///
/// Draw size is rounded to whole pixels and clamped to the target; offsets
/// split the remaining space evenly (odd remainders leave the extra pixel
/// on the right/bottom).
pub fn contain_fit(
    source_w: u32,
    source_h: u32,
    target_w: u32,
    target_h: u32,
) -> Result<DrawRect, GeometryError> {
    if source_w == 0 || source_h == 0 {
        return Err(GeometryError::ZeroSource {
            width: source_w,
            height: source_h,
        });
    }

    let scale = f64::min(
        target_w as f64 / source_w as f64,
        target_h as f64 / source_h as f64,
    );
    let width = ((source_w as f64 * scale).round() as u32).min(target_w);
    let height = ((source_h as f64 * scale).round() as u32).min(target_h);

    Ok(DrawRect {
        width,
        height,
        x: (target_w - width) / 2,
        y: (target_h - height) / 2,
    })
}

/// Output buffer size and cadence for one export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Resolve the output buffer for a preset
///
/// Missing preset dimensions inherit the source's native size, then the
/// configured fallback.
pub fn resolve_target(
    preset: &ExportPreset,
    metadata: Option<&SourceMetadata>,
    config: &ExportConfig,
) -> RenderTarget {
    let native_w = metadata.map(|m| m.width).filter(|w| *w > 0);
    let native_h = metadata.map(|m| m.height).filter(|h| *h > 0);

    RenderTarget {
        width: preset.width.or(native_w).unwrap_or(config.fallback_width),
        height: preset.height.or(native_h).unwrap_or(config.fallback_height),
        fps: preset.fps.unwrap_or(config.default_fps),
    }
}
