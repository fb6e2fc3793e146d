//! In-memory render target
//!
//! An RGBA buffer the frame pump draws into. Each draw clears the buffer to
//! the letterbox color and blits the source frame into its contain-fit rect.

use crate::export::geometry::{contain_fit, DrawRect, GeometryError};
use crate::media::VideoFrame;

/// Letterbox fill color (opaque black)
pub const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

/// Fixed-size RGBA frame buffer
#[derive(Debug, Clone)]
pub struct FrameCanvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        let mut canvas = Self {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize) * 4],
        };
        canvas.fill(BACKGROUND);
        canvas
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA pixel data, row-major
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn fill(&mut self, color: [u8; 4]) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    /// RGBA value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[idx..idx + 4]);
        Some(px)
    }

    /// Clear to the background and draw `frame` contain-fitted and centred
    pub fn draw_contain(&mut self, frame: &VideoFrame) -> Result<DrawRect, GeometryError> {
        let rect = contain_fit(frame.width, frame.height, self.width, self.height)?;
        self.fill(BACKGROUND);
        self.blit_scaled(frame, rect);
        Ok(rect)
    }

    /// Nearest-neighbour scale `frame` into `rect`
    fn blit_scaled(&mut self, frame: &VideoFrame, rect: DrawRect) {
        if rect.width == 0 || rect.height == 0 {
            return;
        }

        for dy in 0..rect.height {
            let src_y = ((dy as f64 * frame.height as f64 / rect.height as f64) as u32)
                .min(frame.height - 1);
            let dest_y = rect.y + dy;
            if dest_y >= self.height {
                continue;
            }

            for dx in 0..rect.width {
                let src_x = ((dx as f64 * frame.width as f64 / rect.width as f64) as u32)
                    .min(frame.width - 1);
                let dest_x = rect.x + dx;
                if dest_x >= self.width {
                    continue;
                }

                let src_idx = ((src_y * frame.width + src_x) * 4) as usize;
                let dest_idx = ((dest_y * self.width + dest_x) * 4) as usize;

                if src_idx + 3 >= frame.data.len() || dest_idx + 3 >= self.data.len() {
                    continue;
                }

                self.data[dest_idx..dest_idx + 3].copy_from_slice(&frame.data[src_idx..src_idx + 3]);
                self.data[dest_idx + 3] = 255; // Full opacity
            }
        }
    }
}
