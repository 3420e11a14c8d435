//! # Display Module
//!
//! 8×8 RGB LED matrix output.
//!
//! This module handles:
//! - The shared in-memory [`DisplayBuffer`] with per-loop reserved regions
//! - The [`DisplayPanel`] seam used by the session loops
//! - Rendering letters and scrolling messages onto the matrix
//! - The Sense HAT framebuffer driver

pub mod buffer;
pub mod sense_hat;
pub mod text;

pub use buffer::{DisplayBuffer, Region, RegionWriter, INDICATOR_REGION, SATELLITE_REGION};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Matrix width in pixels.
pub const WIDTH: usize = 8;
/// Matrix height in pixels.
pub const HEIGHT: usize = 8;
/// Pixels per frame.
pub const PIXELS: usize = WIDTH * HEIGHT;

/// One LED color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Packs into `0x00RRGGBB`.
    pub const fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub const fn from_u32(value: u32) -> Self {
        Self {
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        }
    }

    /// Converts to the RGB565 layout the Sense HAT framebuffer expects.
    pub const fn to_rgb565(self) -> u16 {
        ((self.r as u16 >> 3) << 11) | ((self.g as u16 >> 2) << 5) | (self.b as u16 >> 3)
    }
}

pub const OFF: Rgb = Rgb::new(0, 0, 0);
pub const RED: Rgb = Rgb::new(255, 0, 0);
pub const YELLOW: Rgb = Rgb::new(255, 255, 0);
pub const GREEN: Rgb = Rgb::new(0, 255, 0);
pub const BLUE: Rgb = Rgb::new(0, 0, 255);
pub const WHITE: Rgb = Rgb::new(255, 255, 255);

/// A full matrix image, row-major.
pub type Frame = [Rgb; PIXELS];

/// All pixels off.
pub const BLANK_FRAME: Frame = [OFF; PIXELS];

/// Physical LED matrix.
///
/// Only [`DisplayPanel::set_frame`] is required; clearing, letters and
/// scrolling messages are built on top of it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DisplayPanel: Send + Sync {
    /// Push a complete frame to the LEDs.
    async fn set_frame(&self, frame: &Frame) -> Result<()>;

    /// Turn every LED off.
    async fn clear(&self) -> Result<()> {
        self.set_frame(&BLANK_FRAME).await
    }

    /// Show a single character.
    async fn show_glyph(&self, glyph: char, color: Rgb) -> Result<()> {
        self.set_frame(&text::glyph_frame(glyph, color)).await
    }

    /// Scroll `message` right to left, one column every `step`.
    ///
    /// Ends on a blank frame.
    async fn show_message(&self, message: &str, color: Rgb, step: Duration) -> Result<()> {
        for frame in text::scroll_frames(message, color) {
            self.set_frame(&frame).await?;
            tokio::time::sleep(step).await;
        }
        Ok(())
    }
}
