//! # Matrix Text Rendering
//!
//! Draws characters with the 5×7 mono font from `embedded-graphics` onto an
//! 8-pixel-high canvas, then cuts 8×8 frames out of it.

use embedded_graphics::mono_font::ascii::FONT_5X7;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};

use super::{Frame, Rgb, BLANK_FRAME, HEIGHT, OFF, WIDTH};

/// Column where a single glyph starts so a 5-wide character sits centered.
const GLYPH_X: i32 = 1;

/// Variable-width, 8-pixel-high drawing surface.
struct Canvas {
    width: usize,
    pixels: Vec<Rgb>,
}

impl Canvas {
    fn new(width: usize) -> Self {
        Self {
            width,
            pixels: vec![OFF; width * HEIGHT],
        }
    }

    /// Copy the 8 columns starting at `x` into a frame.
    fn window(&self, x: usize) -> Frame {
        let mut frame = BLANK_FRAME;
        for row in 0..HEIGHT {
            for col in 0..WIDTH {
                if let Some(pixel) = self.pixels.get(row * self.width + x + col) {
                    if x + col < self.width {
                        frame[row * WIDTH + col] = *pixel;
                    }
                }
            }
        }
        frame
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.width as u32, HEIGHT as u32)
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            let (x, y) = (point.x as usize, point.y as usize);
            if x < self.width && y < HEIGHT {
                self.pixels[y * self.width + x] = Rgb::new(color.r(), color.g(), color.b());
            }
        }
        Ok(())
    }
}

fn style(color: Rgb) -> MonoTextStyle<'static, Rgb888> {
    MonoTextStyle::new(&FONT_5X7, Rgb888::new(color.r, color.g, color.b))
}

/// Pixel width of `text` in the matrix font.
pub fn text_width(text: &str) -> usize {
    Text::with_baseline(text, Point::zero(), style(OFF), Baseline::Top)
        .bounding_box()
        .size
        .width as usize
}

/// A single character centered on the matrix.
pub fn glyph_frame(glyph: char, color: Rgb) -> Frame {
    let mut canvas = Canvas::new(WIDTH);
    let mut buf = [0u8; 4];
    let text = glyph.encode_utf8(&mut buf);

    let _ = Text::with_baseline(text, Point::new(GLYPH_X, 0), style(color), Baseline::Top)
        .draw(&mut canvas);

    canvas.window(0)
}

/// Frames for scrolling `message` across the matrix, one column per frame.
///
/// The text enters from the right edge and leaves on the left, so the first
/// and last frames are blank.
pub fn scroll_frames(message: &str, color: Rgb) -> Vec<Frame> {
    let width = WIDTH + text_width(message) + WIDTH;
    let mut canvas = Canvas::new(width);

    let _ = Text::with_baseline(message, Point::new(WIDTH as i32, 0), style(color), Baseline::Top)
        .draw(&mut canvas);

    (0..=width - WIDTH).map(|x| canvas.window(x)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{RED, WHITE};

    fn lit_columns(frame: &Frame) -> Vec<usize> {
        let mut cols: Vec<usize> = frame
            .iter()
            .enumerate()
            .filter(|(_, p)| **p != OFF)
            .map(|(i, _)| i % WIDTH)
            .collect();
        cols.sort_unstable();
        cols.dedup();
        cols
    }

    #[test]
    fn test_glyph_is_lit_in_requested_color() {
        let frame = glyph_frame('E', RED);
        assert!(frame.iter().any(|p| *p == RED));
        assert!(frame.iter().all(|p| *p == RED || *p == OFF));
    }

    #[test]
    fn test_glyph_is_centered() {
        let frame = glyph_frame('E', RED);
        let cols = lit_columns(&frame);
        assert!(!cols.is_empty());
        assert!(*cols.first().unwrap() >= GLYPH_X as usize);
        assert!(*cols.last().unwrap() < GLYPH_X as usize + 5);
    }

    #[test]
    fn test_space_glyph_is_blank() {
        assert_eq!(glyph_frame(' ', WHITE), BLANK_FRAME);
    }

    #[test]
    fn test_text_width_grows_with_length() {
        assert_eq!(text_width("A"), 5);
        assert_eq!(text_width("AB"), 2 * text_width("A"));
        assert!(text_width("Picycle") > text_width("Pi"));
    }

    #[test]
    fn test_scroll_frame_count() {
        // One frame per column shift: 8 + width + 8 columns, 8-wide window
        let frames = scroll_frames("Picycle", WHITE);
        assert_eq!(frames.len(), text_width("Picycle") + WIDTH + 1);
    }

    #[test]
    fn test_scroll_starts_and_ends_blank() {
        let frames = scroll_frames("Go", WHITE);
        assert_eq!(frames[0], BLANK_FRAME);
        assert_eq!(*frames.last().unwrap(), BLANK_FRAME);
    }

    #[test]
    fn test_scroll_passes_through_glyph() {
        // When the window sits exactly on the text start, the first letter
        // appears at column 0 of the frame.
        let frames = scroll_frames("E", RED);
        let aligned = frames[WIDTH];
        let centered = glyph_frame('E', RED);

        for row in 0..HEIGHT {
            for col in 0..5 {
                assert_eq!(
                    aligned[row * WIDTH + col],
                    centered[row * WIDTH + col + GLYPH_X as usize]
                );
            }
        }
    }
}
