//! # Shared Display Buffer
//!
//! One 8×8 image shared by the session loops. Each writer claims a band of
//! rows and may only write inside it; claims are checked so two regions can
//! never overlap. Pixels are individual atomics, so writers and the single
//! reader (the run indicator, which pushes the composed frame) never lock.
//!
//! | Rows | Owner |
//! |------|-------|
//! | 0–1 | satellite visualization |
//! | 2–3 | run/session indicator |
//! | 4–7 | unused |

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::{Frame, Rgb, OFF, PIXELS, WIDTH};
use crate::error::{PicycleError, Result};

/// A contiguous band of matrix rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    rows: Range<usize>,
}

/// Rows 0–1: satellite count.
pub const SATELLITE_REGION: Region = Region::rows(0, 2);

/// Rows 2–3: session status.
pub const INDICATOR_REGION: Region = Region::rows(2, 4);

impl Region {
    /// Rows `start..end`.
    pub const fn rows(start: usize, end: usize) -> Self {
        Self { rows: start..end }
    }

    pub fn row_range(&self) -> Range<usize> {
        self.rows.clone()
    }

    /// Number of cells in the region.
    pub fn len(&self) -> usize {
        (self.rows.end - self.rows.start) * WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Buffer indices covered by the region.
    pub fn cells(&self) -> Range<usize> {
        self.rows.start * WIDTH..self.rows.end * WIDTH
    }

    fn overlaps(&self, other: &Range<usize>) -> bool {
        self.rows.start < other.end && other.start < self.rows.end
    }
}

/// The shared pixel buffer.
#[derive(Debug)]
pub struct DisplayBuffer {
    pixels: [AtomicU32; PIXELS],
    claims: Mutex<Vec<Range<usize>>>,
}

impl DisplayBuffer {
    /// All pixels off, nothing claimed.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pixels: std::array::from_fn(|_| AtomicU32::new(OFF.to_u32())),
            claims: Mutex::new(Vec::new()),
        })
    }

    /// Reserve `region` for exclusive writes.
    ///
    /// The claim is released when the returned writer is dropped.
    ///
    /// # Errors
    ///
    /// `RegionOverlap` if any row is already claimed, or the region runs past
    /// the bottom of the matrix.
    pub fn claim(self: &Arc<Self>, region: Region) -> Result<RegionWriter> {
        if region.cells().end > PIXELS {
            return Err(PicycleError::RegionOverlap {
                requested: region.row_range(),
                claimed: 0..PIXELS / WIDTH,
            });
        }

        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = claims.iter().find(|existing| region.overlaps(existing)) {
            return Err(PicycleError::RegionOverlap {
                requested: region.row_range(),
                claimed: existing.clone(),
            });
        }

        claims.push(region.row_range());

        Ok(RegionWriter {
            buffer: Arc::clone(self),
            region,
        })
    }

    /// Copy of the whole buffer, one atomic load per pixel.
    ///
    /// Pixels are not read together, so a region being repainted during the
    /// copy can show a mix of its old and new cells for one frame.
    pub fn snapshot(&self) -> Frame {
        std::array::from_fn(|i| Rgb::from_u32(self.pixels[i].load(Ordering::Acquire)))
    }

    fn release(&self, rows: &Range<usize>) {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.retain(|claimed| claimed != rows);
    }
}

/// Exclusive write access to one [`Region`].
///
/// Cell indices passed to the writer are relative to the region start.
#[derive(Debug)]
pub struct RegionWriter {
    buffer: Arc<DisplayBuffer>,
    region: Region,
}

impl RegionWriter {
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Set one region cell. Indices outside the region are ignored.
    pub fn set(&self, cell: usize, color: Rgb) {
        if cell < self.region.len() {
            let index = self.region.cells().start + cell;
            self.buffer.pixels[index].store(color.to_u32(), Ordering::Release);
        }
    }

    /// Fill one row of the region (row 0 is the region's first row).
    pub fn fill_row(&self, row: usize, color: Rgb) {
        for col in 0..WIDTH {
            self.set(row * WIDTH + col, color);
        }
    }

    pub fn fill(&self, color: Rgb) {
        for cell in 0..self.region.len() {
            self.set(cell, color);
        }
    }

    pub fn clear(&self) {
        self.fill(OFF);
    }
}

impl Drop for RegionWriter {
    fn drop(&mut self) {
        self.buffer.release(&self.region.rows);
    }
}
