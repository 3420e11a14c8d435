//! # Satellite Visualization Loop
//!
//! Shows how many satellites the receiver sees on the top two matrix rows.
//! Satellite `x` lights cell `(x % 2) * 8 + x / 2`, so even satellites fill
//! row 0 and odd ones row 1, left to right:
//!
//! ```text
//! row 0:  0  2  4  6  8 10 12 14
//! row 1:  1  3  5  7  9 11 13 15
//! ```
//!
//! Satellites 0–3 are red, 4–7 yellow and 8–15 green. The loop polls the
//! receiver on its own, independent of the session state, so the rider can
//! watch the lock build up before starting a recording.

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{SessionControl, Timing};
use crate::display::{RegionWriter, Rgb, GREEN, OFF, RED, YELLOW};
use crate::error::Result;
use crate::gps::PositionSource;

/// Cells available for satellites.
pub const SATELLITE_CELLS: usize = 16;

/// Signal strength band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTier {
    /// 0–3
    Weak,
    /// 4–7
    Marginal,
    /// 8 and up
    Strong,
}

impl SignalTier {
    /// Band for a satellite index or count.
    pub fn for_count(count: usize) -> Self {
        match count {
            0..=3 => SignalTier::Weak,
            4..=7 => SignalTier::Marginal,
            _ => SignalTier::Strong,
        }
    }

    pub fn color(self) -> Rgb {
        match self {
            SignalTier::Weak => RED,
            SignalTier::Marginal => YELLOW,
            SignalTier::Strong => GREEN,
        }
    }
}

/// Region cell for satellite index `x`.
pub fn satellite_cell(x: usize) -> usize {
    (x % 2) * 8 + x / 2
}

/// Region contents for `count` satellites.
///
/// Counts above 16 light all 16 cells.
pub fn satellite_cells(count: usize) -> [Rgb; SATELLITE_CELLS] {
    let mut cells = [OFF; SATELLITE_CELLS];
    for x in 0..count.min(SATELLITE_CELLS) {
        cells[satellite_cell(x)] = SignalTier::for_count(x).color();
    }
    cells
}

/// Renders the satellite count into rows 0–1 of the display buffer.
pub struct SatelliteLoop {
    control: Arc<SessionControl>,
    source: Arc<dyn PositionSource>,
    region: RegionWriter,
    timing: Timing,
}

impl SatelliteLoop {
    pub fn new(
        control: Arc<SessionControl>,
        source: Arc<dyn PositionSource>,
        region: RegionWriter,
        timing: Timing,
    ) -> Self {
        Self {
            control,
            source,
            region,
            timing,
        }
    }

    /// Poll and render once per tick until termination.
    ///
    /// Poll failures blank the region for that tick. The loop never touches
    /// the panel itself.
    pub async fn run(self) -> Result<()> {
        let mut last_count = None;

        while self.control.is_running() {
            let count = match self.source.current_fix().await {
                Ok(fix) => fix.satellites,
                Err(e) if e.is_transient() => {
                    debug!(error = %e, "Satellite poll failed");
                    0
                }
                Err(e) => {
                    warn!(error = %e, "Satellite poll failed");
                    0
                }
            };

            if last_count != Some(count) {
                debug!(satellites = count, tier = ?SignalTier::for_count(count), "Satellite count changed");
                last_count = Some(count);
            }

            self.render(count);
            sleep(self.timing.tick).await;
        }

        info!("Stopping satellite tracking");
        Ok(())
    }

    fn render(&self, count: usize) {
        for (cell, color) in satellite_cells(count).iter().enumerate() {
            self.region.set(cell, *color);
        }
    }
}
