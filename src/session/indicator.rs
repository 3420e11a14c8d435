//! # Run Indicator Loop
//!
//! Draws session status on rows 2–3 and is the only task that pushes the
//! composed display buffer to the panel while the session runs.
//!
//! | Row | Meaning | Colors |
//! |-----|---------|--------|
//! | 2 | session state | white = ready, blue = active |
//! | 3 | last acquisition tick | off = not recording, green = stored, red = no fix / write failed |

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{SessionControl, SessionState, SharedPanel, TickOutcome, Timing};
use crate::display::{DisplayBuffer, RegionWriter, Rgb, BLUE, GREEN, OFF, RED, WHITE};
use crate::error::Result;

/// Color of the session row.
pub fn session_color(state: SessionState) -> Rgb {
    match state {
        SessionState::Ready => WHITE,
        SessionState::Active => BLUE,
    }
}

/// Color of the outcome row.
pub fn outcome_color(recording: bool, outcome: TickOutcome) -> Rgb {
    if !recording {
        return OFF;
    }
    match outcome {
        TickOutcome::Idle => OFF,
        TickOutcome::Stored => GREEN,
        TickOutcome::NoFix | TickOutcome::WriteFailed => RED,
    }
}

pub struct IndicatorLoop {
    control: Arc<SessionControl>,
    buffer: Arc<DisplayBuffer>,
    region: RegionWriter,
    panel: SharedPanel,
    timing: Timing,
}

impl IndicatorLoop {
    pub fn new(
        control: Arc<SessionControl>,
        buffer: Arc<DisplayBuffer>,
        region: RegionWriter,
        panel: SharedPanel,
        timing: Timing,
    ) -> Self {
        Self {
            control,
            buffer,
            region,
            panel,
            timing,
        }
    }

    /// Render and push once per tick until termination, then clear the panel.
    ///
    /// Push failures are logged and retried next tick. While the session is
    /// faulted nothing is pushed and the final clear is left to the fault
    /// path.
    ///
    /// # Errors
    ///
    /// Returns the panel error if the final clear fails.
    pub async fn run(self) -> Result<()> {
        while self.control.is_running() {
            self.render();
            self.push().await;
            sleep(self.timing.tick).await;
        }

        info!("Stopping LED matrix updates");

        if self.control.is_faulted() {
            debug!("Session faulted, leaving the panel to the fault handler");
            return Ok(());
        }

        let panel = self.panel.lock().await;
        panel.clear().await?;
        Ok(())
    }

    fn render(&self) {
        self.region
            .fill_row(0, session_color(self.control.session_state()));
        self.region.fill_row(
            1,
            outcome_color(self.control.is_recording(), self.control.last_outcome()),
        );
    }

    async fn push(&self) {
        let panel = self.panel.lock().await;
        if self.control.is_faulted() {
            return;
        }
        if let Err(e) = panel.set_frame(&self.buffer.snapshot()).await {
            warn!(error = %e, "Failed to update LED matrix");
        }
    }
}
