//! # Session Module
//!
//! The recording session: a shared state machine plus three loops that tick
//! once per period until termination.
//!
//! This module handles:
//! - Run/session state shared by the loops and input handlers ([`state`])
//! - GPS polling and persistence ([`acquisition`])
//! - Satellite count on rows 0–1 ([`satellites`])
//! - Session status on rows 2–3 and the frame push ([`indicator`])
//! - Starting, signalling and joining the loops ([`supervisor`])

pub mod acquisition;
pub mod indicator;
pub mod satellites;
pub mod state;
pub mod supervisor;

pub use state::{RunState, SessionControl, SessionState, TickOutcome};
pub use supervisor::Supervisor;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::SessionConfig;
use crate::display::DisplayPanel;

/// The LED panel shared between loops.
///
/// Holding the lock while checking [`SessionControl::is_faulted`] orders the
/// indicator's frame pushes against the error glyph.
pub type SharedPanel = Arc<Mutex<Box<dyn DisplayPanel>>>;

/// Wrap a panel for sharing between loops
pub fn share_panel(panel: impl DisplayPanel + 'static) -> SharedPanel {
    Arc::new(Mutex::new(Box::new(panel)))
}

/// Loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Loop period.
    pub tick: Duration,
    /// Ticks the error glyph stays up before shutdown.
    pub error_cooldown_ticks: u32,
}

impl Timing {
    pub fn cooldown(&self) -> Duration {
        self.tick * self.error_cooldown_ticks
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            error_cooldown_ticks: 3,
        }
    }
}

impl From<&SessionConfig> for Timing {
    fn from(config: &SessionConfig) -> Self {
        Self {
            tick: config.tick(),
            error_cooldown_ticks: config.error_cooldown_ticks,
        }
    }
}
