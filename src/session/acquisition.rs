//! # Acquisition Loop
//!
//! Polls the receiver and persists readings while a session is active.
//!
//! Every tick the loop looks at the session state:
//!
//! - **Ready**: close any open store and sleep. No poll, no storage access.
//! - **Active**: open a store if none is open (a new store per Ready→Active
//!   transition), poll once and append the reading if the fix is 3D.
//!
//! Store calls run on tokio's blocking pool, so a slow SD card never holds
//! up the satellite and indicator ticks.
//!
//! A missing fix or a failed append only costs that tick. Failing to open a
//! store is fatal: the error glyph is shown for the cooldown, the panel is
//! cleared and the whole session terminates with [`PicycleError::StoreOpen`].

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{SessionControl, SessionState, SharedPanel, TickOutcome, Timing};
use crate::display::RED;
use crate::error::{PicycleError, Result};
use crate::gps::{Fix, FixMode, PositionSource};
use crate::storage::{SessionNamer, SessionStore, StorageGateway};

/// Glyph shown when a session store cannot be opened
pub const ERROR_GLYPH: char = 'E';

pub struct AcquisitionLoop {
    control: Arc<SessionControl>,
    source: Arc<dyn PositionSource>,
    gateway: Arc<dyn StorageGateway>,
    panel: SharedPanel,
    namer: SessionNamer,
    timing: Timing,
}

impl AcquisitionLoop {
    pub fn new(
        control: Arc<SessionControl>,
        source: Arc<dyn PositionSource>,
        gateway: Arc<dyn StorageGateway>,
        panel: SharedPanel,
        namer: SessionNamer,
        timing: Timing,
    ) -> Self {
        Self {
            control,
            source,
            gateway,
            panel,
            namer,
            timing,
        }
    }

    /// Tick until termination.
    ///
    /// # Errors
    ///
    /// Returns `StoreOpen` if a session store could not be created or its
    /// table could not be set up. The session has already been terminated
    /// and the panel cleared when this is returned.
    pub async fn run(mut self) -> Result<()> {
        let mut store: Option<Box<dyn SessionStore>> = None;

        while self.control.is_running() {
            match self.control.session_state() {
                SessionState::Ready => {
                    if let Some(open) = store.take() {
                        self.close(open).await;
                    }
                }
                SessionState::Active => {
                    let open = match store.take() {
                        Some(open) => open,
                        None => match self.open_store().await {
                            Ok(opened) => opened,
                            Err(e) => return self.fail(e).await,
                        },
                    };

                    let (open, outcome) = self.record_tick(open).await?;
                    store = Some(open);
                    self.control.report(outcome);
                }
            }

            sleep(self.timing.tick).await;
        }

        if let Some(open) = store.take() {
            self.close(open).await;
        }

        info!("Stopping track recording");
        Ok(())
    }

    async fn open_store(&mut self) -> Result<Box<dyn SessionStore>> {
        let name = self.namer.next_name();
        info!(store = %name, "New recording session");

        let gateway = Arc::clone(&self.gateway);
        let opening = name.clone();
        let store = blocking(move || -> Result<Box<dyn SessionStore>> {
            let mut store = gateway.open(&opening)?;
            store.ensure_schema()?;
            Ok(store)
        })
        .await
        .and_then(|opened| opened)
        .map_err(|e| PicycleError::StoreOpen {
            name,
            reason: e.to_string(),
        })?;

        self.control.set_recording(true);
        Ok(store)
    }

    async fn close(&self, store: Box<dyn SessionStore>) {
        let name = store.name();
        self.control.set_recording(false);
        self.control.report(TickOutcome::Idle);

        match blocking(move || store.close()).await.and_then(|closed| closed) {
            Ok(()) => info!(store = %name, "Recording session closed"),
            Err(e) => warn!(store = %name, error = %e, "Failed to close session store"),
        }
    }

    /// One active tick: poll, then append if the fix is usable.
    ///
    /// The store is handed back with the outcome. Only a panic inside the
    /// storage thread is returned as an error.
    async fn record_tick(
        &self,
        mut store: Box<dyn SessionStore>,
    ) -> Result<(Box<dyn SessionStore>, TickOutcome)> {
        let fix = match self.source.current_fix().await {
            Ok(fix) => fix,
            Err(e) => {
                if e.is_transient() {
                    debug!(error = %e, "Position poll failed");
                } else {
                    warn!(error = %e, "Position poll failed");
                }
                return Ok((store, TickOutcome::NoFix));
            }
        };

        log_fix_status(&fix);

        let reading = match fix.reading() {
            Ok(reading) => reading,
            Err(e) => {
                debug!(error = %e, "Skipping tick without a 3D fix");
                return Ok((store, TickOutcome::NoFix));
            }
        };

        // A stop or terminate that landed during the poll wins
        if !self.control.is_running() || self.control.session_state() != SessionState::Active {
            return Ok((store, TickOutcome::Idle));
        }

        let (store, appended) = blocking(move || {
            let appended = store.append(&reading).map(|()| reading);
            (store, appended)
        })
        .await?;

        let outcome = match appended {
            Ok(reading) => {
                debug!(
                    latitude = reading.latitude,
                    longitude = reading.longitude,
                    altitude = reading.altitude,
                    speed = reading.speed,
                    track = reading.track,
                    climb = reading.climb,
                    time = %reading.timestamp,
                    "Reading stored"
                );
                TickOutcome::Stored
            }
            Err(e) if e.is_transient() => {
                warn!(store = %store.name(), error = %e, "Failed to store reading");
                TickOutcome::WriteFailed
            }
            Err(e) => {
                error!(store = %store.name(), error = %e, "Failed to store reading");
                TickOutcome::WriteFailed
            }
        };

        Ok((store, outcome))
    }

    async fn fail(&self, e: PicycleError) -> Result<()> {
        error!(error = %e, "Cannot record, shutting down");

        self.control.raise_fault();
        self.control.set_recording(false);

        {
            let panel = self.panel.lock().await;
            if let Err(display_err) = panel.show_glyph(ERROR_GLYPH, RED).await {
                warn!(error = %display_err, "Failed to show error glyph");
            }
        }

        sleep(self.timing.cooldown()).await;

        {
            let panel = self.panel.lock().await;
            if let Err(display_err) = panel.clear().await {
                warn!(error = %display_err, "Failed to clear LED matrix");
            }
        }

        self.control.terminate();
        Err(e)
    }
}

/// Run a SQLite call on the blocking pool so the other loops keep ticking.
async fn blocking<T, F>(call: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| PicycleError::Task {
            task: "storage",
            reason: e.to_string(),
        })
}

fn log_fix_status(fix: &Fix) {
    if fix.mode == FixMode::ThreeD {
        info!(
            satellites = fix.satellites,
            mode = fix.mode.as_gpsd(),
            "GPS device connected to {} satellites",
            fix.satellites
        );
    } else {
        warn!(
            satellites = fix.satellites,
            mode = fix.mode.as_gpsd(),
            "GPS device connected to {} satellites, no 3D fix",
            fix.satellites
        );
    }
}
