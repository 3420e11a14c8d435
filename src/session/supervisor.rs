//! # Session Supervisor
//!
//! Wires the loops together and waits for them.
//!
//! This module handles:
//! - Claiming the two display regions (overlap is rejected up front)
//! - Turning SIGTERM/SIGINT into [`SessionControl::terminate`], before
//!   anything is drawn
//! - Showing the startup message, cut short by a termination request
//! - Spawning the acquisition, satellite and indicator loops as separate tasks
//! - Joining them and reporting the session result

use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::acquisition::AcquisitionLoop;
use super::indicator::IndicatorLoop;
use super::satellites::SatelliteLoop;
use super::{SessionControl, SharedPanel, Timing};
use crate::display::{DisplayBuffer, INDICATOR_REGION, SATELLITE_REGION, WHITE};
use crate::error::{PicycleError, Result};
use crate::gps::PositionSource;
use crate::storage::{SessionNamer, StorageGateway};

/// Runs one recording session from startup message to shutdown.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use picycle::gps::gpsd::GpsdClient;
/// use picycle::display::sense_hat::SenseHatPanel;
/// use picycle::session::{share_panel, SessionControl, Supervisor, Timing};
/// use picycle::storage::sqlite::SqliteGateway;
///
/// # async fn run() -> picycle::error::Result<()> {
/// let control = Arc::new(SessionControl::new());
/// let source = GpsdClient::connect("127.0.0.1", 2947, std::time::Duration::from_secs(1)).await?;
/// let panel = SenseHatPanel::open().await?;
///
/// Supervisor::new(
///     control,
///     Arc::new(source),
///     Arc::new(SqliteGateway::new(".")),
///     share_panel(panel),
///     Timing::default(),
/// )
/// .run()
/// .await
/// # }
/// ```
pub struct Supervisor {
    control: Arc<SessionControl>,
    source: Arc<dyn PositionSource>,
    gateway: Arc<dyn StorageGateway>,
    panel: SharedPanel,
    timing: Timing,
    namer: SessionNamer,
    startup_message: Option<(String, Duration)>,
    handle_signals: bool,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("timing", &self.timing)
            .field("handle_signals", &self.handle_signals)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Supervisor with no startup message, the default store suffix and
    /// OS signal handling enabled.
    pub fn new(
        control: Arc<SessionControl>,
        source: Arc<dyn PositionSource>,
        gateway: Arc<dyn StorageGateway>,
        panel: SharedPanel,
        timing: Timing,
    ) -> Self {
        Self {
            control,
            source,
            gateway,
            panel,
            timing,
            namer: SessionNamer::new("picycle.sqlite"),
            startup_message: None,
            handle_signals: true,
        }
    }

    /// Scroll `message` across the panel, one column per `step`, before the loops start.
    pub fn with_startup_message(mut self, message: &str, step: Duration) -> Self {
        self.startup_message = Some((message.to_string(), step));
        self
    }

    pub fn with_namer(mut self, namer: SessionNamer) -> Self {
        self.namer = namer;
        self
    }

    /// Leave SIGTERM/SIGINT alone (tests, embedding).
    pub fn without_signals(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Run the session until every loop has stopped.
    ///
    /// Returns once termination was requested (joystick or signal) and all
    /// three loops have finished their current tick.
    ///
    /// # Errors
    ///
    /// - `StoreOpen`: a session store could not be created; the error glyph
    ///   has been shown and the panel cleared
    /// - `RegionOverlap`: the display regions could not be claimed
    /// - `Task`: a loop panicked
    pub async fn run(self) -> Result<()> {
        let buffer = DisplayBuffer::new();
        let satellite_region = buffer.claim(SATELLITE_REGION)?;
        let indicator_region = buffer.claim(INDICATOR_REGION)?;

        let signals = if self.handle_signals {
            Some(spawn_signal_watch(self.control.clone())?)
        } else {
            None
        };

        if let Some((message, step)) = &self.startup_message {
            let panel = self.panel.lock().await;
            tokio::select! {
                shown = panel.show_message(message, WHITE, *step) => {
                    if let Err(e) = shown {
                        warn!(error = %e, "Failed to show startup message");
                    }
                }
                _ = terminated(&self.control, *step) => {
                    info!("Terminated during startup message");
                }
            }
        }

        if !self.control.is_running() {
            if let Some(signals) = signals {
                signals.abort();
            }
            let panel = self.panel.lock().await;
            if let Err(e) = panel.clear().await {
                warn!(error = %e, "Failed to clear LED matrix");
            }
            info!("Session terminated before the loops started");
            return Ok(());
        }

        info!(tick = ?self.timing.tick, "Starting session loops");

        let acquisition = tokio::spawn(
            AcquisitionLoop::new(
                self.control.clone(),
                self.source.clone(),
                self.gateway.clone(),
                self.panel.clone(),
                self.namer,
                self.timing,
            )
            .run(),
        );
        let satellites = tokio::spawn(
            SatelliteLoop::new(
                self.control.clone(),
                self.source.clone(),
                satellite_region,
                self.timing,
            )
            .run(),
        );
        let indicator = tokio::spawn(
            IndicatorLoop::new(
                self.control.clone(),
                buffer.clone(),
                indicator_region,
                self.panel.clone(),
                self.timing,
            )
            .run(),
        );

        let (acquisition, satellites, indicator) = tokio::join!(
            join_loop("acquisition", acquisition, &self.control),
            join_loop("satellites", satellites, &self.control),
            join_loop("indicator", indicator, &self.control),
        );

        if let Some(signals) = signals {
            signals.abort();
        }

        // The indicator owns the shutdown clear; only step in if it never got there
        if indicator.is_err() && !self.control.is_faulted() {
            let panel = self.panel.lock().await;
            if let Err(e) = panel.clear().await {
                warn!(error = %e, "Failed to clear LED matrix");
            }
        }

        info!("All session loops finished");

        acquisition?;
        satellites?;
        indicator
    }
}

/// Await a loop task, terminating the session if it failed so the other
/// loops do not tick forever.
async fn join_loop(
    task: &'static str,
    handle: JoinHandle<Result<()>>,
    control: &SessionControl,
) -> Result<()> {
    let result = match handle.await {
        Ok(result) => result,
        Err(e) => Err(PicycleError::Task {
            task,
            reason: e.to_string(),
        }),
    };

    if let Err(e) = &result {
        error!(task, error = %e, "Session loop failed");
        control.terminate();
    }

    result
}

/// Resolves once termination is requested, checking every `step`.
async fn terminated(control: &SessionControl, step: Duration) {
    while control.is_running() {
        tokio::time::sleep(step).await;
    }
}

/// Register SIGTERM/SIGINT handlers and forward the first one received.
fn spawn_signal_watch(control: Arc<SessionControl>) -> Result<JoinHandle<()>> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => info!("Received SIGTERM, shutting down..."),
            _ = interrupt.recv() => info!("Received Ctrl+C, shutting down..."),
        }
        control.terminate();
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::mocks::RecordingPanel;
    use crate::display::{MockDisplayPanel, RED, WIDTH};
    use crate::gps::mocks::{fix_3d, ScriptedSource};
    use crate::session::acquisition::ERROR_GLYPH;
    use crate::session::share_panel;
    use crate::storage::mocks::MemoryGateway;
    use tokio::time::{sleep, timeout, Instant};

    struct Rig {
        control: Arc<SessionControl>,
        source: ScriptedSource,
        gateway: MemoryGateway,
        panel: RecordingPanel,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                control: Arc::new(SessionControl::new()),
                source: ScriptedSource::new(fix_3d(35.08, 11)),
                gateway: MemoryGateway::new(),
                panel: RecordingPanel::new(),
            }
        }

        fn supervisor(&self) -> Supervisor {
            Supervisor::new(
                self.control.clone(),
                Arc::new(self.source.clone()),
                Arc::new(self.gateway.clone()),
                share_panel(self.panel.clone()),
                Timing::default(),
            )
            .with_startup_message("Picycle", Duration::from_millis(100))
            .without_signals()
        }

        fn spawn(&self) -> JoinHandle<Result<()>> {
            tokio::spawn(self.supervisor().run())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_message_then_ready() {
        let rig = Rig::new();
        let task = rig.spawn();

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(rig.panel.messages(), vec!["Picycle".to_string()]);
        assert!(rig.gateway.opened().is_empty());

        // Satellites on rows 0–1, white ready row on row 2
        let frame = rig.panel.last_frame().unwrap();
        assert_eq!(frame[4], crate::display::GREEN);
        assert!(frame[2 * WIDTH..3 * WIDTH].iter().all(|p| *p == WHITE));

        rig.control.terminate();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_press_opens_store_within_one_tick() {
        let rig = Rig::new();
        let task = rig.spawn();

        sleep(Duration::from_millis(300)).await;
        rig.control.start();
        sleep(Duration::from_secs(1)).await;

        assert_eq!(rig.gateway.opened().len(), 1);
        assert!(rig.gateway.reading_count() >= 1);

        rig.control.terminate();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_press_closes_store_within_one_tick() {
        let rig = Rig::new();
        rig.control.start();
        let task = rig.spawn();

        sleep(Duration::from_millis(2500)).await;
        rig.control.stop();
        sleep(Duration::from_secs(1)).await;

        assert_eq!(rig.gateway.closed().len(), 1);
        let stored = rig.gateway.reading_count();

        sleep(Duration::from_secs(5)).await;
        assert_eq!(rig.gateway.reading_count(), stored);
        assert_eq!(rig.gateway.opened().len(), 1);

        rig.control.terminate();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_while_active_shuts_down_cleanly() {
        let rig = Rig::new();
        rig.control.start();
        let task = rig.spawn();

        sleep(Duration::from_millis(1500)).await;
        rig.control.terminate();

        let result = timeout(Duration::from_millis(1001), task)
            .await
            .expect("loops did not stop within one tick");
        result.unwrap().unwrap();

        assert_eq!(rig.gateway.closed(), rig.gateway.opened());
        assert_eq!(rig.panel.clear_count(), 1);
        assert!(rig.panel.glyphs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_open_failure_shows_glyph_and_fails() {
        let rig = Rig::new();
        rig.gateway.set_fail_open(true);
        rig.control.start();

        let started = Instant::now();
        let task = rig.spawn();

        sleep(Duration::from_millis(500)).await;
        let frames = rig.panel.frame_count();
        sleep(Duration::from_secs(2)).await;
        assert_eq!(rig.panel.frame_count(), frames);

        let result = task.await.unwrap();
        assert!(matches!(result, Err(PicycleError::StoreOpen { .. })));
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(rig.panel.glyphs(), vec![(ERROR_GLYPH, RED)]);
        assert_eq!(rig.panel.clear_count(), 1);
        assert!(!rig.control.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_panel_sees_one_message_and_one_clear() {
        let control = Arc::new(SessionControl::new());
        let mut panel = MockDisplayPanel::new();
        panel
            .expect_show_message()
            .withf(|message, color, _| message.to_string() == "Picycle" && *color == WHITE)
            .times(1)
            .returning(|_, _, _| Ok(()));
        panel.expect_set_frame().returning(|_| Ok(()));
        panel.expect_clear().times(1).returning(|| Ok(()));

        let supervisor = Supervisor::new(
            control.clone(),
            Arc::new(ScriptedSource::new(fix_3d(35.0, 5))),
            Arc::new(MemoryGateway::new()),
            share_panel(panel),
            Timing::default(),
        )
        .with_startup_message("Picycle", Duration::from_millis(100))
        .without_signals();

        let task = tokio::spawn(supervisor.run());
        sleep(Duration::from_millis(2500)).await;
        control.terminate();
        task.await.unwrap().unwrap();
    }

    /// Panel that scrolls with the default implementation
    #[derive(Clone, Default)]
    struct ScrollingPanel {
        frames: Arc<std::sync::Mutex<usize>>,
        clears: Arc<std::sync::Mutex<usize>>,
    }

    #[async_trait::async_trait]
    impl crate::display::DisplayPanel for ScrollingPanel {
        async fn set_frame(&self, _frame: &crate::display::Frame) -> Result<()> {
            *self.frames.lock().unwrap() += 1;
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            *self.clears.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_during_startup_message() {
        let control = Arc::new(SessionControl::new());
        let source = ScriptedSource::new(fix_3d(35.08, 11));
        let panel = ScrollingPanel::default();
        let step = Duration::from_millis(100);

        let supervisor = Supervisor::new(
            control.clone(),
            Arc::new(source.clone()),
            Arc::new(MemoryGateway::new()),
            share_panel(panel.clone()),
            Timing::default(),
        )
        .with_startup_message("Picycle", step)
        .without_signals();

        let started = Instant::now();
        let task = tokio::spawn(supervisor.run());
        sleep(Duration::from_millis(550)).await;
        control.terminate();
        task.await.unwrap().unwrap();

        let full_scroll = crate::display::text::scroll_frames("Picycle", WHITE).len();
        assert!(*panel.frames.lock().unwrap() < full_scroll);
        assert!(started.elapsed() < step * full_scroll as u32);
        assert_eq!(*panel.clears.lock().unwrap(), 1);
        assert_eq!(source.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminated_before_first_tick() {
        let rig = Rig::new();
        rig.control.terminate();
        rig.supervisor().run().await.unwrap();
        // Nothing polled or stored once terminated before the first tick
        assert_eq!(rig.source.poll_count(), 0);
        assert_eq!(rig.panel.clear_count(), 1);
    }

    /// Store whose appends hold the calling thread like a slow SD card
    struct SlowStore {
        delay: Duration,
    }

    impl crate::storage::SessionStore for SlowStore {
        fn ensure_schema(&mut self) -> Result<()> {
            Ok(())
        }
        fn append(&mut self, _reading: &crate::storage::Reading) -> Result<()> {
            std::thread::sleep(self.delay);
            Ok(())
        }
        fn read_all(&self) -> Result<Vec<crate::storage::Reading>> {
            Ok(Vec::new())
        }
        fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
        fn name(&self) -> String {
            "slow".to_string()
        }
    }

    #[tokio::test]
    async fn test_slow_append_does_not_stall_indicator() {
        let control = Arc::new(SessionControl::new());
        let panel = RecordingPanel::new();
        let mut gateway = crate::storage::MockStorageGateway::new();
        gateway.expect_open().returning(|_| {
            Ok(Box::new(SlowStore {
                delay: Duration::from_millis(400),
            }) as Box<dyn crate::storage::SessionStore>)
        });

        let timing = Timing {
            tick: Duration::from_millis(100),
            error_cooldown_ticks: 3,
        };
        let supervisor = Supervisor::new(
            control.clone(),
            Arc::new(ScriptedSource::new(fix_3d(35.08, 11))),
            Arc::new(gateway),
            share_panel(panel.clone()),
            timing,
        )
        .without_signals();

        control.start();
        let task = tokio::spawn(supervisor.run());
        sleep(Duration::from_secs(2)).await;
        control.terminate();
        task.await.unwrap().unwrap();

        // About 20 pushes at 100 ms; an inline append would leave only a handful
        let frames = panel.frame_count();
        assert!(frames >= 12, "indicator pushed only {} frames", frames);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_panic_terminates_session() {
        struct PanickingSource;

        #[async_trait::async_trait]
        impl PositionSource for PanickingSource {
            async fn current_fix(&self) -> Result<crate::gps::Fix> {
                panic!("receiver driver crashed");
            }
        }

        let control = Arc::new(SessionControl::new());
        let panel = RecordingPanel::new();
        let supervisor = Supervisor::new(
            control.clone(),
            Arc::new(PanickingSource),
            Arc::new(MemoryGateway::new()),
            share_panel(panel.clone()),
            Timing::default(),
        )
        .without_signals();

        let result = timeout(Duration::from_secs(5), supervisor.run())
            .await
            .expect("supervisor hung after a loop panic");

        assert!(matches!(result, Err(PicycleError::Task { task: "satellites", .. })));
        assert!(!control.is_running());
        assert_eq!(panel.clear_count(), 1);
    }
}
