//! # Picycle
//!
//! Put your Raspberry Pi to good use on a bike ride.
//!
//! Records GPS tracks while the rider controls the session with the Sense HAT
//! joystick, and converts recorded sessions to GPX afterwards.
//!
//! # Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `record` | Run a recording session until the joystick or a signal stops it |
//! | `database DB` | Show, purge or export (`--gpx`) a recorded session |
//! | `info-gpx FILE` | Count tracks, waypoints and routes |
//! | `info-tracks FILE` | List track points per segment |
//! | `info-waypoints FILE` | List waypoints |
//! | `info-routes FILE` | List route points |
//!
//! # Exit Codes
//!
//! - `0`: clean shutdown
//! - `1`: a session store could not be created, or startup failed (bad
//!   config, gpsd unreachable, LED matrix or joystick missing)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use picycle::config::{Config, LoggingConfig};
use picycle::display::sense_hat::SenseHatPanel;
use picycle::export;
use picycle::gps::gpsd::GpsdClient;
use picycle::input::{self, joystick::Joystick};
use picycle::session::{share_panel, SessionControl, Supervisor, Timing};
use picycle::storage::sqlite::{SqliteGateway, SqliteStore};
use picycle::storage::SessionNamer;

/// Config file read by `record` when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "config/picycle.toml";

/// Joystick events buffered between the reader thread and the dispatcher
const INPUT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Parser)]
#[command(name = "picycle", version, about = "Put your Raspberry Pi to good use on a bike ride!")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record GPS tracks, controlled with the Sense HAT joystick
    Record {
        /// Log at DEBUG instead of INFO
        #[arg(long)]
        verbose: bool,

        /// Configuration file (defaults apply if it does not exist)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Inspect a recorded session
    Database {
        /// Session file
        database: PathBuf,

        /// Write the track to <name>.gpx in the current directory
        #[arg(long)]
        gpx: bool,

        /// Delete every stored reading
        #[arg(long)]
        purge: bool,

        /// Print the stored readings
        #[arg(long)]
        show: bool,
    },

    /// Count the tracks, waypoints and routes in a GPX file
    InfoGpx { gpx_file: PathBuf },

    /// Print the points of every track in a GPX file
    InfoTracks { gpx_file: PathBuf },

    /// Print the waypoints in a GPX file
    InfoWaypoints { gpx_file: PathBuf },

    /// Print the points of every route in a GPX file
    InfoRoutes { gpx_file: PathBuf },
}

/// Set up console logging, plus a daily log file when enabled
///
/// `RUST_LOG` can narrow the output further; the level floor is INFO, or
/// DEBUG with `verbose`.
///
/// # Returns
///
/// The file writer guard, which must live until exit so buffered lines are
/// flushed.
fn init_logging(verbose: bool, logging: &LoggingConfig) -> Option<WorkerGuard> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if logging.file_enabled {
        let appender = tracing_appender::rolling::daily(&logging.log_dir, "picycle.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();

        None
    }
}

/// Run a recording session on the real hardware
///
/// # Control Flow
///
/// 1. Open the LED matrix and connect to gpsd
/// 2. Start the joystick reader thread and the event dispatcher
/// 3. Run the session supervisor until termination
///
/// # Errors
///
/// Startup failures (missing devices, gpsd unreachable) and the session
/// result from the supervisor.
async fn record(config: Config) -> Result<()> {
    info!("Picycle v{} starting...", env!("CARGO_PKG_VERSION"));

    let panel = SenseHatPanel::open_configured(&config.display.framebuffer)
        .await
        .context("Failed to open the LED matrix")?;

    let source = GpsdClient::connect(&config.gps.host, config.gps.port, config.gps.timeout())
        .await
        .context("Failed to connect to gpsd")?;
    info!("Connected to gpsd at {}", source.address());

    let control = Arc::new(SessionControl::new());

    let joystick = Joystick::open_configured(&config.display.joystick)
        .context("Failed to open the joystick")?;
    let (events_tx, events_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    joystick.spawn(events_tx)?;
    let dispatcher = tokio::spawn(input::dispatch(events_rx, control.clone()));

    info!("Press the joystick left to start recording, right to stop, down to quit");

    let result = Supervisor::new(
        control,
        Arc::new(source),
        Arc::new(SqliteGateway::new(&config.storage.data_dir)),
        share_panel(panel),
        Timing::from(&config.session),
    )
    .with_startup_message(
        &config.display.startup_message,
        Duration::from_millis(config.display.scroll_speed_ms),
    )
    .with_namer(SessionNamer::new(&config.storage.file_suffix))
    .run()
    .await;

    dispatcher.abort();
    result?;

    info!("Picycle stopped");
    Ok(())
}

/// `database` command
///
/// Options apply in the order show, purge, gpx.
fn database(path: &Path, gpx: bool, purge: bool, show: bool) -> Result<()> {
    let mut store = SqliteStore::open_existing(path)?;

    if show {
        let rows = store.rows()?;
        if rows.is_empty() {
            println!("Database is empty, no content to show.");
        } else {
            println!("{}", export::readings_table(&rows));
        }
    }

    if purge {
        store.purge()?;
    }

    if gpx {
        let points = store.track_points()?;
        let out = export::gpx_path_for(path);
        export::save_gpx(&export::track_from_points(&points), &out)?;
        println!("Created GPX file at {}", out.display());
    }

    Ok(())
}

fn info_gpx(path: &Path) -> Result<()> {
    let gpx = export::load_gpx(path)?;
    println!("{}", export::gpx_summary(&gpx));
    Ok(())
}

fn info_tracks(path: &Path) -> Result<()> {
    let gpx = export::load_gpx(path)?;
    for (title, table) in export::track_tables(&gpx) {
        println!("{}", title);
        println!("{}", table);
    }
    Ok(())
}

fn info_waypoints(path: &Path) -> Result<()> {
    let gpx = export::load_gpx(path)?;
    println!("{}", export::waypoint_table(&gpx));
    Ok(())
}

fn info_routes(path: &Path) -> Result<()> {
    let gpx = export::load_gpx(path)?;
    println!("{}", export::route_table(&gpx));
    Ok(())
}

fn exit_code(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, verbose) = match &cli.command {
        Command::Record { verbose, config } => match Config::load_or_default(config) {
            Ok(loaded) => (loaded, *verbose),
            Err(e) => {
                eprintln!("Error: failed to load {}: {}", config.display(), e);
                return ExitCode::FAILURE;
            }
        },
        _ => (Config::default(), false),
    };

    let _log_guard = init_logging(verbose, &config.logging);

    exit_code(match cli.command {
        Command::Record { .. } => record(config).await,
        Command::Database {
            database: path,
            gpx,
            purge,
            show,
        } => database(&path, gpx, purge, show),
        Command::InfoGpx { gpx_file } => info_gpx(&gpx_file),
        Command::InfoTracks { gpx_file } => info_tracks(&gpx_file),
        Command::InfoWaypoints { gpx_file } => info_waypoints(&gpx_file),
        Command::InfoRoutes { gpx_file } => info_routes(&gpx_file),
    })
}
