//! # Error Types
//!
//! Custom error types for Picycle using `thiserror`.

use thiserror::Error;

/// Main error type for Picycle
#[derive(Debug, Error)]
pub enum PicycleError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GPS daemon unreachable or connection dropped
    #[error("GPS connection error: {0}")]
    GpsConnection(String),

    /// GPS daemon replied with something we could not parse
    #[error("GPS protocol error: {0}")]
    GpsProtocol(String),

    /// Receiver has no usable 3D fix this tick
    #[error("No 3D fix available (mode {mode})")]
    NoFix {
        /// gpsd fix mode at the time of the poll
        mode: u8,
    },

    /// Session store read/write failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Session store could not be created at session start
    #[error("Failed to open session store {name}: {reason}")]
    StoreOpen {
        /// Store file name
        name: String,
        /// Underlying failure
        reason: String,
    },

    /// LED matrix errors
    #[error("Display error: {0}")]
    Display(String),

    /// No framebuffer for the LED matrix found
    #[error("LED matrix framebuffer not found (tried: {0})")]
    DisplayNotFound(String),

    /// Joystick read errors
    #[error("Input error: {0}")]
    Input(String),

    /// No joystick device found
    #[error("Joystick not found: {0}")]
    InputDeviceNotFound(String),

    /// Two writers claimed overlapping cells of the display buffer
    #[error("Display region rows {requested:?} overlaps already claimed rows {claimed:?}")]
    RegionOverlap {
        /// Rows of the rejected claim
        requested: std::ops::Range<usize>,
        /// Rows of the existing claim
        claimed: std::ops::Range<usize>,
    },

    /// GPX read/write errors
    #[error("GPX error: {0}")]
    Gpx(String),

    /// A session loop panicked or was cancelled
    #[error("Session task '{task}' failed: {reason}")]
    Task {
        /// Loop name
        task: &'static str,
        /// Join failure
        reason: String,
    },
}

impl PicycleError {
    /// Whether the error only affects the current tick.
    ///
    /// Transient errors are logged and the loop carries on; everything else
    /// stops the feature that raised it.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PicycleError::NoFix { .. } | PicycleError::GpsProtocol(_) | PicycleError::Storage(_)
        )
    }
}

impl From<rusqlite::Error> for PicycleError {
    fn from(e: rusqlite::Error) -> Self {
        PicycleError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for PicycleError {
    fn from(e: serde_json::Error) -> Self {
        PicycleError::GpsProtocol(e.to_string())
    }
}

impl From<gpx::errors::GpxError> for PicycleError {
    fn from(e: gpx::errors::GpxError) -> Self {
        PicycleError::Gpx(e.to_string())
    }
}

/// Result type alias for Picycle
pub type Result<T> = std::result::Result<T, PicycleError>;
