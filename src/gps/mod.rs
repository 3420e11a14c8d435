//! # GPS Module
//!
//! Position data from the gpsd daemon.
//!
//! This module handles:
//! - The [`PositionSource`] seam polled by the session loops
//! - Fix quality classification (no fix / 2D / 3D)
//! - Turning a 3D fix into a storable [`Reading`]
//! - The gpsd JSON client ([`gpsd::GpsdClient`])

pub mod gpsd;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{PicycleError, Result};
use crate::storage::Reading;

/// Fix quality as reported by gpsd's `mode` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FixMode {
    /// Mode 0 (unknown) or 1 (no fix).
    NoFix,
    /// Mode 2: latitude/longitude only.
    TwoD,
    /// Mode 3: position, altitude and movement.
    ThreeD,
}

impl FixMode {
    pub fn from_gpsd(mode: u8) -> Self {
        match mode {
            2 => FixMode::TwoD,
            3 => FixMode::ThreeD,
            _ => FixMode::NoFix,
        }
    }

    /// gpsd's numeric mode (no fix is reported as 1).
    pub fn as_gpsd(self) -> u8 {
        match self {
            FixMode::NoFix => 1,
            FixMode::TwoD => 2,
            FixMode::ThreeD => 3,
        }
    }
}

/// Latest receiver state.
///
/// Satellite counts are always present; position fields are only filled in
/// when the receiver has a fix good enough to report them.
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    pub mode: FixMode,
    /// Satellites in view.
    pub satellites: usize,
    /// Satellites used in the solution.
    pub satellites_used: usize,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Meters.
    pub altitude: Option<f64>,
    /// Ground speed, meters per second.
    pub speed: Option<f64>,
    /// Heading, degrees from true north.
    pub track: Option<f64>,
    /// Climb rate, meters per second.
    pub climb: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

impl Fix {
    /// A report with no position at all.
    pub fn no_fix(satellites: usize) -> Self {
        Self {
            mode: FixMode::NoFix,
            satellites,
            satellites_used: 0,
            latitude: None,
            longitude: None,
            altitude: None,
            speed: None,
            track: None,
            climb: None,
            time: None,
        }
    }

    /// Extract a reading.
    ///
    /// # Errors
    ///
    /// `NoFix` unless the receiver has a 3D fix and every reading field is
    /// present.
    pub fn reading(&self) -> Result<Reading> {
        let no_fix = || PicycleError::NoFix { mode: self.mode.as_gpsd() };

        if self.mode != FixMode::ThreeD {
            return Err(no_fix());
        }

        Ok(Reading {
            latitude: self.latitude.ok_or_else(no_fix)?,
            longitude: self.longitude.ok_or_else(no_fix)?,
            altitude: self.altitude.ok_or_else(no_fix)?,
            speed: self.speed.ok_or_else(no_fix)?,
            track: self.track.ok_or_else(no_fix)?,
            climb: self.climb.ok_or_else(no_fix)?,
            timestamp: self.time.ok_or_else(no_fix)?,
        })
    }
}

/// Something that can be polled for the current fix.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Poll the receiver once.
    ///
    /// A missing fix is not an error here; it shows up as
    /// [`FixMode::NoFix`]. Errors mean the daemon itself failed.
    async fn current_fix(&self) -> Result<Fix>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted position source
    ///
    /// Returns queued fixes in order, then repeats the fallback.
    #[derive(Clone)]
    pub struct ScriptedSource {
        pub queue: Arc<Mutex<VecDeque<Result<Fix>>>>,
        pub fallback: Arc<Mutex<Fix>>,
        pub polls: Arc<Mutex<usize>>,
    }

    impl ScriptedSource {
        pub fn new(fallback: Fix) -> Self {
            Self {
                queue: Arc::new(Mutex::new(VecDeque::new())),
                fallback: Arc::new(Mutex::new(fallback)),
                polls: Arc::new(Mutex::new(0)),
            }
        }

        pub fn push(&self, fix: Result<Fix>) {
            self.queue.lock().unwrap().push_back(fix);
        }

        pub fn set_fallback(&self, fix: Fix) {
            *self.fallback.lock().unwrap() = fix;
        }

        pub fn poll_count(&self) -> usize {
            *self.polls.lock().unwrap()
        }
    }

    #[async_trait]
    impl PositionSource for ScriptedSource {
        async fn current_fix(&self) -> Result<Fix> {
            *self.polls.lock().unwrap() += 1;
            if let Some(next) = self.queue.lock().unwrap().pop_front() {
                return next;
            }
            Ok(self.fallback.lock().unwrap().clone())
        }
    }

    /// A complete 3D fix
    pub fn fix_3d(latitude: f64, satellites: usize) -> Fix {
        Fix {
            mode: FixMode::ThreeD,
            satellites,
            satellites_used: satellites.min(8),
            latitude: Some(latitude),
            longitude: Some(-106.6),
            altitude: Some(1500.0),
            speed: Some(5.5),
            track: Some(90.0),
            climb: Some(0.1),
            time: Some(Utc::now()),
        }
    }
}
