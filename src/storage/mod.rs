//! # Storage Module
//!
//! Durable per-session storage of GPS readings.
//!
//! This module handles:
//! - The [`StorageGateway`] / [`SessionStore`] seams used by the acquisition loop
//! - Collision-free, sortable session store names ([`SessionNamer`])
//! - The SQLite implementation ([`sqlite`])

pub mod sqlite;

use chrono::{DateTime, Local, Utc};

use crate::error::Result;

/// One persisted GPS sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters.
    pub altitude: f64,
    /// Meters per second.
    pub speed: f64,
    /// Heading in degrees.
    pub track: f64,
    /// Meters per second.
    pub climb: f64,
    /// Time of the fix as reported by the receiver.
    pub timestamp: DateTime<Utc>,
}

/// An open session store.
///
/// Owned by exactly one writer for its whole life.
pub trait SessionStore: Send {
    /// Create the readings table if it does not exist.
    fn ensure_schema(&mut self) -> Result<()>;

    /// Append one reading.
    fn append(&mut self, reading: &Reading) -> Result<()>;

    /// All readings in insertion order.
    fn read_all(&self) -> Result<Vec<Reading>>;

    /// Flush and release the store.
    fn close(self: Box<Self>) -> Result<()>;

    /// Store name, for logs.
    fn name(&self) -> String;
}

/// Opens session stores by name.
#[cfg_attr(test, mockall::automock)]
pub trait StorageGateway: Send + Sync {
    /// Open or create the store called `name`.
    fn open(&self, name: &str) -> Result<Box<dyn SessionStore>>;
}

/// Derives store names from the session start time.
///
/// Names are `{%Y%m%d-%H-%M-%S}-{suffix}` so they sort chronologically.
/// Two sessions starting within the same second get a `-2`, `-3`, ...
/// counter before the suffix.
#[derive(Debug)]
pub struct SessionNamer {
    suffix: String,
    last_stamp: Option<String>,
    repeat: u32,
}

impl SessionNamer {
    /// `suffix` is typically `picycle.sqlite`.
    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            last_stamp: None,
            repeat: 0,
        }
    }

    /// Name for a session starting now (local time).
    pub fn next_name(&mut self) -> String {
        self.name_at(Local::now())
    }

    /// Name for a session starting at `at`.
    pub fn name_at(&mut self, at: DateTime<Local>) -> String {
        let stamp = at.format("%Y%m%d-%H-%M-%S").to_string();

        if self.last_stamp.as_deref() == Some(stamp.as_str()) {
            self.repeat += 1;
            format!("{}-{}-{}", stamp, self.repeat + 1, self.suffix)
        } else {
            self.last_stamp = Some(stamp.clone());
            self.repeat = 0;
            format!("{}-{}", stamp, self.suffix)
        }
    }
}
