//! # SQLite Session Stores
//!
//! One SQLite file per recording session, holding a single `picycle` table.
//! Timestamps are written as RFC 3339 text. Files recorded by older
//! versions hold naive `YYYY-MM-DD HH:MM:SS[.ffffff]` text, read back as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Reading, SessionStore, StorageGateway};
use crate::error::{PicycleError, Result};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS picycle (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude FLOAT,
    longitude FLOAT,
    altitude FLOAT,
    speed FLOAT,
    track FLOAT,
    climb FLOAT,
    timestamp TIMESTAMP
)";

const DROP_TABLE: &str = "DROP TABLE IF EXISTS picycle";

const INSERT_READING: &str = "INSERT INTO picycle
    (latitude, longitude, altitude, speed, track, climb, timestamp)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const SELECT_ROWS: &str = "SELECT id, latitude, longitude, altitude, speed, track, climb, timestamp
    FROM picycle ORDER BY id";

const SELECT_TRACK: &str = "SELECT latitude, longitude, altitude FROM picycle ORDER BY id";

/// Creates session stores as files under a data directory
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    data_dir: PathBuf,
}

impl SqliteGateway {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl StorageGateway for SqliteGateway {
    fn open(&self, name: &str) -> Result<Box<dyn SessionStore>> {
        let path = self.data_dir.join(name);
        let store = SqliteStore::create(&path)?;
        Ok(Box::new(store))
    }
}

/// A single SQLite session file
pub struct SqliteStore {
    connection: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open `path`, creating the file if needed
    ///
    /// # Errors
    ///
    /// Returns `Storage` if SQLite cannot open or create the file (missing
    /// directory, read-only filesystem, not a database, ...).
    pub fn create(path: &Path) -> Result<Self> {
        let connection = Connection::open(path).map_err(|e| {
            PicycleError::Storage(format!("Failed to open {}: {}", path.display(), e))
        })?;

        info!("Opened session store {}", path.display());
        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing session file without creating it
    ///
    /// Used by the `database` command to inspect, purge or export a
    /// recorded session.
    pub fn open_existing(path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| PicycleError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;

        debug!("Opened existing session store {}", path.display());
        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop every reading by recreating the table
    pub fn purge(&mut self) -> Result<()> {
        self.connection.execute(DROP_TABLE, [])?;
        self.connection.execute(CREATE_TABLE, [])?;
        info!("Purged {}", self.path.display());
        Ok(())
    }

    /// All rows with their ids, in insertion order
    pub fn rows(&self) -> Result<Vec<(i64, Reading)>> {
        let mut stmt = self.connection.prepare(SELECT_ROWS)?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, latitude, longitude, altitude, speed, track, climb, timestamp)| {
                Ok((
                    id,
                    Reading {
                        latitude,
                        longitude,
                        altitude,
                        speed,
                        track,
                        climb,
                        timestamp: parse_timestamp(&timestamp)?,
                    },
                ))
            })
            .collect()
    }

    /// (latitude, longitude, altitude) for every row, in insertion order
    pub fn track_points(&self) -> Result<Vec<(f64, f64, f64)>> {
        let mut stmt = self.connection.prepare(SELECT_TRACK)?;
        let points = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(points)
    }
}

/// Naive layouts written by older recorders
const LEGACY_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();

    let rfc3339 = match DateTime::parse_from_rfc3339(text) {
        Ok(t) => return Ok(t.with_timezone(&Utc)),
        Err(e) => e,
    };

    LEGACY_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| PicycleError::Storage(format!("Bad timestamp '{}': {}", text, rfc3339)))
}

impl SessionStore for SqliteStore {
    fn ensure_schema(&mut self) -> Result<()> {
        self.connection.execute(CREATE_TABLE, [])?;
        Ok(())
    }

    fn append(&mut self, reading: &Reading) -> Result<()> {
        self.connection.execute(
            INSERT_READING,
            params![
                reading.latitude,
                reading.longitude,
                reading.altitude,
                reading.speed,
                reading.track,
                reading.climb,
                reading.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Reading>> {
        Ok(self.rows()?.into_iter().map(|(_, reading)| reading).collect())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let path = self.path.clone();
        self.connection
            .close()
            .map_err(|(_, e)| PicycleError::Storage(format!("Failed to close {}: {}", path.display(), e)))?;
        debug!("Closed session store {}", path.display());
        Ok(())
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}
