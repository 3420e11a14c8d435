//! # Export Module
//!
//! Converts recorded sessions to GPX and summarizes GPX files for the
//! command line.
//!
//! This module handles:
//! - Building a single-track GPX 1.1 document from stored track points
//! - Reading and writing GPX files
//! - Summary tables for tracks, waypoints, routes and stored readings

pub mod table;

use geo_types::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PicycleError, Result};
use crate::storage::Reading;
pub use table::{Cell, Table};

/// `creator` attribute of written documents
const CREATOR: &str = "picycle";

/// One GPX track with one segment holding `points` in order.
///
/// Points are `(latitude, longitude, altitude)`; altitude becomes the
/// waypoint elevation.
pub fn track_from_points(points: &[(f64, f64, f64)]) -> Gpx {
    let mut segment = TrackSegment::default();
    segment.points = points
        .iter()
        .map(|&(latitude, longitude, altitude)| {
            let mut waypoint = Waypoint::new(Point::new(longitude, latitude));
            waypoint.elevation = Some(altitude);
            waypoint
        })
        .collect();

    let mut track = Track::default();
    track.segments.push(segment);

    Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(CREATOR.to_string()),
        tracks: vec![track],
        ..Default::default()
    }
}

/// `<stem>.gpx` in the current directory for a session file
pub fn gpx_path_for(database: &Path) -> PathBuf {
    let stem = database
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "picycle".to_string());
    PathBuf::from(format!("{}.gpx", stem))
}

pub fn save_gpx(gpx: &Gpx, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    gpx::write(gpx, BufWriter::new(file))?;
    debug!("Wrote GPX file {}", path.display());
    Ok(())
}

pub fn load_gpx(path: &Path) -> Result<Gpx> {
    let file = File::open(path)
        .map_err(|e| PicycleError::Gpx(format!("Failed to open {}: {}", path.display(), e)))?;
    Ok(gpx::read(BufReader::new(file))?)
}

/// Counts of tracks, waypoints and routes
pub fn gpx_summary(gpx: &Gpx) -> Table {
    let mut table = Table::new(&["Type", "Count"]);
    table.push(vec![Cell::text("Tracks"), Cell::number(gpx.tracks.len())]);
    table.push(vec![Cell::text("Waypoints"), Cell::number(gpx.waypoints.len())]);
    table.push(vec![Cell::text("Routes"), Cell::number(gpx.routes.len())]);
    table
}

fn point_row(waypoint: &Waypoint) -> Vec<Cell> {
    let point = waypoint.point();
    vec![
        Cell::number(point.y()),
        Cell::number(point.x()),
        Cell::optional(waypoint.elevation),
    ]
}

/// Per track: a title line and a table of its points, segment by segment
pub fn track_tables(gpx: &Gpx) -> Vec<(String, Table)> {
    gpx.tracks
        .iter()
        .map(|track| {
            let title = format!(
                "Track Name: {} | Number: {} | Segments: {}",
                track.name.as_deref().unwrap_or("-"),
                track.number.map_or_else(|| "-".to_string(), |n| n.to_string()),
                track.segments.len()
            );

            let mut table = Table::new(&["Latitude", "Longitude", "Elevation"]);
            for segment in &track.segments {
                table.push(vec![Cell::text("Segment")]);
                for point in &segment.points {
                    table.push(point_row(point));
                }
            }
            (title, table)
        })
        .collect()
}

pub fn waypoint_table(gpx: &Gpx) -> Table {
    let mut table = Table::new(&["Name", "Latitude", "Longitude"]);
    for waypoint in &gpx.waypoints {
        let point = waypoint.point();
        table.push(vec![
            Cell::text(waypoint.name.as_deref().unwrap_or("")),
            Cell::number(point.y()),
            Cell::number(point.x()),
        ]);
    }
    table
}

/// Points of every route, in order
pub fn route_table(gpx: &Gpx) -> Table {
    let mut table = Table::new(&["Latitude", "Longitude", "Elevation"]);
    for route in &gpx.routes {
        for point in &route.points {
            table.push(point_row(point));
        }
    }
    table
}

/// Stored rows of a session file
pub fn readings_table(rows: &[(i64, Reading)]) -> Table {
    let mut table = Table::new(&[
        "ID", "Latitude", "Longitude", "Altitude", "Speed", "Track", "Climb", "Timestamp",
    ]);
    for (id, reading) in rows {
        table.push(vec![
            Cell::number(id),
            Cell::number(reading.latitude),
            Cell::number(reading.longitude),
            Cell::number(reading.altitude),
            Cell::number(reading.speed),
            Cell::number(reading.track),
            Cell::number(reading.climb),
            Cell::text(reading.timestamp.to_rfc3339()),
        ]);
    }
    table
}
