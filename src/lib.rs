//! # Picycle Library
//!
//! Put your Raspberry Pi to good use on a bike ride.
//!
//! This library records GPS tracks from gpsd into one SQLite file per
//! session, shows receiver and session status on the Sense HAT LED matrix and
//! lets the rider start, stop and end recording with the Sense HAT joystick.

pub mod config;
pub mod display;
pub mod error;
pub mod export;
pub mod gps;
pub mod input;
pub mod session;
pub mod storage;
