//! # Sense HAT Joystick
//!
//! The Sense HAT's five-way joystick is exposed by the kernel as an evdev
//! keyboard named "Raspberry Pi Sense HAT Joystick" that emits
//! `KEY_UP`, `KEY_DOWN`, `KEY_LEFT`, `KEY_RIGHT` and `KEY_ENTER`.
//!
//! Reading is blocking, so events are pulled on a dedicated OS thread and
//! forwarded into the async side over a channel.

use evdev::Device;
use std::path::Path;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{button_event, ButtonEvent};
use crate::error::{PicycleError, Result};

/// Device name reported by the Sense HAT joystick driver
const JOYSTICK_NAME: &str = "Raspberry Pi Sense HAT Joystick";

/// Sense HAT joystick handle
pub struct Joystick {
    device: Device,
    device_path: String,
}

impl std::fmt::Debug for Joystick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joystick")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl Joystick {
    /// Detect and open the Sense HAT joystick
    ///
    /// Scans all `/dev/input/event*` devices and picks the first one whose
    /// name matches the Sense HAT driver.
    ///
    /// # Errors
    ///
    /// - `InputDeviceNotFound`: no joystick on this system
    /// - `Input`: `/dev/input` could not be read
    pub fn open() -> Result<Self> {
        let input_dir = Path::new("/dev/input");

        if !input_dir.exists() {
            return Err(PicycleError::InputDeviceNotFound(
                "/dev/input directory not found".to_string(),
            ));
        }

        let mut entries: Vec<_> = std::fs::read_dir(input_dir)
            .map_err(|e| PicycleError::Input(format!("Failed to read /dev/input: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PicycleError::Input(format!("Failed to read directory entry: {}", e)))?;

        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let path = entry.path();

            match path.file_name() {
                Some(filename) if filename.to_string_lossy().starts_with("event") => {}
                _ => continue,
            }

            match Device::open(&path) {
                Ok(device) => {
                    debug!("Found input device: {} ({:?})", path.display(), device.name());

                    if device.name() == Some(JOYSTICK_NAME) {
                        let device_path = path.to_string_lossy().to_string();
                        info!("Found Sense HAT joystick at: {}", device_path);
                        return Ok(Self { device, device_path });
                    }
                }
                Err(e) => {
                    debug!("Could not open {}: {}", path.display(), e);
                }
            }
        }

        Err(PicycleError::InputDeviceNotFound(JOYSTICK_NAME.to_string()))
    }

    /// Open a specific event device without checking its name
    pub fn open_path(path: &str) -> Result<Self> {
        let device = Device::open(path)
            .map_err(|e| PicycleError::Input(format!("Failed to open {}: {}", path, e)))?;

        info!("Opened joystick at: {}", path);
        Ok(Self {
            device,
            device_path: path.to_string(),
        })
    }

    /// Open `path` if given, otherwise auto-detect
    pub fn open_configured(path: &str) -> Result<Self> {
        if path.is_empty() {
            Self::open()
        } else {
            Self::open_path(path)
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Start reading on a background thread
    ///
    /// The thread exits when the receiving side is dropped or the device
    /// stops delivering events.
    pub fn spawn(mut self, events: mpsc::Sender<ButtonEvent>) -> Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("joystick".to_string())
            .spawn(move || loop {
                let batch = match self.device.fetch_events() {
                    Ok(batch) => batch,
                    Err(e) => {
                        warn!("Joystick read failed on {}: {}", self.device_path, e);
                        return;
                    }
                };

                for event in batch.filter_map(|raw| button_event(&raw)) {
                    if events.blocking_send(event).is_err() {
                        debug!("Joystick receiver closed");
                        return;
                    }
                }
            })
            .map_err(PicycleError::from)
    }
}
