//! # Sense HAT LED Matrix
//!
//! The Sense HAT kernel driver exposes the 8×8 matrix as a Linux framebuffer
//! named "RPi-Sense FB". Each pixel is RGB565, little-endian, row-major, so a
//! full frame is 128 bytes written at offset 0.

use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{DisplayPanel, Frame, PIXELS};
use crate::error::{PicycleError, Result};

/// Framebuffer name reported by the Sense HAT driver
const FRAMEBUFFER_NAME: &str = "RPi-Sense FB";

/// Where the kernel lists framebuffer devices
const GRAPHICS_CLASS_DIR: &str = "/sys/class/graphics";

/// Bytes in one encoded frame
pub const FRAME_BYTES: usize = PIXELS * 2;

/// Encode a frame in the framebuffer's RGB565 little-endian layout
pub fn encode_frame(frame: &Frame) -> [u8; FRAME_BYTES] {
    let mut bytes = [0u8; FRAME_BYTES];
    for (chunk, pixel) in bytes.chunks_exact_mut(2).zip(frame.iter()) {
        chunk.copy_from_slice(&pixel.to_rgb565().to_le_bytes());
    }
    bytes
}

/// Sense HAT LED matrix
pub struct SenseHatPanel {
    file: Mutex<File>,
    device_path: String,
}

impl std::fmt::Debug for SenseHatPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenseHatPanel")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SenseHatPanel {
    /// Detect and open the Sense HAT framebuffer
    ///
    /// # Errors
    ///
    /// - `DisplayNotFound`: no framebuffer carries the Sense HAT name
    /// - `Display`: the device exists but cannot be opened for writing
    pub async fn open() -> Result<Self> {
        let path = find_framebuffer(Path::new(GRAPHICS_CLASS_DIR))?;
        Self::open_path(&path).await
    }

    /// Open a specific framebuffer device
    pub async fn open_path(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .await
            .map_err(|e| PicycleError::Display(format!("Failed to open {}: {}", path, e)))?;

        info!("Opened LED matrix framebuffer at {}", path);
        Ok(Self {
            file: Mutex::new(file),
            device_path: path.to_string(),
        })
    }

    /// Open `path` if given, otherwise auto-detect
    pub async fn open_configured(path: &str) -> Result<Self> {
        if path.is_empty() {
            Self::open().await
        } else {
            Self::open_path(path).await
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl DisplayPanel for SenseHatPanel {
    async fn set_frame(&self, frame: &Frame) -> Result<()> {
        let bytes = encode_frame(frame);
        let mut file = self.file.lock().await;

        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| PicycleError::Display(format!("Failed to seek framebuffer: {}", e)))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| PicycleError::Display(format!("Failed to write frame: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| PicycleError::Display(format!("Failed to flush framebuffer: {}", e)))?;

        Ok(())
    }
}

/// Find the `/dev/fbN` whose sysfs name matches the Sense HAT driver
///
/// `class_dir` is normally `/sys/class/graphics`; tests point it at a
/// temporary directory.
pub fn find_framebuffer(class_dir: &Path) -> Result<String> {
    let mut entries: Vec<_> = std::fs::read_dir(class_dir)
        .map_err(|_| PicycleError::DisplayNotFound(class_dir.display().to_string()))?
        .filter_map(|entry| entry.ok())
        .collect();

    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let fb = entry.file_name().to_string_lossy().to_string();
        if !fb.starts_with("fb") {
            continue;
        }

        match std::fs::read_to_string(entry.path().join("name")) {
            Ok(name) if name.trim() == FRAMEBUFFER_NAME => {
                let device = format!("/dev/{}", fb);
                debug!("Framebuffer {} is the Sense HAT matrix", device);
                return Ok(device);
            }
            Ok(name) => debug!("Skipping framebuffer {} ({})", fb, name.trim()),
            Err(e) => debug!("Could not read name of {}: {}", fb, e),
        }
    }

    Err(PicycleError::DisplayNotFound(format!(
        "no framebuffer named '{}' under {}",
        FRAMEBUFFER_NAME,
        class_dir.display()
    )))
}
