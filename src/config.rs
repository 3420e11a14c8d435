//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub gps: GpsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// gpsd connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GpsConfig {
    #[serde(default = "default_gps_host")]
    pub host: String,

    #[serde(default = "default_gps_port")]
    pub port: u16,

    #[serde(default = "default_gps_timeout_ms")]
    pub timeout_ms: u64,
}

/// Sense HAT configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// Framebuffer device; empty means auto-detect
    #[serde(default)]
    pub framebuffer: String,

    /// Joystick event device; empty means auto-detect
    #[serde(default)]
    pub joystick: String,

    #[serde(default = "default_scroll_speed_ms")]
    pub scroll_speed_ms: u64,

    #[serde(default = "default_startup_message")]
    pub startup_message: String,
}

/// Session store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,
}

/// Loop timing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_error_cooldown_ticks")]
    pub error_cooldown_ticks: u32,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file_enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

// Default value functions
fn default_gps_host() -> String { "127.0.0.1".to_string() }
fn default_gps_port() -> u16 { 2947 }
fn default_gps_timeout_ms() -> u64 { 1000 }

fn default_scroll_speed_ms() -> u64 { 100 }
fn default_startup_message() -> String { "Picycle".to_string() }

fn default_data_dir() -> String { ".".to_string() }
fn default_file_suffix() -> String { "picycle.sqlite".to_string() }

fn default_tick_ms() -> u64 { 1000 }
fn default_error_cooldown_ticks() -> u32 { 3 }

fn default_log_dir() -> String { "./logs".to_string() }

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            host: default_gps_host(),
            port: default_gps_port(),
            timeout_ms: default_gps_timeout_ms(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            framebuffer: String::new(),
            joystick: String::new(),
            scroll_speed_ms: default_scroll_speed_ms(),
            startup_message: default_startup_message(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_suffix: default_file_suffix(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            error_cooldown_ticks: default_error_cooldown_ticks(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_enabled: false,
            log_dir: default_log_dir(),
        }
    }
}

impl SessionConfig {
    /// Loop period as a `Duration`
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl GpsConfig {
    /// Per-request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use picycle::config::Config;
    ///
    /// let config = Config::load("config/picycle.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    ///
    /// An existing file that fails to parse or validate is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.gps.host.is_empty() {
            return Err(crate::error::PicycleError::Config(
                toml::de::Error::custom("gps host cannot be empty")
            ));
        }

        if self.gps.port == 0 {
            return Err(crate::error::PicycleError::Config(
                toml::de::Error::custom("gps port cannot be 0")
            ));
        }

        if self.gps.timeout_ms == 0 || self.gps.timeout_ms > 10000 {
            return Err(crate::error::PicycleError::Config(
                toml::de::Error::custom("gps timeout_ms must be between 1 and 10000")
            ));
        }

        if self.session.tick_ms < 100 || self.session.tick_ms > 10000 {
            return Err(crate::error::PicycleError::Config(
                toml::de::Error::custom("tick_ms must be between 100 and 10000")
            ));
        }

        if self.session.error_cooldown_ticks == 0 {
            return Err(crate::error::PicycleError::Config(
                toml::de::Error::custom("error_cooldown_ticks must be greater than 0")
            ));
        }

        if self.storage.data_dir.is_empty() {
            return Err(crate::error::PicycleError::Config(
                toml::de::Error::custom("storage data_dir cannot be empty")
            ));
        }

        if self.storage.file_suffix.is_empty() {
            return Err(crate::error::PicycleError::Config(
                toml::de::Error::custom("storage file_suffix cannot be empty")
            ));
        }

        if self.display.startup_message.is_empty() {
            return Err(crate::error::PicycleError::Config(
                toml::de::Error::custom("startup_message cannot be empty")
            ));
        }

        if self.display.scroll_speed_ms < 10 || self.display.scroll_speed_ms > 1000 {
            return Err(crate::error::PicycleError::Config(
                toml::de::Error::custom("scroll_speed_ms must be between 10 and 1000")
            ));
        }

        if self.logging.file_enabled && self.logging.log_dir.is_empty() {
            return Err(crate::error::PicycleError::Config(
                toml::de::Error::custom("log_dir cannot be empty when file logging is enabled")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[gps]
host = "10.0.0.2"

[storage]
data_dir = "/var/lib/picycle"

[session]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.gps.host, "10.0.0.2");
        assert_eq!(config.gps.port, 2947);
        assert_eq!(config.storage.data_dir, "/var/lib/picycle");
        assert_eq!(config.session.tick_ms, 1000);
        assert_eq!(config.display.startup_message, "Picycle");
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.session.error_cooldown_ticks, 3);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.gps.host, "127.0.0.1");
    }

    #[test]
    fn test_load_or_default_invalid_file_is_error() {
        use std::io::Write;

        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file.write_all(b"[session]\ntick_ms = 0\n").unwrap();
        temp_file.flush().unwrap();

        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_malformed_toml() {
        use std::io::Write;

        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file.write_all(b"[gps\nhost = ").unwrap();
        temp_file.flush().unwrap();

        assert!(matches!(
            Config::load(temp_file.path()),
            Err(crate::error::PicycleError::Config(_))
        ));
    }

    #[test]
    fn test_empty_host() {
        let mut config = Config::default();
        config.gps.host = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_port_zero() {
        let mut config = Config::default();
        config.gps.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_out_of_range() {
        let mut config = Config::default();
        config.gps.timeout_ms = 0;
        assert!(config.validate().is_err());
        config.gps.timeout_ms = 10001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_out_of_range() {
        let mut config = Config::default();
        config.session.tick_ms = 99;
        assert!(config.validate().is_err());
        config.session.tick_ms = 10001;
        assert!(config.validate().is_err());
        config.session.tick_ms = 250;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cooldown_zero() {
        let mut config = Config::default();
        config.session.error_cooldown_ticks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_data_dir() {
        let mut config = Config::default();
        config.storage.data_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scroll_speed_out_of_range() {
        let mut config = Config::default();
        config.display.scroll_speed_ms = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = Config::default();
        config.logging.file_enabled = true;
        config.logging.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = Config::default();
        config.logging.file_enabled = false;
        config.logging.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config::default();
        assert_eq!(config.session.tick(), Duration::from_secs(1));
        assert_eq!(config.gps.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_gps_host(), "127.0.0.1");
        assert_eq!(default_gps_port(), 2947);
        assert_eq!(default_gps_timeout_ms(), 1000);
        assert_eq!(default_scroll_speed_ms(), 100);
        assert_eq!(default_startup_message(), "Picycle");
        assert_eq!(default_data_dir(), ".");
        assert_eq!(default_file_suffix(), "picycle.sqlite");
        assert_eq!(default_tick_ms(), 1000);
        assert_eq!(default_error_cooldown_ticks(), 3);
        assert_eq!(default_log_dir(), "./logs");
    }

    #[test]
    fn test_shipped_config_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/picycle.toml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.gps.host, default_gps_host());
        assert_eq!(config.gps.port, default_gps_port());
        assert_eq!(config.display.framebuffer, "");
        assert_eq!(config.storage.file_suffix, default_file_suffix());
        assert_eq!(config.session.tick_ms, default_tick_ms());
        assert!(!config.logging.file_enabled);
    }
}
