//! Transmitter configuration
//!
//! Loaded from TOML, with `DMX_PORT` / `DMX_BAUDRATE` environment overrides.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::frame::ProtocolTiming;

/// Which communication backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// RS-485 transceiver on a UART
    #[default]
    Serial,
    /// Discards everything; for running without hardware
    Null,
}

/// Construction configuration for a [`crate::DmxSender`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmxConfig {
    /// Serial device path or name
    pub port: String,
    pub baud_rate: u32,
    /// Number of channels in the universe (1..=512)
    pub channels: usize,
    /// Port open / write timeout
    pub timeout_ms: u64,
    /// Target time between frame starts
    pub frame_interval_ms: u64,
    pub break_us: u64,
    pub mark_after_break_us: u64,
    /// Upper bound on waiting for the transmit thread in `stop()`
    pub shutdown_timeout_ms: u64,
    pub backend: Backend,
}

impl Default for DmxConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            channels: DEFAULT_CHANNELS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            break_us: DEFAULT_BREAK_US,
            mark_after_break_us: DEFAULT_MARK_AFTER_BREAK_US,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            backend: Backend::Serial,
        }
    }
}

impl DmxConfig {
    /// Config for running without hardware
    pub fn null() -> Self {
        Self {
            port: "null".to_string(),
            backend: Backend::Null,
            ..Self::default()
        }
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Per-user config file location, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "stagecontrol", "dmx-sender")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply `DMX_PORT` and `DMX_BAUDRATE` overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("DMX_PORT") {
            self.port = port;
        }
        if let Ok(baud) = std::env::var("DMX_BAUDRATE") {
            self.baud_rate = baud
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("DMX_BAUDRATE is not a number: {baud}")))?;
        }
        Ok(())
    }

    /// Reject settings the transmitter cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(Error::Config(format!(
                "channels must be within 1..={MAX_CHANNELS}, got {}",
                self.channels
            )));
        }
        if self.baud_rate == 0 {
            return Err(Error::Config("baud_rate must be non-zero".into()));
        }
        if self.frame_interval_ms == 0 {
            return Err(Error::Config("frame_interval_ms must be non-zero".into()));
        }
        if self.break_us < MIN_BREAK_US {
            return Err(Error::Config(format!(
                "break_us must be at least {MIN_BREAK_US}, got {}",
                self.break_us
            )));
        }
        if self.mark_after_break_us < MIN_MARK_AFTER_BREAK_US {
            return Err(Error::Config(format!(
                "mark_after_break_us must be at least {MIN_MARK_AFTER_BREAK_US}, got {}",
                self.mark_after_break_us
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn timing(&self) -> ProtocolTiming {
        ProtocolTiming {
            break_duration: Duration::from_micros(self.break_us),
            mark_after_break: Duration::from_micros(self.mark_after_break_us),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol() {
        let config = DmxConfig::default();
        assert_eq!(config.baud_rate, 250_000);
        assert_eq!(config.channels, 512);
        assert_eq!(config.frame_interval(), Duration::from_millis(23));
        assert_eq!(config.timeout(), Duration::from_secs(1));
        assert_eq!(config.timing().break_duration, Duration::from_millis(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DmxConfig = toml::from_str("port = \"/dev/ttyUSB0\"\nchannels = 24\n").unwrap();
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.channels, 24);
        assert_eq!(config.baud_rate, 250_000);
        assert_eq!(config.backend, Backend::Serial);
    }

    #[test]
    fn test_backend_parses_lowercase() {
        let config: DmxConfig = toml::from_str("backend = \"null\"").unwrap();
        assert_eq!(config.backend, Backend::Null);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DmxConfig::default();
        config.channels = 513;
        assert!(config.validate().is_err());

        let mut config = DmxConfig::default();
        config.channels = 0;
        assert!(config.validate().is_err());

        let mut config = DmxConfig::default();
        config.break_us = 50;
        assert!(config.validate().is_err());

        let mut config = DmxConfig::default();
        config.mark_after_break_us = 4;
        assert!(config.validate().is_err());

        let mut config = DmxConfig::default();
        config.frame_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = DmxConfig::null();
        config.channels = 96;
        config.frame_interval_ms = 30;
        config.save(&path).unwrap();

        let loaded = DmxConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "channels = 1000\n").unwrap();

        assert!(matches!(DmxConfig::load(&path), Err(Error::Config(_))));
    }
}
