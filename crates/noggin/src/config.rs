//! Configuration loading for the noggin runtime
//!
//! Configuration is a TOML file with one section per subsystem. Every field
//! has a default, so an empty file (or no file at all) yields a working
//! setup for a head reachable over mDNS. Timing constants are configurable
//! so integration tests can shrink them.

use crate::{NogginError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Device link configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Static `host:port` address; set to skip discovery entirely
    pub address: Option<String>,
    /// mDNS service type to browse for
    pub service_type: String,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Timeout for a single discovery attempt in milliseconds
    pub discovery_timeout_ms: u64,
    /// Number of discovery attempts before giving up
    pub discovery_attempts: u32,
    /// Delay between discovery attempts in milliseconds
    pub discovery_retry_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: None,
            service_type: "_noggin._tcp.local.".to_string(),
            connect_timeout_ms: 5000,
            discovery_timeout_ms: 2000,
            discovery_attempts: 3,
            discovery_retry_delay_ms: 500,
        }
    }
}

impl DeviceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn discovery_retry_delay(&self) -> Duration {
        Duration::from_millis(self.discovery_retry_delay_ms)
    }
}

/// Audio playback configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Playback chunk duration in milliseconds; bounds interruption latency
    pub chunk_ms: u64,
    /// Sample rate used when synthesizing the prompt chime
    pub chime_sample_rate: u32,
    /// Optional override for the cached chime WAV location
    pub chime_cache: Option<PathBuf>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_ms: 20,
            chime_sample_rate: 22_050,
            chime_cache: None,
        }
    }
}

impl PlaybackConfig {
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_millis(self.chunk_ms)
    }
}

/// Event session configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Debounce window between accepted triggers, in milliseconds
    pub debounce_ms: u64,
    /// Slice size for cancellable waits, in milliseconds
    pub cancel_slice_ms: u64,
    /// Pause between the prompt chime and speech capture, in milliseconds
    pub prompt_lead_in_ms: u64,
    /// Hold time after moving the nod servo to rest, in milliseconds
    pub servo_hold_ms: u64,
    /// Hold time after the turn before returning to rest, in milliseconds
    pub servo_return_ms: u64,
    /// Bound on waiting for the actuator sequence, in milliseconds
    pub servo_join_timeout_ms: u64,
    /// Indicator lit while a session is active
    pub busy_indicator: u8,
    /// Indicator lit while capturing speech
    pub listening_indicator: u8,
    /// Servo performing the nod-to-rest motion
    pub nod_servo: u8,
    /// Servo performing the alternating turn motion
    pub turn_servo: u8,
    /// Rest angle for the nod servo
    pub rest_angle: u8,
    /// Angle range for the leftward turn, inclusive
    pub turn_left_range: (u8, u8),
    /// Angle range for the rightward turn, inclusive
    pub turn_right_range: (u8, u8),
    /// Phrase spoken when no speech was recognized
    pub fallback_phrase: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            cancel_slice_ms: 500,
            prompt_lead_in_ms: 300,
            servo_hold_ms: 5000,
            servo_return_ms: 2000,
            servo_join_timeout_ms: 3000,
            busy_indicator: 4,
            listening_indicator: 5,
            nod_servo: 3,
            turn_servo: 2,
            rest_angle: 0,
            turn_left_range: (30, 60),
            turn_right_range: (120, 150),
            fallback_phrase: "I didn't catch your question.".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cancel_slice(&self) -> Duration {
        Duration::from_millis(self.cancel_slice_ms)
    }

    pub fn prompt_lead_in(&self) -> Duration {
        Duration::from_millis(self.prompt_lead_in_ms)
    }

    pub fn servo_hold(&self) -> Duration {
        Duration::from_millis(self.servo_hold_ms)
    }

    pub fn servo_return(&self) -> Duration {
        Duration::from_millis(self.servo_return_ms)
    }

    pub fn servo_join_timeout(&self) -> Duration {
        Duration::from_millis(self.servo_join_timeout_ms)
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NogginConfig {
    pub device: DeviceConfig,
    pub playback: PlaybackConfig,
    pub session: SessionConfig,
}

impl NogginConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| NogginError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| NogginError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from the default location, falling back to defaults if absent
    ///
    /// The default location is `noggin/config.toml` under the platform
    /// config directory.
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config: {}", e);
                Self::default()
            }),
            _ => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Default config file path, if a config directory is available
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("noggin").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = NogginConfig::default();
        assert_eq!(config.device.service_type, "_noggin._tcp.local.");
        assert_eq!(config.device.discovery_attempts, 3);
        assert_eq!(config.playback.chunk_ms, 20);
        assert_eq!(config.session.debounce_ms, 1000);
        assert_eq!(config.session.turn_left_range, (30, 60));
        assert_eq!(config.session.turn_right_range, (120, 150));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: NogginConfig = toml::from_str("").unwrap();
        assert_eq!(config.session.busy_indicator, 4);
        assert_eq!(config.session.listening_indicator, 5);
    }

    #[test]
    fn test_partial_override() {
        let config: NogginConfig = toml::from_str(
            r#"
            [device]
            address = "192.168.4.1:1234"

            [session]
            debounce_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.device.address.as_deref(), Some("192.168.4.1:1234"));
        assert_eq!(config.session.debounce_ms, 50);
        // Untouched fields keep their defaults
        assert_eq!(config.device.connect_timeout_ms, 5000);
        assert_eq!(config.session.servo_hold_ms, 5000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[playback]\nchunk_ms = 10").unwrap();

        let config = NogginConfig::load(file.path()).unwrap();
        assert_eq!(config.playback.chunk_ms, 10);
        assert_eq!(config.playback.chunk_duration(), Duration::from_millis(10));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = NogginConfig::load("/nonexistent/noggin.toml").unwrap_err();
        assert!(matches!(err, NogginError::Config(_)));
    }

    #[test]
    fn test_roundtrip() {
        let config = NogginConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let reparsed: NogginConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed.session.fallback_phrase, config.session.fallback_phrase);
    }
}
