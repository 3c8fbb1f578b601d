//! Application configuration
//!
//! Loaded from `duplex-amp.toml` in the platform config directory, or from
//! an explicit path. Every field has a default so a partial (or missing)
//! file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::stream::{PerformanceMode, SharingMode};
use crate::constants::*;
use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "duplex-amp.toml";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Input device to capture from (`0` = system default)
    pub input_device_id: i32,
    pub engine: EngineConfig,
    pub stream: StreamSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_device_id: UNSPECIFIED_DEVICE_ID,
            engine: EngineConfig::default(),
            stream: StreamSettings::default(),
        }
    }
}

/// Warm-up budgets and gain for the sync engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub gain: f32,
    pub drain_callbacks: u32,
    pub cushion_callbacks: u32,
    pub discard_callbacks: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gain: DEFAULT_GAIN,
            drain_callbacks: DRAIN_CALLBACKS,
            cushion_callbacks: CUSHION_CALLBACKS,
            discard_callbacks: DISCARD_CALLBACKS,
        }
    }
}

/// Parameters requested from the stream provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub channel_count: u16,
    pub sharing_mode: SharingMode,
    pub performance_mode: PerformanceMode,
    /// Capacity reported for streams whose host does not expose one
    pub buffer_capacity_frames: u32,
    /// Default sample rate for the output stream (`None` = device default)
    pub default_sample_rate: Option<u32>,
    /// Default frames per burst (`None` = host default)
    pub frames_per_burst: Option<u32>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            channel_count: DEFAULT_CHANNELS,
            sharing_mode: SharingMode::Exclusive,
            performance_mode: PerformanceMode::LowLatency,
            buffer_capacity_frames: DEFAULT_BUFFER_CAPACITY_FRAMES,
            default_sample_rate: None,
            frames_per_burst: None,
        }
    }
}

impl AppConfig {
    /// Parse and validate a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => {
                tracing::debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write config to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Platform config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "duplex-amp")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.channel_count == 0 {
            return Err(Error::Config("channel_count must be at least 1".to_string()));
        }
        if self.stream.buffer_capacity_frames == 0 {
            return Err(Error::Config(
                "buffer_capacity_frames must be at least 1".to_string(),
            ));
        }
        if !self.engine.gain.is_finite() {
            return Err(Error::Config(format!(
                "gain must be finite, got {}",
                self.engine.gain
            )));
        }
        if self.stream.frames_per_burst == Some(0) {
            return Err(Error::Config("frames_per_burst must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = AppConfig::default();
        assert_eq!(config.engine.gain, 1.5);
        assert_eq!(config.engine.drain_callbacks, 20);
        assert_eq!(config.engine.cushion_callbacks, 1);
        assert_eq!(config.engine.discard_callbacks, 30);
        assert_eq!(config.stream.channel_count, 2);
        assert_eq!(config.stream.sharing_mode, SharingMode::Exclusive);
        assert_eq!(config.stream.performance_mode, PerformanceMode::LowLatency);
        assert_eq!(config.input_device_id, UNSPECIFIED_DEVICE_ID);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            input_device_id = 3

            [engine]
            discard_callbacks = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.input_device_id, 3);
        assert_eq!(config.engine.discard_callbacks, 10);
        assert_eq!(config.engine.drain_callbacks, 20);
        assert_eq!(config.stream, StreamSettings::default());
    }

    #[test]
    fn test_rejects_zero_channels() {
        let err = AppConfig::from_toml_str("[stream]\nchannel_count = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = AppConfig::from_toml_str("[engine\ngain = ").unwrap_err();
        assert!(matches!(err, Error::TomlDe(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.input_device_id = 7;
        config.stream.frames_per_burst = Some(96);
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
