// Sequencer configuration - Loaded from RON or JSON files

use crate::sequencer::timeline::DEFAULT_TEMPO_MICROS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
///
/// Missing fields take their default, so an empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Clock thread wake-up period in milliseconds
    pub clock_resolution_ms: u64,
    /// Tempo used before the first tempo event (µs per quarter note)
    pub default_tempo_us: u32,
    /// Initial playback speed multiplier
    pub speed: f64,
    /// Restore program/controller state when playback starts mid-score
    pub chase_on_seek: bool,
    /// Capacity of the notification ring buffer
    pub notification_capacity: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            clock_resolution_ms: 1,
            default_tempo_us: DEFAULT_TEMPO_MICROS,
            speed: 1.0,
            chase_on_seek: true,
            notification_capacity: 256,
        }
    }
}

impl SequencerConfig {
    pub fn from_ron_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` file, anything else is read as RON
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_ron_str(&content)
        }
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock_resolution_ms == 0 {
            return Err(ConfigError::Invalid(
                "clock_resolution_ms must be > 0".to_string(),
            ));
        }
        if self.default_tempo_us == 0 {
            return Err(ConfigError::Invalid(
                "default_tempo_us must be > 0".to_string(),
            ));
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "speed must be a positive number, got {}",
                self.speed
            )));
        }
        if self.notification_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notification_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn clock_resolution(&self) -> Duration {
        Duration::from_millis(self.clock_resolution_ms)
    }
}
