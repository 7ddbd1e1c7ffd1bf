use std::path::Path;

use audio_backend::{DeviceInfo, SampleFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What to do with a one-shot request when every slot is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Drop the new request.
    Never,
    /// Replace the playing one-shot with the fewest frames left.
    #[default]
    SoonestToFinish,
}

/// Mixer settings. Every field has a default, so partial RON documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Size of the voice slot pool. Fixed for the life of the system.
    pub max_voices: usize,
    /// Highest addressable entity id + 1.
    pub max_entities: usize,
    /// 44, 22 or 11.
    pub khz: u32,
    pub load_as_8bit: bool,
    /// Device period in seconds.
    pub latency: f32,
    /// Master volume, 0..=1.
    pub volume: f32,
    pub raw_buffer_frames: usize,
    pub raw_write_chunk_frames: usize,
    pub eviction: EvictionPolicy,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_voices: 32,
            max_entities: 1024,
            khz: 22,
            load_as_8bit: false,
            latency: 0.02,
            volume: 0.7,
            raw_buffer_frames: 8192,
            raw_write_chunk_frames: 4096,
            eviction: EvictionPolicy::default(),
        }
    }
}

impl AudioConfig {
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: AudioConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&text)?;
        tracing::info!(path = %path.display(), "loaded audio config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_voices == 0 {
            return Err(ConfigError::Invalid("max_voices must be non-zero".into()));
        }
        if self.max_entities == 0 {
            return Err(ConfigError::Invalid("max_entities must be non-zero".into()));
        }
        if self.raw_buffer_frames == 0 || self.raw_write_chunk_frames == 0 {
            return Err(ConfigError::Invalid("raw sample buffer sizes must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(ConfigError::Invalid(format!("volume {} outside 0..=1", self.volume)));
        }
        if !(self.latency > 0.0) {
            return Err(ConfigError::Invalid(format!("latency {} must be positive", self.latency)));
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        match self.khz {
            44 => 44100,
            22 => 22050,
            _ => 11025,
        }
    }

    pub fn decoded_format(&self) -> SampleFormat {
        if self.load_as_8bit {
            SampleFormat::U8
        } else {
            SampleFormat::S16
        }
    }

    pub fn period_frames(&self) -> usize {
        ((self.latency * self.sample_rate() as f32).round() as usize).max(1)
    }

    /// Device parameters a host should open its engine with.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            sample_rate: self.sample_rate(),
            buffer_size: self.period_frames(),
            channels: 2,
            decoded_format: self.decoded_format(),
            device_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AudioConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sample_rate(), 22050);
        assert_eq!(config.period_frames(), 441);
        assert_eq!(config.decoded_format(), SampleFormat::S16);
    }

    #[test]
    fn khz_selects_rate() {
        let mut config = AudioConfig::default();
        config.khz = 44;
        assert_eq!(config.sample_rate(), 44100);
        config.khz = 11;
        assert_eq!(config.sample_rate(), 11025);
        config.khz = 7;
        assert_eq!(config.sample_rate(), 11025);
    }

    #[test]
    fn partial_ron_fills_defaults() {
        let config = AudioConfig::from_ron_str("(max_voices: 8, khz: 44, eviction: Never)").unwrap();
        assert_eq!(config.max_voices, 8);
        assert_eq!(config.sample_rate(), 44100);
        assert_eq!(config.eviction, EvictionPolicy::Never);
        assert_eq!(config.raw_buffer_frames, 8192);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(AudioConfig::from_ron_str("(max_voices: 0)"), Err(ConfigError::Invalid(_))));
        assert!(matches!(AudioConfig::from_ron_str("(volume: 1.5)"), Err(ConfigError::Invalid(_))));
        assert!(matches!(AudioConfig::from_ron_str("(max_voices: \"x\")"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(volume: 0.25, load_as_8bit: true)").unwrap();
        let config = AudioConfig::load(file.path()).unwrap();
        assert_eq!(config.volume, 0.25);
        assert_eq!(config.device_info().decoded_format, SampleFormat::U8);
    }
}
