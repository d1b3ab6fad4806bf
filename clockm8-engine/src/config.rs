//! Engine configuration
//!
//! Stored as a simple key=value text file:
//! - Thresholds and trigger levels for the input edge detectors
//! - Housekeeping divisions (in samples)
//! - Default output mode and enabled ratio categories

use clockm8_timing::{
    PulseMode, RatioCategories, DEFAULT_STOP_THRESHOLD, DEFAULT_TRIGGER_HIGH, DEFAULT_TRIGGER_LOW,
    DEFAULT_TRIGGER_LENGTH,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid value for {key} on line {line}: {value:?}")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Samples past the expected tick before a clock counts as stopped
    pub stop_threshold: u64,
    /// Lane count polling period
    pub channel_division: u32,
    /// Port connection polling period
    pub connection_division: u32,
    /// Ratio category polling period
    pub catalog_division: u32,
    pub trigger_high: f32,
    pub trigger_low: f32,
    /// Pulse length in trigger mode
    pub trigger_length: u64,
    pub output_mode: PulseMode,
    pub categories: RatioCategories,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            stop_threshold: DEFAULT_STOP_THRESHOLD,
            channel_division: 32,
            connection_division: 128,
            catalog_division: 512,
            trigger_high: DEFAULT_TRIGGER_HIGH,
            trigger_low: DEFAULT_TRIGGER_LOW,
            trigger_length: DEFAULT_TRIGGER_LENGTH,
            output_mode: PulseMode::Gate,
            categories: RatioCategories::default(),
        }
    }
}

impl EngineConfig {
    /// Load config from the default location
    ///
    /// Returns the default config if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "using default config");
                Self::default()
            }
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())?;
        Ok(())
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clockm8")
            .join("config.txt")
    }

    /// Parse config from key=value lines
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!(line = index + 1, "ignoring config line without '='");
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            let line = index + 1;

            match key {
                "sample_rate" => config.sample_rate = parse_value(line, key, value)?,
                "stop_threshold" => config.stop_threshold = parse_value(line, key, value)?,
                "channel_division" => config.channel_division = parse_value(line, key, value)?,
                "connection_division" => {
                    config.connection_division = parse_value(line, key, value)?
                }
                "catalog_division" => config.catalog_division = parse_value(line, key, value)?,
                "trigger_high" => config.trigger_high = parse_value(line, key, value)?,
                "trigger_low" => config.trigger_low = parse_value(line, key, value)?,
                "trigger_length" => config.trigger_length = parse_value(line, key, value)?,
                "output_mode" => {
                    config.output_mode = match value {
                        "gate" => PulseMode::Gate,
                        "trigger" => PulseMode::Trigger,
                        _ => return Err(invalid(line, key, value)),
                    }
                }
                "binary" => config.categories.binary = parse_value(line, key, value)?,
                "ternary" => config.categories.ternary = parse_value(line, key, value)?,
                "dotted" => config.categories.dotted = parse_value(line, key, value)?,
                "odd" => config.categories.odd = parse_value(line, key, value)?,
                _ => tracing::warn!(key, "ignoring unknown config key"),
            }
        }

        Ok(config)
    }

    /// Serialize config to key=value lines
    pub fn serialize(&self) -> String {
        let output_mode = match self.output_mode {
            PulseMode::Gate => "gate",
            PulseMode::Trigger => "trigger",
        };

        let lines = [
            "# clockm8 configuration".to_string(),
            format!("sample_rate={}", self.sample_rate),
            format!("stop_threshold={}", self.stop_threshold),
            format!("channel_division={}", self.channel_division),
            format!("connection_division={}", self.connection_division),
            format!("catalog_division={}", self.catalog_division),
            format!("trigger_high={}", self.trigger_high),
            format!("trigger_low={}", self.trigger_low),
            format!("trigger_length={}", self.trigger_length),
            format!("output_mode={}", output_mode),
            format!("binary={}", self.categories.binary),
            format!("ternary={}", self.categories.ternary),
            format!("dotted={}", self.categories.dotted),
            format!("odd={}", self.categories.odd),
        ];

        lines.join("\n")
    }
}

fn invalid(line: usize, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        line,
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: FromStr>(line: usize, key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(line, key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        let config = EngineConfig::parse("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_parse_values() {
        let content = "stop_threshold=2000\noutput_mode=trigger\nodd=false\ntrigger_high=1.5";
        let config = EngineConfig::parse(content).unwrap();
        assert_eq!(config.stop_threshold, 2000);
        assert_eq!(config.output_mode, PulseMode::Trigger);
        assert!(!config.categories.odd);
        assert!(config.categories.binary);
        assert_eq!(config.trigger_high, 1.5);
    }

    #[test]
    fn test_parse_with_comments_and_unknown_keys() {
        let content = "# Comment\nchannel_division = 64\nfavourite_colour=blue\n# Another comment";
        let config = EngineConfig::parse(content).unwrap();
        assert_eq!(config.channel_division, 64);
    }

    #[test]
    fn test_parse_invalid_value() {
        let err = EngineConfig::parse("sample_rate=fast").unwrap_err();
        match err {
            ConfigError::InvalidValue { line, key, value } => {
                assert_eq!(line, 1);
                assert_eq!(key, "sample_rate");
                assert_eq!(value, "fast");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = EngineConfig {
            stop_threshold: 480,
            trigger_low: 0.25,
            output_mode: PulseMode::Trigger,
            categories: RatioCategories {
                ternary: false,
                ..RatioCategories::default()
            },
            ..EngineConfig::default()
        };

        let parsed = EngineConfig::parse(&config.serialize()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("clockm8-config-test-{}", std::process::id()))
            .join("config.txt");

        let config = EngineConfig {
            sample_rate: 96_000,
            ..EngineConfig::default()
        };
        config.save_to(&path).unwrap();
        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }
}
