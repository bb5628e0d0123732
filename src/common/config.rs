//! Configuration file handling

use serde::Deserialize;
use std::path::Path;

use super::paths::config_path;
use super::Result;
use crate::model::LineEnding;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Engine timing and substitution settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Result reporting settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Engine settings, all durations in milliseconds
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Response wait ceiling for commands that do not set one
    #[serde(default = "default_timeout")]
    pub default_timeout_ms: u64,

    /// Lower bound applied to the response wait when validation is enabled
    #[serde(default = "default_min_validation_timeout")]
    pub min_validation_timeout_ms: u64,

    /// Attempts used by the Retry policy when a command does not set them
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    /// Delay between Retry attempts when a command does not set one
    #[serde(default = "default_retry_delay")]
    pub default_retry_delay_ms: u64,

    /// Delay before a listener-triggered jump or continue is executed
    #[serde(default = "default_jump_delay")]
    pub jump_delay_ms: u64,

    /// Replace `{name|default}` with `default` when `name` is unset
    #[serde(default)]
    pub apply_placeholder_defaults: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout(),
            min_validation_timeout_ms: default_min_validation_timeout(),
            default_max_attempts: default_max_attempts(),
            default_retry_delay_ms: default_retry_delay(),
            jump_delay_ms: default_jump_delay(),
            apply_placeholder_defaults: false,
        }
    }
}

fn default_timeout() -> u64 {
    5000
}
fn default_min_validation_timeout() -> u64 {
    1000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_jump_delay() -> u64 {
    100
}

/// Transport settings
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Line ending used when a command does not specify one
    #[serde(default = "default_line_ending")]
    pub line_ending: LineEnding,

    /// Capacity of the incoming-line broadcast channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            line_ending: default_line_ending(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_line_ending() -> LineEnding {
    LineEnding::CrLf
}
fn default_channel_capacity() -> usize {
    1024
}

/// Result reporting configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Maximum number of failure log entries kept per run result
    #[serde(default = "default_max_failure_logs")]
    pub max_failure_logs: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_failure_logs: default_max_failure_logs(),
        }
    }
}

fn default_max_failure_logs() -> usize {
    1000
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_sections() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.engine.default_timeout_ms, 5000);
        assert_eq!(config.engine.default_max_attempts, 3);
        assert_eq!(config.transport.line_ending, LineEnding::CrLf);
        assert!(!config.engine.apply_placeholder_defaults);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[engine]
jump_delay_ms = 5
apply_placeholder_defaults = true

[transport]
line_ending = "lf"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.engine.jump_delay_ms, 5);
        assert!(config.engine.apply_placeholder_defaults);
        assert_eq!(config.engine.default_retry_delay_ms, 1000);
        assert_eq!(config.transport.line_ending, LineEnding::Lf);
        assert_eq!(config.output.max_failure_logs, 1000);
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(super::super::Error::ConfigParse(_))
        ));
    }
}
