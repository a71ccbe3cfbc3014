//! Configuration shared by every Blur binary.
//!
//! The engine's top-level file (`blur-config.yaml`) embeds these sections;
//! this module defines them, their defaults, and the environment overrides.

use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Read and parse a YAML file into any config type.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, or
/// [`ConfigError::Yaml`] if the content does not match `T`.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yml::from_str(&contents)?)
}

/// Tick loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Wall-clock pacing of the tick loop. Game durations are always
    /// measured at 20 ticks per second regardless of this value.
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: u32,

    /// Stop after this many ticks. `0` runs until shutdown.
    #[serde(default)]
    pub max_ticks: u64,

    /// Seed for the tree's random generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: default_ticks_per_second(),
            max_ticks: 0,
            seed: default_seed(),
        }
    }
}

impl ServerConfig {
    /// Apply environment variable overrides:
    /// - `BLUR_TICKS_PER_SECOND` overrides `ticks_per_second`
    /// - `BLUR_MAX_TICKS` overrides `max_ticks`
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(val) = env_number("BLUR_TICKS_PER_SECOND") {
            self.ticks_per_second = val;
        }
        if let Some(val) = env_number("BLUR_MAX_TICKS") {
            self.max_ticks = val;
        }
    }

    /// Milliseconds between ticks, at least one.
    pub fn tick_interval_ms(&self) -> u64 {
        1000_u64
            .checked_div(u64::from(self.ticks_per_second))
            .unwrap_or(1000)
            .max(1)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn env_number<T: core::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

const fn default_ticks_per_second() -> u32 {
    20
}

const fn default_seed() -> u64 {
    42
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.ticks_per_second, 20);
        assert_eq!(config.max_ticks, 0);
        assert_eq!(config.tick_interval_ms(), 50);
        assert_eq!(LoggingConfig::default().level, "info");
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config: ServerConfig = serde_yml::from_str("max_ticks: 100").unwrap_or_default();
        assert_eq!(config.max_ticks, 100);
        assert_eq!(config.ticks_per_second, 20);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn zero_tick_rate_does_not_divide_by_zero() {
        let config = ServerConfig {
            ticks_per_second: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.tick_interval_ms(), 1000);
        let fast = ServerConfig {
            ticks_per_second: 5000,
            ..ServerConfig::default()
        };
        assert_eq!(fast.tick_interval_ms(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = load_yaml::<ServerConfig>(Path::new("/nonexistent/blur.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn bad_yaml_is_yaml_error() {
        let result: Result<ServerConfig, ConfigError> =
            serde_yml::from_str("ticks_per_second: [").map_err(ConfigError::from);
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
