//! The engine's configuration file, `blur-config.yaml`.
//!
//! ```yaml
//! server:
//!   ticks_per_second: 20
//!   max_ticks: 0
//! logging:
//!   level: info
//! modules:
//!   - type: lobby
//!     maps: [{ name: castle }]
//! demo:
//!   bots: 4
//! ```
//!
//! Every section is optional. A missing file means defaults everywhere.

use std::path::Path;

use blur_core::{ConfigError, LoggingConfig, ServerConfig};
use blur_modules::ModuleData;
use serde::Deserialize;
use tracing::info;

/// Default location of the configuration file.
pub const CONFIG_PATH: &str = "blur-config.yaml";

/// Whole engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Tick loop settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Modules of the root session, in registration order.
    #[serde(default)]
    pub modules: Vec<ModuleData>,
    /// Simulated players for running without a game server attached.
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Simulated players.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DemoConfig {
    /// Bots connected at startup.
    #[serde(default)]
    pub bots: usize,
    /// Half-width of the square the bots wander in, in blocks.
    #[serde(default = "default_roam")]
    pub roam: i32,
    /// Chance per tick that a living bot dies.
    #[serde(default = "default_death_chance")]
    pub death_chance: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            bots: 0,
            roam: default_roam(),
            death_chance: default_death_chance(),
        }
    }
}

const fn default_roam() -> i32 {
    16
}

const fn default_death_chance() -> f64 {
    0.002
}

impl EngineConfig {
    /// Load from `path`, or fall back to defaults when the file is absent.
    /// Environment overrides are applied either way.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            blur_core::config::load_yaml::<Self>(path)?
        } else {
            info!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };
        config.server.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_optional() {
        let config: EngineConfig = serde_yml::from_str("server:\n  max_ticks: 10\n")
            .unwrap_or_default();
        assert_eq!(config.server.max_ticks, 10);
        assert_eq!(config.server.ticks_per_second, 20);
        assert_eq!(config.logging.level, "info");
        assert!(config.modules.is_empty());
        assert_eq!(config.demo.bots, 0);
        assert_eq!(config.demo.roam, 16);
    }

    #[test]
    fn root_modules_parse() {
        let yaml = r"
modules:
  - type: lobby
    required_players: 2
    countdown: 10s
    maps:
      - name: castle
        modules:
          - type: teams
            teams: [{ id: red }, { id: blue }]
demo:
  bots: 3
";
        let config: Option<EngineConfig> = serde_yml::from_str(yaml).ok();
        let config = config.unwrap_or_default();
        assert_eq!(config.modules.len(), 1);
        assert_eq!(config.modules.first().map(ModuleData::type_name), Some("lobby"));
        assert_eq!(config.demo.bots, 3);
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = EngineConfig::load(Path::new("/nonexistent/blur-config.yaml"));
        assert!(config.is_ok_and(|c| c.modules.is_empty()));
    }
}
