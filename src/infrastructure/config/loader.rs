//! Layered configuration: defaults merged with `.abathur/config.yaml`,
//! then `.abathur/local.yaml`, then `ABATHUR_`-prefixed environment
//! variables.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("figment extraction failed: {0}")]
    Extraction(#[from] figment::Error),
    #[error("max_concurrency must be between 1 and 256, got {0}")]
    InvalidMaxConcurrency(u32),
    #[error("database path must not be empty")]
    EmptyDatabasePath,
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
    #[error("invalid log format: {0}, expected 'json' or 'pretty'")]
    InvalidLogFormat(String),
    #[error("overlay_replay_window must be greater than zero")]
    InvalidReplayWindow,
    #[error("safety_multiplier must be >= 1.0, got {0}")]
    InvalidSafetyMultiplier(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_path: String,
    pub max_concurrency: u32,
    pub default_sandbox_tier: String,
    pub policy_profile_path: String,
    pub adapter_registry_path: String,
    pub overlay_replay_window: usize,
    pub safety_multiplier: f64,
    pub ephemeral_workspace_root: String,
    pub workspace_grace_seconds: i64,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: ".abathur/abathur.db".to_string(),
            max_concurrency: 4,
            default_sandbox_tier: "medium".to_string(),
            policy_profile_path: ".abathur/policies".to_string(),
            adapter_registry_path: ".abathur/adapters.yaml".to_string(),
            overlay_replay_window: 4096,
            safety_multiplier: 1.2,
            ephemeral_workspace_root: "/tmp/abathur-workspaces".to_string(),
            workspace_grace_seconds: 3600,
            logging: LoggingConfig::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads from the default layered sources:
    /// defaults → `.abathur/config.yaml` → `.abathur/local.yaml` → env (`ABATHUR_` prefix, `__` separator).
    pub fn load() -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".abathur/config.yaml"))
            .merge(Yaml::file(".abathur/local.yaml"))
            .merge(Env::prefixed("ABATHUR_").split("__"))
            .extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: &str) -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("ABATHUR_").split("__"))
            .extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database_path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.max_concurrency == 0 || config.max_concurrency > 256 {
            return Err(ConfigError::InvalidMaxConcurrency(config.max_concurrency));
        }
        if !["trace", "debug", "info", "warn", "error"].contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        if !["json", "pretty"].contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        if config.overlay_replay_window == 0 {
            return Err(ConfigError::InvalidReplayWindow);
        }
        if config.safety_multiplier < 1.0 {
            return Err(ConfigError::InvalidSafetyMultiplier(config.safety_multiplier));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(ConfigLoader::validate(&Config::default()).is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = Config::default();
        config.max_concurrency = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxConcurrency(0))));
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));
    }
}
