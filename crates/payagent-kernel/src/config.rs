//! Configuration loading from `~/.payagent/config.toml` with defaults.

use payagent_types::config::AgentConfig;
use std::path::{Path, PathBuf};
use tracing::info;

/// Load agent configuration from a TOML file, with defaults.
///
/// A missing, unreadable or invalid file never fails the caller: the problem
/// is logged and the defaults are used.
pub fn load_config(path: Option<&Path>) -> AgentConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return AgentConfig::default();
    }

    let contents = match std::fs::read_to_string(&config_path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            return AgentConfig::default();
        }
    };

    match toml::from_str::<AgentConfig>(&contents) {
        Ok(config) => {
            info!(path = %config_path.display(), "Loaded configuration");
            config
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to parse config, using defaults"
            );
            AgentConfig::default()
        }
    }
}

/// Render a configuration as TOML.
pub fn to_toml(config: &AgentConfig) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(config)
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    payagent_home().join("config.toml")
}

/// Get the Payment Agent home directory.
pub fn payagent_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".payagent")
}
