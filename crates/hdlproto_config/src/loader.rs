//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::FileConfig;
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "hdlproto.toml";

/// Loads and validates `hdlproto.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<FileConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE_NAME);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates an `hdlproto.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<FileConfig, ConfigError> {
    let config: FileConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &FileConfig) -> Result<(), ConfigError> {
    if config.simulation.max_comb_loops == 0 {
        return Err(ConfigError::ValidationError(
            "simulation.max_comb_loops must be positive".to_string(),
        ));
    }
    if let Some(clock) = &config.simulation.clock {
        if clock.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "simulation.clock must not be empty".to_string(),
            ));
        }
    }
    if config.waveform.enabled && config.waveform.path.is_none() {
        return Err(ConfigError::ValidationError(
            "waveform.path is required when waveform.enabled is set".to_string(),
        ));
    }
    Ok(())
}
