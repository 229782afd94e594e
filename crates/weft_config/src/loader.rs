//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::Path;

/// Name of the configuration file at a project root.
pub const CONFIG_FILE: &str = "weft.toml";

/// Loads and validates `<project_dir>/weft.toml`.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let content = std::fs::read_to_string(project_dir.join(CONFIG_FILE))?;
    load_config_from_str(&content)
}

/// Parses and validates a `weft.toml` from a string.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.system.name.is_empty() {
        return Err(ConfigError::MissingField("system.name".to_string()));
    }
    if config.system.design.is_empty() {
        return Err(ConfigError::MissingField("system.design".to_string()));
    }
    // The system name becomes a file name in the output directory.
    if !config
        .system
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::ValidationError(format!(
            "system.name '{}' may only contain ASCII letters, digits, '_' and '-'",
            config.system.name
        )));
    }
    if config.build.output_dir.is_empty() {
        return Err(ConfigError::MissingField("build.output_dir".to_string()));
    }
    if config.sim.max_cycles == 0 {
        return Err(ConfigError::ValidationError(
            "sim.max_cycles must be at least 1".to_string(),
        ));
    }
    Ok(())
}
