//! Configuration commands.

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Dump the effective configuration to stdout.
pub fn dump(config: &CliConfig) -> CliResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| CliError::Config(format!("failed to serialize config: {e}")))?;
    println!("# config.toml ({})", CliConfig::default_path().display());
    println!("{toml_str}");
    Ok(())
}

/// Validate the configuration and load the service account key.
pub fn validate(config: &CliConfig) -> CliResult<()> {
    let connector = config.to_connector_config()?;
    let key = connector
        .credentials
        .load()
        .map_err(|e| CliError::Config(e.to_string()))?;

    println!("Service account {} is usable.", key.client_email);
    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path() -> CliResult<()> {
    println!("config: {}", CliConfig::default_path().display());
    Ok(())
}
