use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

const ENV_PREFIX: &str = "DOCFORGE_";
const DRY_RUN_VAR: &str = "CONVERTER_DRY_RUN";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

/// Load configuration from defaults and environment variables only
pub fn load_env_config() -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Applies switches that live outside the `DOCFORGE_` namespace.
///
/// `CONVERTER_DRY_RUN=1` forces dry-run mode regardless of the file.
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    if lookup(DRY_RUN_VAR).as_deref().map(str::trim) == Some("1") {
        config.orchestrator.dry_run = true;
    }
    config
}
