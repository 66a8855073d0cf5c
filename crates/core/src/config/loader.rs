//! Configuration loading: a TOML file overlaid with `TANKOBON_*` environment
//! variables.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

use super::{types::Config, ConfigError};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "TANKOBON_";

/// Variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "TANKOBON_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Path of the configuration file: `$TANKOBON_CONFIG`, else `config.toml`.
pub fn config_path_from_env() -> PathBuf {
    std::env::var_os(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Environment overrides.
///
/// Section and key are separated by a double underscore so keys keep their
/// own underscores: `TANKOBON_LIBRARY__SCAN_INTERVAL_SECS=600`.
fn env_overrides() -> Env {
    Env::prefixed(ENV_PREFIX).split("__").ignore(&["CONFIG"])
}

/// Load configuration from `path`, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    Figment::from(Toml::file(path))
        .merge(env_overrides())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse configuration from a TOML string, without environment overrides.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
