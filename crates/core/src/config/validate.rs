use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Library root exists and is a directory
/// - Scan interval is positive
/// - Provider URL parses and allows at least one attempt
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if !config.library.root.is_dir() {
        return Err(ConfigError::ValidationError(format!(
            "library.root is not a directory: {}",
            config.library.root.display()
        )));
    }

    if config.library.scan_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "library.scan_interval_secs cannot be 0".to_string(),
        ));
    }

    if let Some(provider) = &config.provider {
        reqwest::Url::parse(&provider.url).map_err(|e| {
            ConfigError::ValidationError(format!("provider.url is invalid ({}): {}", provider.url, e))
        })?;
        if provider.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "provider.max_attempts must be at least 1".to_string(),
            ));
        }
    }

    Ok(())
}
