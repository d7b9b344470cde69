use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// Validates a single route path
fn validate_path(name: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(Error::ConfigValidation(format!(
            "{} '{}' must start with '/'",
            name, path
        )));
    }

    if path.contains(char::is_whitespace) {
        return Err(Error::ConfigValidation(format!(
            "{} '{}' must not contain whitespace",
            name, path
        )));
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &ServerConfig) -> Result<()> {
    if config.host.is_empty() {
        return Err(Error::ConfigValidation("Host must not be empty".to_string()));
    }

    validate_path("queryPath", &config.query_path)?;
    validate_path("healthCheckPath", &config.health_check_path)?;

    if config.query_path == config.health_check_path {
        return Err(Error::ConfigValidation(
            "queryPath and healthCheckPath must be distinct".to_string(),
        ));
    }

    Ok(())
}
