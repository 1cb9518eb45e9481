//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Default configuration file looked up next to the binary's working directory.
pub const DEFAULT_CONFIG_PATH: &str = "appsettings.toml";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    Override { key: String, message: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from a TOML file, apply environment overrides and validate.
///
/// A missing file at [`DEFAULT_CONFIG_PATH`] is tolerated (defaults plus
/// environment are used); a missing explicitly-requested file is an error.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && path == Path::new(DEFAULT_CONFIG_PATH) => {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            AppConfig::default()
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    let config = apply_env_overrides(config, std::env::vars())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `SECTION__KEY` style overrides.
///
/// Unknown variables are ignored so the host can share an environment with
/// other processes.
pub fn apply_env_overrides<I>(mut config: AppConfig, vars: I) -> Result<AppConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        match key.as_str() {
            "SERVER__BIND_ADDRESS" => config.server.bind_address = value,
            "SERVER__HTTPS_PORT" => config.server.https_port = Some(parse(&key, &value)?),
            "SERVER__STATIC_FILES_DIR" => config.server.static_files_dir = value,
            "CONNECTION_STRINGS__REDIS" => config.connection_strings.redis = value,
            "CONNECTION_STRINGS__MYSQL" => config.connection_strings.mysql = value,
            "USER_SERVICE__BASE_URL" => config.user_service.base_url = value,
            "RABBITMQ__ENABLED" => config.rabbitmq.enabled = parse(&key, &value)?,
            "RABBITMQ__HOST" => config.rabbitmq.host = value,
            "RABBITMQ__PORT" => config.rabbitmq.port = parse(&key, &value)?,
            "RABBITMQ__USER_NAME" => config.rabbitmq.user_name = value,
            "RABBITMQ__PASSWORD" => config.rabbitmq.password = value,
            "RABBITMQ__VIRTUAL_HOST" => config.rabbitmq.virtual_host = value,
            "RABBITMQ__EXCHANGE" => config.rabbitmq.exchange = value,
            "RABBITMQ__GROUP" => config.rabbitmq.group = value,
            "ENV__NAME" => config.env.name = parse(&key, &value)?,
            "ENV__SERVICE_NAME" => config.env.service_name = value,
            "OBSERVABILITY__LOG_LEVEL" => config.observability.log_level = value,
            "OBSERVABILITY__LOG_FORMAT" => config.observability.log_format = value,
            _ => {}
        }
    }
    Ok(config)
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Override {
        key: key.to_string(),
        message: e.to_string(),
    })
}
