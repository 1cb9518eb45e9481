//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts > 0, ports valid)
//! - Check URLs and addresses parse before any subsystem sees them
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::AppConfig;

/// Bounds for `data_protection.key_lifetime_days`.
pub const MIN_KEY_LIFETIME_DAYS: i64 = 7;
pub const MAX_KEY_LIFETIME_DAYS: i64 = 3650;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending key.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.https_port == Some(0) {
        errors.push(ValidationError::new("server.https_port", "must be non-zero"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "server.request_timeout_secs",
            "must be greater than zero",
        ));
    }

    check_url(
        &mut errors,
        "connection_strings.redis",
        &config.connection_strings.redis,
        &["redis", "rediss"],
    );
    check_url(
        &mut errors,
        "connection_strings.mysql",
        &config.connection_strings.mysql,
        &["mysql", "mariadb"],
    );
    check_url(
        &mut errors,
        "user_service.base_url",
        &config.user_service.base_url,
        &["http", "https"],
    );

    if config.rabbitmq.enabled {
        if config.rabbitmq.host.trim().is_empty() {
            errors.push(ValidationError::new("rabbitmq.host", "must not be empty"));
        }
        if config.rabbitmq.exchange.trim().is_empty() {
            errors.push(ValidationError::new("rabbitmq.exchange", "must not be empty"));
        }
    }
    if config.rabbitmq.group.trim().is_empty() {
        errors.push(ValidationError::new("rabbitmq.group", "must not be empty"));
    }

    if config.database.max_connections == 0 {
        errors.push(ValidationError::new(
            "database.max_connections",
            "must be greater than zero",
        ));
    }

    if config.jobs.workers == 0 {
        errors.push(ValidationError::new("jobs.workers", "must be greater than zero"));
    }
    if config.jobs.max_attempts == 0 {
        errors.push(ValidationError::new("jobs.max_attempts", "must be greater than zero"));
    }
    if config.messaging.max_attempts == 0 {
        errors.push(ValidationError::new(
            "messaging.max_attempts",
            "must be greater than zero",
        ));
    }
    if config.messaging.failed_retry_interval_secs == 0 {
        errors.push(ValidationError::new(
            "messaging.failed_retry_interval_secs",
            "must be greater than zero",
        ));
    }

    let lifetime = config.data_protection.key_lifetime_days;
    if !(MIN_KEY_LIFETIME_DAYS..=MAX_KEY_LIFETIME_DAYS).contains(&lifetime) {
        errors.push(ValidationError::new(
            "data_protection.key_lifetime_days",
            format!("must be between {MIN_KEY_LIFETIME_DAYS} and {MAX_KEY_LIFETIME_DAYS} days"),
        ));
    }

    match config.observability.log_format.as_str() {
        "" | "pretty" | "json" => {}
        other => errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}'", other),
        )),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: &str,
    schemes: &[&str],
) {
    if value.trim().is_empty() {
        errors.push(ValidationError::new(field, "must not be empty"));
        return;
    }
    match Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid url: {}", e))),
    }
}
