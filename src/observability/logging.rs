//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the process-wide logging subscriber before anything else runs
//! - Route records through a non-blocking writer
//! - Flush buffered records when the guard drops, on every exit path
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level comes from `RUST_LOG` when set, otherwise from config
//! - Level and format are re-applied once the configuration file has been
//!   read; until then only `ENV__NAME` is known

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::filter_fn, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter,
    Layer, Registry,
};

use crate::config::{EnvConfig, ObservabilityConfig};

/// Default directives; keeps framework crates quieter than our own.
const BASE_DIRECTIVES: &str = "tower_http=info,sqlx=warn,lapin=warn,hyper=warn";

/// Selects between the JSON and the pretty layer while the subscriber runs.
#[derive(Debug, Clone)]
pub struct FormatSwitch(Arc<AtomicBool>);

impl FormatSwitch {
    pub fn new(json: bool) -> Self {
        Self(Arc::new(AtomicBool::new(json)))
    }

    pub fn select(&self, config: &ObservabilityConfig, env: &EnvConfig) {
        self.0.store(use_json(config, env), Ordering::Relaxed);
    }

    pub fn is_json(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Keeps the log pipeline alive.
///
/// Dropping the guard flushes everything still buffered in the background
/// writer, so it must outlive every code path that can log.
pub struct LogGuard {
    _worker: WorkerGuard,
    filter: reload::Handle<EnvFilter, Registry>,
    format: FormatSwitch,
    env_override: bool,
}

impl LogGuard {
    /// Re-apply level and format once the configuration has been loaded.
    ///
    /// `RUST_LOG` keeps precedence over the configured level.
    pub fn apply(&self, config: &ObservabilityConfig, env: &EnvConfig) {
        self.format.select(config, env);
        if self.env_override {
            return;
        }
        let filter = build_filter(&config.log_level);
        if let Err(e) = self.filter.reload(filter) {
            tracing::warn!(error = %e, "Failed to apply configured log level");
        }
    }

    pub fn format(&self) -> &FormatSwitch {
        &self.format
    }
}

/// Logging initialization error.
#[derive(Debug, thiserror::Error)]
#[error("failed to install log subscriber: {0}")]
pub struct LoggingError(String);

/// Install the global subscriber.
///
/// Called once, first thing in `main`.
pub fn init(config: &ObservabilityConfig, env: &EnvConfig) -> Result<LogGuard, LoggingError> {
    let env_filter = EnvFilter::try_from_default_env().ok();
    let env_override = env_filter.is_some();
    let filter = env_filter.unwrap_or_else(|| build_filter(&config.log_level));
    let (filter_layer, filter_handle) = reload::Layer::new(filter);

    let (writer, worker) = tracing_appender::non_blocking(std::io::stdout());

    let format = FormatSwitch::new(use_json(config, env));
    let json_switch = format.clone();
    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_writer(writer.clone())
        .with_filter(filter_fn(move |_| json_switch.is_json()));
    let pretty_switch = format.clone();
    let pretty_layer = fmt::layer()
        .with_target(true)
        .with_writer(writer)
        .with_filter(filter_fn(move |_| !pretty_switch.is_json()));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| LoggingError(e.to_string()))?;

    Ok(LogGuard {
        _worker: worker,
        filter: filter_handle,
        format,
        env_override,
    })
}

/// Build a filter from a bare level (`info`) or a full directive string.
pub fn build_filter(level: &str) -> EnvFilter {
    let level = if level.trim().is_empty() { "info" } else { level.trim() };
    EnvFilter::try_new(format!("{},{}", level, BASE_DIRECTIVES))
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{}", BASE_DIRECTIVES)))
}

/// Pick the output format: explicit setting first, then by environment.
pub fn use_json(config: &ObservabilityConfig, env: &EnvConfig) -> bool {
    match config.log_format.as_str() {
        "json" => true,
        "pretty" => false,
        _ => !env.is_development(),
    }
}
