//! `service-host` entry point.
//!
//! Logging comes up first so nothing that follows can fail silently; the
//! log guard is dropped only after the fatal boundary returns, flushing the
//! last records on every exit path.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use service_host::config::{load_config, EnvConfig, ObservabilityConfig, DEFAULT_CONFIG_PATH};
use service_host::lifecycle::run_guarded;
use service_host::observability::logging;
use service_host::ApplicationBuilder;

#[derive(Parser)]
#[command(name = "service-host")]
#[command(about = "Web application host", long_about = None)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

/// Environment as far as it is known before the config file is read.
fn bootstrap_env() -> EnvConfig {
    EnvConfig {
        name: std::env::var("ENV__NAME")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
        ..EnvConfig::default()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let guard = match logging::init(&ObservabilityConfig::default(), &bootstrap_env()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let log = &guard;
    let outcome = run_guarded(env!("CARGO_PKG_NAME"), move || async move {
        let config = load_config(&cli.config)?;
        log.apply(&config.observability, &config.env);
        tracing::info!(
            environment = %config.env.name,
            bind_address = %config.server.bind_address,
            rabbitmq = config.rabbitmq.enabled,
            "Configuration loaded"
        );

        let host = ApplicationBuilder::new()
            .with_config(config)
            .with_infrastructure()
            .await?
            .with_services()
            .await?
            .build()
            .await?;
        host.run().await
    })
    .await;

    drop(guard);
    outcome.into()
}
