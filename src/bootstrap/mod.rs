//! Composition root.
//!
//! # Data Flow
//! ```text
//! ApplicationBuilder::new()
//!     .with_config(config)            AppConfig
//!     .with_infrastructure().await?   Redis, MySQL pool, event bus transport
//!     .with_services().await?         health, key ring, mediator, subscribers,
//!                                     job runner, hub, metrics
//!     .build().await?                 schema (development), pipeline
//!     → Host::run                     background workers, listener, drain
//! ```
//!
//! # Design Decisions
//! - Each phase checks that the previous one ran and fails with
//!   `StartupError::MissingPhase` otherwise
//! - Nothing listens on a socket until `Host::run`, so a failed phase never
//!   leaves a half-started server

pub mod builder;
pub mod host;
pub mod infrastructure;

use thiserror::Error;

use crate::cache::{CacheError, KeyRingError};
use crate::clients::ClientError;
use crate::http::server::ServerError;
use crate::messaging::EventBusError;
use crate::observability::metrics::MetricsError;
use crate::persistence::PersistenceError;

pub use builder::{AppServices, ApplicationBuilder};
pub use host::Host;
pub use infrastructure::Infrastructure;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{phase} requires {required} to run first")]
    MissingPhase {
        phase: &'static str,
        required: &'static str,
    },

    #[error("redis: {0}")]
    Redis(#[from] CacheError),

    #[error("database: {0}")]
    Database(#[from] PersistenceError),

    #[error("event bus: {0}")]
    EventBus(#[from] EventBusError),

    #[error("key ring: {0}")]
    KeyRing(#[from] KeyRingError),

    #[error("user service client: {0}")]
    Client(#[from] ClientError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Server(#[from] ServerError),
}
