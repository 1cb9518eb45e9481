//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! appsettings.toml
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (SECTION__KEY environment overrides)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, DEFAULT_CONFIG_PATH};
pub use schema::{
    AppConfig, ConnectionStrings, DataProtectionConfig, DatabaseConfig, EnvConfig, Environment,
    JobsConfig, MessagingConfig, ObservabilityConfig, RabbitMqConfig, ServerConfig, TlsConfig,
    UserServiceConfig,
};
