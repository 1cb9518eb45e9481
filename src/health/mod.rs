//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET /health
//!     → HealthRegistry::run (every check concurrently, each under a timeout)
//!         → RedisHealthCheck   (PING)
//!         → MySqlHealthCheck   (SELECT 1)
//!         → RabbitMqHealthCheck (connection state, when the broker is enabled)
//!     → HealthReport
//!     → 200 "Healthy" | 503 "Unhealthy" (or JSON with ?detail=true)
//! ```
//!
//! # Design Decisions
//! - Checks are pull-based: nothing probes dependencies between scrapes
//! - A check that exceeds its timeout counts as unhealthy
//! - Each outcome is mirrored into the `dependency_health` gauge

pub mod checks;
pub mod endpoint;

pub use checks::{
    HealthCheck, HealthRegistry, HealthReport, HealthStatus, MySqlHealthCheck,
    RabbitMqHealthCheck, RedisHealthCheck,
};
pub use endpoint::router;
