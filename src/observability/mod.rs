//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON outside development)
//!     → Metrics endpoint (Prometheus scrape at /metrics)
//! ```
//!
//! # Design Decisions
//! - Logging is installed before configuration is read so startup
//!   failures are never lost
//! - Request ID flows through every request span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
