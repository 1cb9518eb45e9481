//! HTTP edge of the host.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (listener, graceful shutdown)
//!     → pipeline.rs (panic boundary, request id, trace, timeout, metrics,
//!                    HTTPS redirection)
//!     → authorization.rs (local-only dashboards)
//!     → controllers / hub / health / metrics / dashboards / static files
//!     → error.rs (AppError → problem+json)
//! ```

pub mod authorization;
pub mod docs;
pub mod error;
pub mod https;
pub mod pipeline;
pub mod server;

pub use error::{AppError, ProblemDetails};
pub use server::{HttpServer, ServerError};
