//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Job execution / message publish / subscriber dispatch:
//!     → backoff.rs RetryPolicy (bounded attempts)
//!     → calculate_backoff (exponential delay + jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - Every retry loop is bounded; exhausted work is surfaced, not dropped
//! - Jittered backoff prevents thundering herd against the broker or store

pub mod backoff;

pub use backoff::{calculate_backoff, RetryPolicy};
