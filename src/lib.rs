//! Web application host.
//!
//! # Architecture Overview
//!
//! ```text
//!   main ──▶ logging::init ──▶ load_config ──▶ ApplicationBuilder ──▶ Host::run
//!                                                   │
//!               ┌───────────────────────────────────┼─────────────────────────────┐
//!               ▼                                   ▼                             ▼
//!        infrastructure                         services                      pipeline
//!   ┌──────────────────────┐   ┌─────────────────────────────────────┐   ┌─────────────────┐
//!   │ Redis (cache, lock,  │   │ health checks      mediator         │   │ panic boundary  │
//!   │   key ring)          │   │ key ring           validators       │   │ request id      │
//!   │ MySQL (orders)       │   │ query services     user client      │   │ https redirect  │
//!   │ RabbitMQ (events)    │   │ publisher/subscriber  job runner    │   │ authorization   │
//!   └──────────────────────┘   │ chat hub           metrics          │   │ /api /chat      │
//!                              └─────────────────────────────────────┘   │ /metrics /health│
//!                                                                        │ /hangfire /cap  │
//!                                                                        └─────────────────┘
//! ```

// Composition
pub mod bootstrap;
pub mod config;
pub mod http;

// Application
pub mod application;
pub mod clients;
pub mod domain;
pub mod mediator;

// Infrastructure
pub mod cache;
pub mod jobs;
pub mod messaging;
pub mod persistence;

// Real-time and probes
pub mod health;
pub mod hub;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use bootstrap::{AppServices, ApplicationBuilder, Host, StartupError};
pub use config::AppConfig;
pub use lifecycle::Shutdown;
