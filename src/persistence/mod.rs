//! Persistence subsystem.
//!
//! # Data Flow
//! ```text
//! Command handler
//!     → OrderRepository (writes, each inside a UnitOfWork)
//!     → DbContext pool → MySQL
//!
//! Query handler
//!     → OrderQueryService (read-only, no transaction)
//!     → DbContext pool → MySQL
//! ```
//!
//! # Design Decisions
//! - Writes and reads go through separate traits so the read side can be
//!   pointed at a replica later without touching command handlers
//! - Optimistic concurrency: updates match on `version` and fail with
//!   [`PersistenceError::Concurrency`] when another writer got there first
//! - In-memory implementations back the same traits for tests and for hosts
//!   started without a database

pub mod context;
pub mod memory;
pub mod orders;
pub mod unit_of_work;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Order, OrderId};

pub use context::{should_ensure_schema, DbContext};
pub use memory::InMemoryOrderStore;
pub use orders::{MySqlOrderQueryService, MySqlOrderRepository};
pub use unit_of_work::UnitOfWork;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} {id} was modified concurrently")]
    Concurrency { entity: &'static str, id: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Write side of the `orders` aggregate.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn add(&self, order: &Order) -> Result<(), PersistenceError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, PersistenceError>;

    /// Persist changes; bumps `order.version` on success.
    async fn update(&self, order: &mut Order) -> Result<(), PersistenceError>;
}

/// One page of results plus the total row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Read side of the `orders` aggregate.
#[async_trait]
pub trait OrderQueryService: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, PersistenceError>;

    /// Newest first. `page` is 1-based.
    async fn list_orders(&self, page: u32, page_size: u32) -> Result<Page<Order>, PersistenceError>;
}

pub(crate) fn offset(page: u32, page_size: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(page_size)
}
