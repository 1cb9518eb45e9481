//! Domain model.
//!
//! Only the sample `orders` aggregate lives here; it exists so the pipeline
//! (mediator, unit of work, integration events) has something real to carry.

pub mod ids;
pub mod order;

pub use order::{Order, OrderError, OrderEvent, OrderId};
