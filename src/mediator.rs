//! In-process request dispatch.
//!
//! Controllers build a request value and hand it to [`Mediator::send`]; the
//! mediator finds the single handler registered for that request type and runs
//! it behind two behaviours:
//!
//! ```text
//! send(request)
//!     → validation behaviour (validator::Validate, 400 with field errors)
//!     → logging behaviour    (span + elapsed time)
//!     → RequestHandler<R>::handle
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::Instrument;
use validator::Validate;

use crate::http::error::AppError;

/// A command or query.
pub trait Request: Validate + Send + Sync + 'static {
    type Response: Send + 'static;
}

#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    async fn handle(&self, request: R) -> Result<R::Response, AppError>;
}

/// Registers handlers at startup.
#[derive(Default)]
pub struct MediatorBuilder {
    handlers: HashMap<TypeId, (&'static str, Box<dyn Any + Send + Sync>)>,
}

impl MediatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `R`, replacing any earlier one.
    pub fn register<R, H>(mut self, handler: H) -> Self
    where
        R: Request,
        H: RequestHandler<R>,
    {
        let handler: Arc<dyn RequestHandler<R>> = Arc::new(handler);
        let name = short_type_name::<R>();
        if self
            .handlers
            .insert(TypeId::of::<R>(), (name, Box::new(handler)))
            .is_some()
        {
            tracing::warn!(request = name, "Replaced previously registered handler");
        }
        self
    }

    pub fn build(self) -> Mediator {
        let mut registered: Vec<&str> = self.handlers.values().map(|(name, _)| *name).collect();
        registered.sort_unstable();
        tracing::debug!(handlers = ?registered, "Mediator built");
        Mediator {
            handlers: self
                .handlers
                .into_iter()
                .map(|(id, (_, handler))| (id, handler))
                .collect(),
        }
    }
}

/// Immutable request → handler table.
pub struct Mediator {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Mediator {
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    pub fn handles<R: Request>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<R>())
    }

    pub async fn send<R: Request>(&self, request: R) -> Result<R::Response, AppError> {
        let name = short_type_name::<R>();
        let handler = self
            .handlers
            .get(&TypeId::of::<R>())
            .and_then(|h| h.downcast_ref::<Arc<dyn RequestHandler<R>>>())
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("no handler registered for {name}")))?;

        validation_behaviour(name, &request)?;
        logging_behaviour(name, handler.handle(request)).await
    }
}

fn validation_behaviour<R: Request>(name: &'static str, request: &R) -> Result<(), AppError> {
    request.validate().map_err(|errors| {
        tracing::debug!(request = name, %errors, "Request failed validation");
        AppError::from(errors)
    })
}

async fn logging_behaviour<T, F>(name: &'static str, handler: F) -> Result<T, AppError>
where
    F: std::future::Future<Output = Result<T, AppError>>,
{
    let start = Instant::now();
    let result = handler
        .instrument(tracing::debug_span!("request", request = name))
        .await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => tracing::debug!(request = name, elapsed_ms, "Handled request"),
        Err(e) => tracing::debug!(request = name, elapsed_ms, error = %e, "Request failed"),
    }
    result
}

/// Last path segment of a type name, for logs.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
