//! The unit of background work.

use std::future::Future;

use async_trait::async_trait;
use uuid::Uuid;

use crate::lifecycle::BoxError;

/// Passed to every execution.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    /// 1-based.
    pub attempt: u32,
    /// Set when the execution was started by a recurring schedule.
    pub recurring_id: Option<String>,
}

/// Background work. Executions may be retried, so `execute` must be safe to
/// run more than once.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn execute(&self, ctx: JobContext) -> Result<(), BoxError>;
}

/// Adapts an async closure into a [`Job`].
pub struct FnJob<F> {
    name: String,
    f: F,
}

impl<F> FnJob<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: JobContext) -> Result<(), BoxError> {
        (self.f)(ctx).await
    }
}
