//! Startup orchestration and the outermost failure boundary.
//!
//! # Responsibilities
//! - Run the build-and-serve future behind a single boundary
//! - Turn any error or panic into a fatal log record and a failure exit code
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The caller owns the log guard and drops it after this returns, so the
//!   fatal record is flushed on every exit path

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;

use futures_util::FutureExt;

/// Error type crossing the startup boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How the host ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Stopped,
    Failed,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Stopped => ExitCode::SUCCESS,
            Outcome::Failed => ExitCode::FAILURE,
        }
    }
}

/// Text of a caught panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}

/// Run the host, logging any failure as fatal.
pub async fn run_guarded<F, Fut>(service_name: &str, host: F) -> Outcome
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), BoxError>>,
{
    tracing::info!(service = %service_name, "Starting host");

    match AssertUnwindSafe(host()).catch_unwind().await {
        Ok(Ok(())) => {
            tracing::info!(service = %service_name, "Host stopped cleanly");
            Outcome::Stopped
        }
        Ok(Err(e)) => {
            tracing::error!(
                fatal = true,
                service = %service_name,
                error = %e,
                "Host terminated unexpectedly"
            );
            Outcome::Failed
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(
                fatal = true,
                service = %service_name,
                panic = %message,
                "Host terminated unexpectedly"
            );
            Outcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_exit_code() {
        let outcome = run_guarded("test", || async { Ok(()) }).await;
        assert_eq!(outcome, Outcome::Stopped);
    }

    #[tokio::test]
    async fn test_error_is_fatal() {
        let outcome =
            run_guarded("test", || async { Err::<(), BoxError>("redis unreachable".into()) }).await;
        assert_eq!(outcome, Outcome::Failed);
    }

    #[tokio::test]
    async fn test_panic_is_fatal() {
        let outcome = run_guarded("test", || async {
            if outcome_should_panic() {
                panic!("registration exploded");
            }
            Ok(())
        })
        .await;
        assert_eq!(outcome, Outcome::Failed);
    }

    fn outcome_should_panic() -> bool {
        true
    }
}
