//! Exception translation: every failure leaves the host as RFC 9457
//! `application/problem+json`.

use std::any::Any;
use std::collections::BTreeMap;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::clients::ClientError;
use crate::domain::OrderError;
use crate::lifecycle::panic_message;
use crate::messaging::EventBusError;
use crate::persistence::PersistenceError;

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Field name → messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("one or more validation errors occurred")]
    Validation(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("upstream service failed: {0}")]
    Upstream(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl ProblemDetails {
    pub fn new(status: StatusCode, detail: Option<String>) -> Self {
        Self {
            kind: format!("https://httpstatuses.io/{}", status.as_u16()),
            title: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            status: status.as_u16(),
            detail,
            errors: None,
        }
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PROBLEM_CONTENT_TYPE),
        );
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let problem = match self {
            Self::Validation(errors) => ProblemDetails {
                errors: Some(errors),
                ..ProblemDetails::new(status, Some("One or more validation errors occurred.".into()))
            },
            Self::Internal(message) => {
                tracing::error!(error = %message, "Unhandled error");
                ProblemDetails::new(status, Some("An unexpected error occurred.".into()))
            }
            Self::Upstream(message) | Self::Unavailable(message) => {
                tracing::warn!(status = status.as_u16(), error = %message, "Dependency failure");
                ProblemDetails::new(status, Some(message))
            }
            Self::BadRequest(message) | Self::NotFound(message) | Self::Conflict(message) => {
                ProblemDetails::new(status, Some(message))
            }
        };
        problem.into_response()
    }
}

/// Response for a panic caught by `CatchPanicLayer`.
///
/// The panic message is only exposed when `include_detail` is set
/// (development hosts).
pub fn panic_response(err: Box<dyn Any + Send + 'static>, include_detail: bool) -> Response {
    let message = panic_message(err.as_ref());
    tracing::error!(panic = %message, "Request handler panicked");

    let detail = if include_detail {
        message
    } else {
        "An unexpected error occurred.".to_string()
    };
    ProblemDetails::new(StatusCode::INTERNAL_SERVER_ERROR, Some(detail)).into_response()
}

impl From<PersistenceError> for AppError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Concurrency { .. } => Self::Conflict(e.to_string()),
            PersistenceError::NotFound { .. } => Self::NotFound(e.to_string()),
            PersistenceError::Database(sqlx::Error::PoolTimedOut) => {
                Self::Unavailable("database pool exhausted".into())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::AlreadyPaid(_) => Self::Conflict(e.to_string()),
            OrderError::InvalidName | OrderError::InvalidCount => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<ClientError> for AppError {
    fn from(e: ClientError) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl From<EventBusError> for AppError {
    fn from(e: EventBusError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        let errors = e
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|err| {
                        err.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("{field} is invalid ({})", err.code))
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        Self::Validation(errors)
    }
}
