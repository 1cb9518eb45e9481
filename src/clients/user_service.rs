//! Typed client for the remote user service.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

use crate::config::UserServiceConfig;
use crate::observability::metrics;
use crate::strongly_typed_id;

strongly_typed_id!(
    /// Identifier of a user owned by the user service.
    UserId
);

const CLIENT_NAME: &str = "user-service";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    #[schema(value_type = String, format = Uuid)]
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid user service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("user service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("user service returned {0}")]
    Status(StatusCode),
}

/// HTTP client bound to `user_service.base_url`.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone, Debug)]
pub struct UserServiceClient {
    http: reqwest::Client,
    base_url: Url,
}

impl UserServiceClient {
    pub fn new(config: &UserServiceConfig) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(&config.base_url)?;
        // Keep any path prefix when joining relative paths.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch a user. `Ok(None)` when the service answers 404.
    pub async fn get_user(&self, id: UserId) -> Result<Option<UserDto>, ClientError> {
        let url = self.base_url.join(&format!("api/users/{id}"))?;
        let start = Instant::now();

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_client_request(CLIENT_NAME, None, start);
                tracing::warn!(user_id = %id, error = %e, "User service unreachable");
                return Err(e.into());
            }
        };

        let status = response.status();
        metrics::record_client_request(CLIENT_NAME, Some(status.as_u16()), start);

        match status {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.json::<UserDto>().await?)),
            s => {
                tracing::warn!(user_id = %id, status = s.as_u16(), "User service returned an error");
                Err(ClientError::Status(s))
            }
        }
    }
}
