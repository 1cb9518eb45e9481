//! JSON controllers under `/api`.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::application::dto::{CreatedOrder, OrderDto, PagedData};
use crate::application::orders::{CreateOrderCommand, GetOrderQuery, ListOrdersQuery, PayOrderCommand};
use crate::clients::{UserDto, UserId, UserServiceClient};
use crate::domain::OrderId;
use crate::http::error::{AppError, ProblemDetails};
use crate::mediator::Mediator;

#[derive(Clone)]
pub struct ApiState {
    pub mediator: Arc<Mediator>,
    pub users: UserServiceClient,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/orders", post(create_order).get(list_orders))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/pay", post(pay_order))
        .route("/api/users/{id}", get(get_user))
        .with_state(state)
}

/// Path ids go through `FromStr` so a malformed id is a problem+json 400.
fn parse_id<T: std::str::FromStr>(raw: &str) -> Result<T, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("'{raw}' is not a valid identifier")))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    tag = "orders",
    request_body = CreateOrderCommand,
    responses(
        (status = 201, description = "Order created", body = CreatedOrder),
        (status = 400, description = "Invalid order", body = ProblemDetails)
    )
)]
pub async fn create_order(
    State(state): State<ApiState>,
    body: Result<Json<CreateOrderCommand>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(command) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let id = state.mediator.send(command).await?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/orders/{id}"))],
        Json(CreatedOrder { id }),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/api/orders",
    tag = "orders",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Newest orders first", body = PagedData<OrderDto>),
        (status = 400, description = "Invalid paging", body = ProblemDetails)
    )
)]
pub async fn list_orders(
    State(state): State<ApiState>,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<PagedData<OrderDto>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    Ok(Json(state.mediator.send(query).await?))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = "orders",
    params(("id" = String, Path, format = Uuid, description = "Order id")),
    responses(
        (status = 200, description = "The order", body = OrderDto),
        (status = 404, description = "No such order", body = ProblemDetails)
    )
)]
pub async fn get_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<OrderDto>, AppError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.mediator.send(GetOrderQuery { id }).await?))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/pay",
    tag = "orders",
    params(("id" = String, Path, format = Uuid, description = "Order id")),
    responses(
        (status = 204, description = "Order paid"),
        (status = 404, description = "No such order", body = ProblemDetails),
        (status = 409, description = "Already paid", body = ProblemDetails)
    )
)]
pub async fn pay_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: OrderId = parse_id(&id)?;
    state.mediator.send(PayOrderCommand { id }).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = String, Path, format = Uuid, description = "User id")),
    responses(
        (status = 200, description = "The user", body = UserDto),
        (status = 404, description = "No such user", body = ProblemDetails),
        (status = 502, description = "User service failed", body = ProblemDetails)
    )
)]
pub async fn get_user(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<UserDto>, AppError> {
    let id: UserId = parse_id(&id)?;
    state
        .users
        .get_user(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::register_handlers;
    use crate::config::UserServiceConfig;
    use crate::messaging::{EventBus, InMemoryEventBus, IntegrationEventPublisher, MessageMonitor};
    use crate::persistence::InMemoryOrderStore;
    use crate::resilience::RetryPolicy;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = InMemoryOrderStore::new();
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let publisher = IntegrationEventPublisher::new(
            bus,
            Arc::new(MessageMonitor::new()),
            RetryPolicy::new(1, 1, 1),
            "test",
        );
        let mediator = register_handlers(
            Mediator::builder(),
            Arc::new(store.clone()),
            Arc::new(store),
            publisher,
        )
        .build();
        let users = UserServiceClient::new(&UserServiceConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
        })
        .unwrap();
        router(ApiState {
            mediator: Arc::new(mediator),
            users,
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if body.is_some() {
            request = request.header(header::CONTENT_TYPE, "application/json");
        }
        let request = request
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_create_then_fetch() {
        let app = app();
        let (status, created) =
            send(&app, "POST", "/api/orders", Some(r#"{"name":"tea","count":2}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, order) = send(&app, "GET", &format!("/api/orders/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["id"], id);
        assert_eq!(order["paid"], false);

        let (status, _) = send(&app, "POST", &format!("/api/orders/{id}/pay"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, list) = send(&app, "GET", "/api/orders?page=1&pageSize=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["total"], 1);
        assert_eq!(list["items"][0]["paid"], true);
    }

    #[tokio::test]
    async fn test_validation_problem() {
        let app = app();
        let (status, problem) =
            send(&app, "POST", "/api/orders", Some(r#"{"name":"","count":0}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(problem["status"], 400);
        assert!(problem["errors"]["count"].is_array());
    }

    #[tokio::test]
    async fn test_malformed_input_is_problem_json() {
        let app = app();
        let (status, problem) = send(&app, "GET", "/api/orders/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(problem["status"], 400);

        let (status, _) = send(&app, "POST", "/api/orders", Some("{")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_order_is_404() {
        let app = app();
        let (status, problem) =
            send(&app, "GET", &format!("/api/orders/{}", OrderId::new()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(problem["title"], "Not Found");
    }
}
