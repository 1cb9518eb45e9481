//! OpenAPI document and UI, served in development only.

use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::application::controllers;
use crate::application::dto::{CreatedOrder, OrderDto};
use crate::application::orders::CreateOrderCommand;
use crate::clients::UserDto;
use crate::http::error::ProblemDetails;

pub const DOCUMENT_PATH: &str = "/swagger/v1/swagger.json";

#[derive(OpenApi)]
#[openapi(
    info(title = "service-host", version = "v1"),
    paths(
        controllers::create_order,
        controllers::list_orders,
        controllers::get_order,
        controllers::pay_order,
        controllers::get_user,
    ),
    components(schemas(CreateOrderCommand, CreatedOrder, OrderDto, UserDto, ProblemDetails)),
    tags(
        (name = "orders", description = "Sample orders module"),
        (name = "users", description = "Remote user service")
    )
)]
pub struct ApiDoc;

pub fn router() -> Router {
    Router::new()
        .route(DOCUMENT_PATH, get(|| async { Json(ApiDoc::openapi()) }))
        .route("/swagger", get(|| async { Html(SWAGGER_HTML) }))
}

const SWAGGER_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>service-host API</title>
<link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
<div id="swagger-ui"></div>
<script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
<script>
window.ui = SwaggerUIBundle({ url: '/swagger/v1/swagger.json', dom_id: '#swagger-ui' });
</script>
</body>
</html>
"#;
