//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP handlers, one file per area
//! - `dto.rs`: request/query/response shapes that differ from the service inputs
//! - `errors.rs`: the response envelope and error mapping

use std::sync::Arc;

use axum::{Extension, Router, http::StatusCode, response::Response, routing::get};
use tower::ServiceBuilder;

use stockwise_auth::{Hs256JwtValidator, JwtValidator};
use stockwise_infra::Services;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// HS256-authenticated router; the form `main` serves.
pub fn build_app(jwt_secret: &str, services: Arc<Services>) -> Router {
    let jwt = Hs256JwtValidator::new(jwt_secret.as_bytes().to_vec());
    build_router(Arc::new(jwt), services)
}

pub fn build_router(jwt: Arc<dyn JwtValidator>, services: Arc<Services>) -> Router {
    let tenant_scoped = routes::router()
        .layer(Extension(services))
        .route_layer(axum::middleware::from_fn_with_state(
            middleware::AuthState { jwt },
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(tenant_scoped)
        .fallback(not_found)
        .layer(ServiceBuilder::new())
}

async fn not_found() -> Response {
    errors::json_error(StatusCode::NOT_FOUND, "not_found", "no such route")
}
