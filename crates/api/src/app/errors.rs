//! Response envelope: `{ "success": true, "data": .. }` on success and
//! `{ "success": false, "error": { "code", "message" } }` on failure.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use stockwise_infra::{ErrorKind, ServiceError, ServiceResult, Services};

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::BusinessRule | ErrorKind::Fatal => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn service_error_to_response(err: ServiceError) -> Response {
    let status = status_for(err.kind());
    if status.is_server_error() {
        tracing::error!(error = %err, code = err.code(), "request failed");
        // Store details stay in the log.
        return json_error(status, err.code(), "internal error");
    }
    tracing::debug!(error = %err, code = err.code(), "request rejected");
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": { "code": code, "message": message.into() },
        })),
    )
        .into_response()
}

pub fn json_ok<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, axum::Json(json!({ "success": true, "data": data }))).into_response()
}

/// Envelope a service result.
pub fn respond<T: Serialize>(status: StatusCode, result: ServiceResult<T>) -> Response {
    match result {
        Ok(data) => json_ok(status, data),
        Err(e) => service_error_to_response(e),
    }
}

/// Run a service call on the blocking pool, since row locks are waited on
/// synchronously, and envelope its result.
pub async fn respond_blocking<T, F>(status: StatusCode, services: Arc<Services>, call: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&Services) -> ServiceResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || call(&services)).await {
        Ok(result) => respond(status, result),
        Err(err) => {
            tracing::error!(error = %err, "service call did not finish");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

/// Parse a path identifier, answering 400 when it is malformed.
pub fn parse_id<T: core::str::FromStr>(raw: &str) -> Result<T, Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid id '{raw}'")))
}
