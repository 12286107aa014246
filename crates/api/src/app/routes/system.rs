use axum::{Extension, http::StatusCode, response::Response};

use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> Response {
    errors::json_ok(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    errors::json_ok(
        StatusCode::OK,
        dto::WhoAmI {
            tenant_id: tenant.tenant_id().to_string(),
            principal_id: principal.principal_id().to_string(),
            roles: principal.roles().iter().map(|r| r.as_str().to_string()).collect(),
        },
    )
}
