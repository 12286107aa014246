//! API-side authorization guard.
//!
//! Checked in each handler before the service call, so services and domain
//! crates stay auth-agnostic.

use axum::http::StatusCode;
use axum::response::Response;

use stockwise_auth::{AuthzError, Permission, authorize};

use crate::app::errors::json_error;
use crate::context::{PrincipalContext, TenantContext};

/// Check that the caller holds `required` in the request's tenant.
pub fn authorize_request(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    required: &Permission,
) -> Result<(), AuthzError> {
    if principal.principal().active_tenant_id != tenant.tenant_id() {
        return Err(AuthzError::TenantMismatch);
    }
    authorize(principal.principal(), required)
}

/// [`authorize_request`] mapped to a 403 response.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    required: &Permission,
) -> Result<(), Response> {
    authorize_request(tenant, principal, required)
        .map_err(|e| json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}
