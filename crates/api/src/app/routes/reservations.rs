use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};

use stockwise_auth::Permission;
use stockwise_infra::Services;
use stockwise_inventory::{ReservationId, ReservationStatus};

use crate::app::{dto, errors};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, service_context};

pub fn router() -> Router {
    Router::new()
        .route("/", post(reserve).get(list))
        .route("/:id", get(get_reservation))
        .route("/:id/history", get(history))
        .route("/:id/release", post(release))
        .route("/:id/fulfill", post(fulfill))
}

pub async fn reserve(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::ReserveRequest>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_WRITE) {
        return denied;
    }
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::CREATED, services, move |s| {
        s.reservations.reserve(&ctx, body.into())
    })
    .await
}

pub async fn list(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::StatusQuery<ReservationStatus>>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.reservations.list(tenant.tenant_id(), query.status)
    })
    .await
}

pub async fn get_reservation(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    let id: ReservationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.reservations.get(tenant.tenant_id(), id)
    })
    .await
}

pub async fn release(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReleaseRequest>>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_WRITE) {
        return denied;
    }
    let id: ReservationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.reservations.release(&ctx, id, body.reason)
    })
    .await
}

pub async fn fulfill(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::FulfillRequest>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_WRITE) {
        return denied;
    }
    let id: ReservationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.reservations.fulfill(&ctx, id, body.quantities)
    })
    .await
}

/// Audit trail of the document, oldest event first.
pub async fn history(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    let id: ReservationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let tenant_id = tenant.tenant_id();
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.reservations
            .get(tenant_id, id)
            .and_then(|_| s.store.history(tenant_id, id.aggregate_id()))
    })
    .await
}
