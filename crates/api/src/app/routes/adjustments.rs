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
use stockwise_infra::services::NewAdjustment;
use stockwise_inventory::{AdjustmentId, AdjustmentStatus};

use crate::app::{dto, errors};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, service_context};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_adjustment))
        .route("/:id/history", get(history))
        .route("/:id/approve", post(approve))
        .route("/:id/reject", post(reject))
        .route("/:id/cancel", post(cancel))
}

pub async fn create(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewAdjustment>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_WRITE) {
        return denied;
    }
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::CREATED, services, move |s| {
        s.adjustments.create(&ctx, body)
    })
    .await
}

pub async fn list(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::StatusQuery<AdjustmentStatus>>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.adjustments.list(tenant.tenant_id(), query.status)
    })
    .await
}

pub async fn get_adjustment(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    let id: AdjustmentId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.adjustments.get(tenant.tenant_id(), id)
    })
    .await
}

pub async fn approve(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_APPROVE) {
        return denied;
    }
    let id: AdjustmentId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.adjustments.approve(&ctx, id)
    })
    .await
}

pub async fn reject(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RejectRequest>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_APPROVE) {
        return denied;
    }
    let id: AdjustmentId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.adjustments.reject(&ctx, id, body.reason)
    })
    .await
}

pub async fn cancel(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_WRITE) {
        return denied;
    }
    let id: AdjustmentId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.adjustments.cancel(&ctx, id)
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
    let id: AdjustmentId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let tenant_id = tenant.tenant_id();
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.adjustments
            .get(tenant_id, id)
            .and_then(|_| s.store.history(tenant_id, id.aggregate_id()))
    })
    .await
}
