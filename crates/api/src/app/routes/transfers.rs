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
use stockwise_infra::services::NewTransfer;
use stockwise_inventory::{TransferId, TransferStatus};

use crate::app::{dto, errors};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, service_context};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_transfer))
        .route("/:id/history", get(history))
        .route("/:id/approve", post(approve))
        .route("/:id/reject", post(reject))
        .route("/:id/ship", post(ship))
        .route("/:id/receive", post(receive))
        .route("/:id/cancel", post(cancel))
}

fn transfer_id(raw: &str) -> Result<TransferId, Response> {
    errors::parse_id(raw)
}

pub async fn create(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewTransfer>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_WRITE) {
        return denied;
    }
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::CREATED, services, move |s| {
        s.transfers.create(&ctx, body)
    })
    .await
}

pub async fn list(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::StatusQuery<TransferStatus>>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.transfers.list(tenant.tenant_id(), query.status)
    })
    .await
}

pub async fn get_transfer(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    match transfer_id(&id) {
        Ok(id) => {
            errors::respond_blocking(StatusCode::OK, services, move |s| {
                s.transfers.get(tenant.tenant_id(), id)
            })
            .await
        }
        Err(resp) => resp,
    }
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
    let ctx = service_context(&tenant, &principal);
    match transfer_id(&id) {
        Ok(id) => {
            errors::respond_blocking(StatusCode::OK, services, move |s| {
                s.transfers.approve(&ctx, id)
            })
            .await
        }
        Err(resp) => resp,
    }
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
    let ctx = service_context(&tenant, &principal);
    match transfer_id(&id) {
        Ok(id) => {
            errors::respond_blocking(StatusCode::OK, services, move |s| {
                s.transfers.reject(&ctx, id, body.reason)
            })
            .await
        }
        Err(resp) => resp,
    }
}

pub async fn ship(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ShipRequest>>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_WRITE) {
        return denied;
    }
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let ctx = service_context(&tenant, &principal);
    match transfer_id(&id) {
        Ok(id) => {
            errors::respond_blocking(StatusCode::OK, services, move |s| {
                s.transfers.ship(&ctx, id, body.carrier, body.tracking_number)
            })
            .await
        }
        Err(resp) => resp,
    }
}

pub async fn receive(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReceiveTransferRequest>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_WRITE) {
        return denied;
    }
    let ctx = service_context(&tenant, &principal);
    match transfer_id(&id) {
        Ok(id) => {
            errors::respond_blocking(StatusCode::OK, services, move |s| {
                s.transfers.receive(&ctx, id, body.lines)
            })
            .await
        }
        Err(resp) => resp,
    }
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
    let ctx = service_context(&tenant, &principal);
    match transfer_id(&id) {
        Ok(id) => {
            errors::respond_blocking(StatusCode::OK, services, move |s| {
                s.transfers.cancel(&ctx, id)
            })
            .await
        }
        Err(resp) => resp,
    }
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
    let id: TransferId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let tenant_id = tenant.tenant_id();
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.transfers
            .get(tenant_id, id)
            .and_then(|_| s.store.history(tenant_id, id.aggregate_id()))
    })
    .await
}
