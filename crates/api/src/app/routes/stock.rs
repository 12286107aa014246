use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};

use stockwise_auth::Permission;
use stockwise_infra::Services;
use stockwise_infra::services::{AllocateLandedCost, IssueStock, ReceiveStock};

use crate::app::{dto, errors};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, service_context};

pub fn router() -> Router {
    Router::new()
        .route("/receipts", post(receive))
        .route("/issues", post(issue))
        .route("/items", get(list_items))
        .route("/layers", get(list_layers))
        .route("/valuation", get(valuation))
        .route("/integrity", get(integrity))
        .route("/landed-costs", post(allocate_landed_cost).get(list_landed_costs))
}

pub async fn receive(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ReceiveStock>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_WRITE) {
        return denied;
    }
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::CREATED, services, move |s| {
        s.costing.receive(&ctx, body)
    })
    .await
}

pub async fn issue(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<IssueStock>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_WRITE) {
        return denied;
    }
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::CREATED, services, move |s| {
        s.costing.issue(&ctx, body)
    })
    .await
}

pub async fn list_items(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::StockItemsQuery>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.costing
            .stock_items(tenant.tenant_id(), query.product_id, query.warehouse_id)
    })
    .await
}

pub async fn list_layers(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::LayersQuery>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.costing
            .cost_layers(tenant.tenant_id(), query.product_id, query.warehouse_id)
    })
    .await
}

pub async fn valuation(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.costing.valuation(tenant.tenant_id())
    })
    .await
}

pub async fn integrity(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.costing.validate_integrity(tenant.tenant_id())
    })
    .await
}

pub async fn allocate_landed_cost(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<AllocateLandedCost>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_WRITE) {
        return denied;
    }
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::CREATED, services, move |s| {
        s.costing.allocate_landed_cost(&ctx, body)
    })
    .await
}

pub async fn list_landed_costs(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::INVENTORY_READ) {
        return denied;
    }
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.costing.landed_costs(tenant.tenant_id())
    })
    .await
}
