use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};

use stockwise_accounting::{JournalEntryId, SourceEvent};
use stockwise_auth::Permission;
use stockwise_infra::Services;
use stockwise_infra::services::EntryFilter;

use crate::app::{dto, errors};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, service_context};

pub fn router() -> Router {
    Router::new()
        .route("/entries", post(post_entry).get(list_entries))
        .route("/entries/:id", get(get_entry))
        .route("/entries/:id/reverse", post(reverse_entry))
        .route("/trial-balance", get(trial_balance))
        .route("/accounts", get(accounts))
}

/// Post a manual entry or the entry for an external business event.
pub async fn post_entry(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<SourceEvent>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::ACCOUNTING_POST) {
        return denied;
    }
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::CREATED, services, move |s| {
        s.posting.post(&ctx, body)
    })
    .await
}

pub async fn list_entries(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(filter): Query<EntryFilter>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::ACCOUNTING_READ) {
        return denied;
    }
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.posting.entries(tenant.tenant_id(), &filter)
    })
    .await
}

pub async fn get_entry(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::ACCOUNTING_READ) {
        return denied;
    }
    let id: JournalEntryId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.posting.entry(tenant.tenant_id(), id)
    })
    .await
}

pub async fn reverse_entry(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReverseEntryRequest>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::ACCOUNTING_POST) {
        return denied;
    }
    let id: JournalEntryId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = service_context(&tenant, &principal);
    errors::respond_blocking(StatusCode::CREATED, services, move |s| {
        s.posting.reverse(&ctx, id, body.reason)
    })
    .await
}

pub async fn trial_balance(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::TrialBalanceQuery>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::ACCOUNTING_READ) {
        return denied;
    }
    errors::respond_blocking(StatusCode::OK, services, move |s| {
        s.posting.trial_balance(tenant.tenant_id(), query.as_of)
    })
    .await
}

pub async fn accounts(
    Extension(services): Extension<Arc<Services>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(denied) = authz::require(&tenant, &principal, &Permission::ACCOUNTING_READ) {
        return denied;
    }
    errors::json_ok(StatusCode::OK, services.posting.chart_of_accounts())
}
