use axum::{Router, routing::get};

pub mod adjustments;
pub mod journal;
pub mod reservations;
pub mod stock;
pub mod system;
pub mod transfers;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/stock", stock::router())
        .nest("/reservations", reservations::router())
        .nest("/adjustments", adjustments::router())
        .nest("/transfers", transfers::router())
        .nest("/journal", journal::router())
}
