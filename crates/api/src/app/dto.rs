use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::{ProductId, Quantity, WarehouseId};
use stockwise_infra::services::{ReceivedLine, ReserveStock};
use stockwise_inventory::StockKey;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ReserveLineRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    #[serde(default)]
    pub batch: Option<String>,
    pub quantity: Quantity,
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub lines: Vec<ReserveLineRequest>,
    #[serde(default)]
    pub ttl_secs: Option<i64>,
    #[serde(default)]
    pub reference: Option<String>,
}

impl From<ReserveRequest> for ReserveStock {
    fn from(body: ReserveRequest) -> Self {
        ReserveStock {
            lines: body
                .lines
                .into_iter()
                .map(|l| {
                    let key = StockKey {
                        product_id: l.product_id,
                        warehouse_id: l.warehouse_id,
                        batch: l.batch,
                    };
                    (key, l.quantity)
                })
                .collect(),
            ttl_secs: body.ttl_secs,
            reference: body.reference,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReleaseRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// One shipped quantity per reservation line, in line order.
#[derive(Debug, Deserialize)]
pub struct FulfillRequest {
    pub quantities: Vec<Quantity>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShipRequest {
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveTransferRequest {
    pub lines: Vec<ReceivedLine>,
}

#[derive(Debug, Deserialize)]
pub struct ReverseEntryRequest {
    pub reason: String,
}

// -------------------------
// Query DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct StockItemsQuery {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
}

#[derive(Debug, Deserialize)]
pub struct LayersQuery {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery<S> {
    pub status: Option<S>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrialBalanceQuery {
    pub as_of: Option<DateTime<Utc>>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub tenant_id: String,
    pub principal_id: String,
    pub roles: Vec<String>,
}
