//! Application services.
//!
//! Each public method owns exactly one transaction: it takes every row lock it
//! needs up front, runs the pure domain decisions, stages stock, cost layer,
//! journal and audit writes, and commits them together. Any error drops the
//! transaction, so nothing a failed call did is ever visible.

pub mod adjustments;
pub mod costing;
pub mod posting;
pub mod reservations;
pub mod transfers;

mod stock_ops;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use stockwise_accounting::PostingRules;
use stockwise_core::{TenantId, UserId};
use stockwise_inventory::{ApprovalPolicy, ValuationMethod};

use crate::config::Settings;
use crate::store::InMemoryStore;

pub use adjustments::{AdjustmentService, NewAdjustment, NewAdjustmentLine};
pub use costing::{
    AllocateLandedCost, CostingService, IssueStock, ReceiveStock, StockIssue, StockReceipt,
    ValuationReport, ValuationRow,
};
pub use posting::{EntryFilter, PostingService};
pub use reservations::{
    FulfilledReservation, ReservationService, ReserveStock, SweepFailure, SweepReport,
};
pub use transfers::{NewTransfer, NewTransferLine, ReceivedLine, TransferService};

/// Tenant-level policy shared by every service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub valuation_method: ValuationMethod,
    pub approval_policy: ApprovalPolicy,
    /// `None` when the configured TTL is out of range; reservations without an
    /// explicit TTL are then refused.
    pub reservation_ttl: Option<chrono::Duration>,
    pub currency_scale: u32,
    pub posting_rules: PostingRules,
}

impl ServiceConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            valuation_method: settings.inventory.valuation_method,
            approval_policy: settings.inventory.approval_policy(),
            reservation_ttl: settings.inventory.reservation_ttl(),
            currency_scale: settings.accounting.currency_scale,
            posting_rules: PostingRules::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Who is acting, for which tenant, and at what instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceContext {
    pub tenant_id: TenantId,
    pub actor: Option<UserId>,
    pub now: DateTime<Utc>,
}

impl ServiceContext {
    pub fn new(tenant_id: TenantId, actor: Option<UserId>) -> Self {
        Self {
            tenant_id,
            actor,
            now: Utc::now(),
        }
    }

    /// System context (no user), used by background jobs.
    pub fn system(tenant_id: TenantId) -> Self {
        Self::new(tenant_id, None)
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// All services over one shared store.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<InMemoryStore>,
    pub config: Arc<ServiceConfig>,
    pub costing: CostingService,
    pub reservations: ReservationService,
    pub adjustments: AdjustmentService,
    pub transfers: TransferService,
    pub posting: PostingService,
}

impl Services {
    pub fn new(settings: &Settings) -> Self {
        Self::with_store(
            Arc::new(InMemoryStore::new(settings.inventory.lock_timeout())),
            Arc::new(ServiceConfig::from_settings(settings)),
        )
    }

    pub fn with_store(store: Arc<InMemoryStore>, config: Arc<ServiceConfig>) -> Self {
        Self {
            costing: CostingService::new(store.clone(), config.clone()),
            reservations: ReservationService::new(store.clone(), config.clone()),
            adjustments: AdjustmentService::new(store.clone(), config.clone()),
            transfers: TransferService::new(store.clone(), config.clone()),
            posting: PostingService::new(store.clone(), config.clone()),
            store,
            config,
        }
    }
}
