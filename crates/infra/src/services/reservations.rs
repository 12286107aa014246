//! Stock reservations: reserve, release, fulfil and the expiry sweep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stockwise_accounting::{JournalEntry, SourceEvent};
use stockwise_core::{Aggregate, DomainError, Money, Quantity, SourceDocument, TenantId};
use stockwise_inventory::{
    CreateReservation, MovementType, ReservationCommand, ReservationId, ReservationStatus,
    StockKey, StockMovement, StockReservation,
};

use crate::error::ServiceResult;
use crate::store::{InMemoryStore, RowKey, Transaction, sequence};

use super::stock_ops::{consume_in, post_in};
use super::{ServiceConfig, ServiceContext};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub lines: Vec<(StockKey, Quantity)>,
    /// Falls back to the configured reservation TTL.
    #[serde(default)]
    pub ttl_secs: Option<i64>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FulfilledReservation {
    pub reservation: StockReservation,
    pub cost: Money,
    pub journal_entry: Option<JournalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub reservation_id: ReservationId,
    pub code: &'static str,
    pub message: String,
}

/// Outcome of one expiry sweep over a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: Vec<String>,
    pub failed: Vec<SweepFailure>,
}

#[derive(Clone)]
pub struct ReservationService {
    store: Arc<InMemoryStore>,
    config: Arc<ServiceConfig>,
}

impl ReservationService {
    pub fn new(store: Arc<InMemoryStore>, config: Arc<ServiceConfig>) -> Self {
        Self { store, config }
    }

    /// Hold stock for every line, or for none of them.
    pub fn reserve(&self, ctx: &ServiceContext, input: ReserveStock) -> ServiceResult<StockReservation> {
        let ttl = match input.ttl_secs {
            Some(secs) if secs <= 0 => {
                return Err(DomainError::validation("reservation TTL must be positive").into());
            }
            Some(secs) => chrono::Duration::try_seconds(secs),
            None => self.config.reservation_ttl,
        };
        let expires_at = ttl
            .and_then(|ttl| ctx.now.checked_add_signed(ttl))
            .ok_or_else(|| DomainError::validation("reservation TTL out of range"))?;

        let id = ReservationId::generate();
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock(
            input
                .lines
                .iter()
                .map(|(key, _)| RowKey::StockItem(key.clone()))
                .chain([RowKey::Document(id.aggregate_id())]),
        )?;

        let mut reservation = StockReservation::empty(id);
        let events = reservation.execute(&ReservationCommand::Create(CreateReservation {
            tenant_id: ctx.tenant_id,
            reservation_id: id,
            number: tx.next_number(sequence::RESERVATION)?,
            reference: input.reference,
            lines: input.lines,
            expires_at,
            occurred_at: ctx.now,
            actor: ctx.actor,
        }))?;

        let source = source_of(&reservation)?;
        for line in reservation.lines() {
            let mut item = tx.stock_item(&line.key)?.ok_or_else(|| {
                DomainError::insufficient_available(line.quantity.value(), Decimal::ZERO)
            })?;
            item.reserve(line.quantity, ctx.now)?;
            tx.put_stock_item(item)?;
            tx.record_movement(
                StockMovement::new(
                    line.key.clone(),
                    MovementType::Reservation,
                    line.quantity,
                    source.clone(),
                    ctx.now,
                )
                .by(ctx.actor),
            );
        }
        tx.save(reservation.clone(), &events, ctx.actor)?;
        tx.commit()?;

        info!(
            tenant_id = %ctx.tenant_id,
            number = %reservation.number(),
            lines = reservation.lines().len(),
            expires_at = %reservation.expires_at(),
            "stock reserved"
        );
        Ok(reservation)
    }

    pub fn reserve_one(
        &self,
        ctx: &ServiceContext,
        key: StockKey,
        quantity: Quantity,
        ttl_secs: Option<i64>,
    ) -> ServiceResult<StockReservation> {
        self.reserve(
            ctx,
            ReserveStock {
                lines: vec![(key, quantity)],
                ttl_secs,
                reference: None,
            },
        )
    }

    /// Active → Released; the reserved quantity becomes available again.
    pub fn release(
        &self,
        ctx: &ServiceContext,
        id: ReservationId,
        reason: Option<String>,
    ) -> ServiceResult<StockReservation> {
        let mut tx = self.begin_locked(ctx.tenant_id, id, false)?;
        let mut reservation = load(&tx, id)?;
        let events = reservation.execute(&ReservationCommand::Release {
            tenant_id: ctx.tenant_id,
            reason,
            occurred_at: ctx.now,
            actor: ctx.actor,
        })?;
        release_lines(&mut tx, ctx, &reservation)?;
        tx.save(reservation.clone(), &events, ctx.actor)?;
        tx.commit()?;

        info!(tenant_id = %ctx.tenant_id, number = %reservation.number(), "reservation released");
        Ok(reservation)
    }

    /// Active → Fulfilled. Ships `quantities[i]` (at most the reserved
    /// quantity) for line `i`, costs it from the layers and posts COGS.
    pub fn fulfill(
        &self,
        ctx: &ServiceContext,
        id: ReservationId,
        quantities: Vec<Quantity>,
    ) -> ServiceResult<FulfilledReservation> {
        let mut tx = self.begin_locked(ctx.tenant_id, id, true)?;
        let mut reservation = load(&tx, id)?;
        let events = reservation.execute(&ReservationCommand::Fulfill {
            tenant_id: ctx.tenant_id,
            quantities,
            occurred_at: ctx.now,
            actor: ctx.actor,
        })?;

        let source = source_of(&reservation)?;
        let mut cost = Money::ZERO;
        for line in reservation.lines() {
            let mut item = tx.stock_item(&line.key)?.ok_or_else(|| {
                DomainError::invariant(format!("reserved stock item {} is missing", line.key))
            })?;
            item.fulfill(line.quantity, line.quantity_fulfilled, ctx.now, ctx.actor)?;
            tx.put_stock_item(item)?;
            if !line.quantity_fulfilled.is_positive() {
                continue;
            }
            let plan = consume_in(
                &mut tx,
                &self.config,
                line.key.product_id,
                line.key.warehouse_id,
                line.quantity_fulfilled,
                &source,
                ctx.now,
            )?;
            cost += plan.total_cost;
            tx.record_movement(
                StockMovement::new(
                    line.key.clone(),
                    MovementType::Fulfillment,
                    line.quantity_fulfilled,
                    source.clone(),
                    ctx.now,
                )
                .with_cost(plan.average_unit_cost())
                .by(ctx.actor),
            );
        }

        let journal_entry = post_in(
            &mut tx,
            ctx,
            &self.config,
            &SourceEvent::GoodsIssued {
                source: source.clone(),
                cost,
            },
        )?;
        tx.save(reservation.clone(), &events, ctx.actor)?;
        tx.commit()?;

        info!(
            tenant_id = %ctx.tenant_id,
            number = %reservation.number(),
            cost = %cost,
            "reservation fulfilled"
        );
        Ok(FulfilledReservation {
            reservation,
            cost,
            journal_entry,
        })
    }

    /// Expire every active reservation due at `now`, one transaction each.
    ///
    /// Running it again finds nothing to do. A reservation that fails is
    /// reported and left for the next sweep.
    pub fn expire_due(&self, tenant_id: TenantId, now: DateTime<Utc>) -> ServiceResult<SweepReport> {
        let due: Vec<ReservationId> = self.store.read(tenant_id, |t| {
            t.documents::<StockReservation>()
                .filter(|r| r.is_due(now))
                .map(StockReservation::id_typed)
                .collect()
        })?;

        let mut report = SweepReport::default();
        let ctx = ServiceContext::system(tenant_id).at(now);
        for id in due {
            match self.expire_one(&ctx, id) {
                Ok(Some(number)) => report.expired.push(number),
                Ok(None) => {}
                Err(err) => {
                    warn!(%tenant_id, reservation_id = %id, error = %err, "reservation expiry failed");
                    report.failed.push(SweepFailure {
                        reservation_id: id,
                        code: err.code(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if !report.expired.is_empty() || !report.failed.is_empty() {
            info!(
                %tenant_id,
                expired = report.expired.len(),
                failed = report.failed.len(),
                "reservation sweep finished"
            );
        }
        Ok(report)
    }

    fn expire_one(&self, ctx: &ServiceContext, id: ReservationId) -> ServiceResult<Option<String>> {
        let mut tx = self.begin_locked(ctx.tenant_id, id, false)?;
        let mut reservation = load(&tx, id)?;
        // Another sweep or a release may have got here first.
        if !reservation.is_due(ctx.now) {
            return Ok(None);
        }
        let events = reservation.execute(&ReservationCommand::Expire {
            tenant_id: ctx.tenant_id,
            now: ctx.now,
        })?;
        release_lines(&mut tx, ctx, &reservation)?;
        tx.save(reservation.clone(), &events, None)?;
        tx.commit()?;
        Ok(Some(reservation.number().to_string()))
    }

    pub fn get(&self, tenant_id: TenantId, id: ReservationId) -> ServiceResult<StockReservation> {
        self.store
            .read(tenant_id, |t| {
                t.document::<StockReservation>(id.aggregate_id()).cloned()
            })?
            .ok_or_else(|| DomainError::not_found(format!("reservation {id}")).into())
    }

    pub fn list(
        &self,
        tenant_id: TenantId,
        status: Option<ReservationStatus>,
    ) -> ServiceResult<Vec<StockReservation>> {
        let mut found: Vec<StockReservation> = self.store.read(tenant_id, |t| {
            t.documents::<StockReservation>()
                .filter(|r| status.is_none_or(|s| r.status() == s))
                .cloned()
                .collect()
        })?;
        found.sort_by(|a, b| a.number().cmp(b.number()));
        Ok(found)
    }

    /// Begin a transaction holding the reservation's document and stock item
    /// locks, plus cost layers and ledger when `costing`.
    fn begin_locked(
        &self,
        tenant_id: TenantId,
        id: ReservationId,
        costing: bool,
    ) -> ServiceResult<Transaction<'_>> {
        let reservation = self.get(tenant_id, id)?;
        let mut keys = vec![RowKey::Document(id.aggregate_id())];
        for line in reservation.lines() {
            keys.push(RowKey::StockItem(line.key.clone()));
            if costing {
                keys.push(RowKey::CostLayers(line.key.product_id, line.key.warehouse_id));
            }
        }
        if costing {
            keys.push(RowKey::Ledger);
        }
        let mut tx = self.store.begin(tenant_id)?;
        tx.lock(keys)?;
        Ok(tx)
    }
}

fn load(tx: &Transaction<'_>, id: ReservationId) -> ServiceResult<StockReservation> {
    tx.load::<StockReservation>(id.aggregate_id())?
        .ok_or_else(|| DomainError::not_found(format!("reservation {id}")).into())
}

fn source_of(reservation: &StockReservation) -> ServiceResult<SourceDocument> {
    Ok(SourceDocument::new("RESERVATION", reservation.number())?)
}

/// Give every line's reserved quantity back to its stock item.
fn release_lines(
    tx: &mut Transaction<'_>,
    ctx: &ServiceContext,
    reservation: &StockReservation,
) -> ServiceResult<()> {
    let source = source_of(reservation)?;
    for line in reservation.lines() {
        let mut item = tx.stock_item(&line.key)?.ok_or_else(|| {
            DomainError::invariant(format!("reserved stock item {} is missing", line.key))
        })?;
        item.release(line.quantity, ctx.now)?;
        tx.put_stock_item(item)?;
        tx.record_movement(
            StockMovement::new(
                line.key.clone(),
                MovementType::Release,
                line.quantity,
                source.clone(),
                ctx.now,
            )
            .by(ctx.actor),
        );
    }
    Ok(())
}
