//! Stock adjustments: approval workflow and the one-time application of stock changes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stockwise_accounting::SourceEvent;
use stockwise_core::{
    Aggregate, DomainError, Money, Quantity, SourceDocument, TenantId, WarehouseId,
};
use stockwise_inventory::{
    AdjustmentCommand, AdjustmentEvent, AdjustmentId, AdjustmentLine, AdjustmentStatus,
    AdjustmentType, CreateAdjustment, LayerType, MovementType, StockAdjustment, StockKey,
};

use crate::error::ServiceResult;
use crate::store::{InMemoryStore, RowKey, Transaction, sequence};

use super::stock_ops::{issue_in, post_in, receive_in, stock_locks};
use super::{ServiceConfig, ServiceContext};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAdjustmentLine {
    pub key: StockKey,
    /// Signed: positive adds stock, negative removes it.
    pub quantity_difference: Quantity,
    /// Defaults to the stock item's current unit cost.
    #[serde(default)]
    pub unit_cost: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAdjustment {
    pub warehouse_id: WarehouseId,
    pub adjustment_type: AdjustmentType,
    pub reason: String,
    pub lines: Vec<NewAdjustmentLine>,
}

#[derive(Clone)]
pub struct AdjustmentService {
    store: Arc<InMemoryStore>,
    config: Arc<ServiceConfig>,
}

impl AdjustmentService {
    pub fn new(store: Arc<InMemoryStore>, config: Arc<ServiceConfig>) -> Self {
        Self { store, config }
    }

    /// Create an adjustment. When the approval policy lets it through, it is
    /// approved and applied in the same transaction.
    pub fn create(&self, ctx: &ServiceContext, input: NewAdjustment) -> ServiceResult<StockAdjustment> {
        let id = AdjustmentId::generate();
        let keys: Vec<StockKey> = input.lines.iter().map(|l| l.key.clone()).collect();
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock(locks_for(id, &keys))?;

        let mut lines = Vec::with_capacity(input.lines.len());
        for line in input.lines {
            let unit_cost = match line.unit_cost {
                Some(cost) => cost,
                None => tx
                    .stock_item(&line.key)?
                    .map(|item| item.unit_cost())
                    .unwrap_or(Money::ZERO),
            };
            lines.push(AdjustmentLine {
                key: line.key,
                quantity_difference: line.quantity_difference,
                unit_cost,
            });
        }

        let mut adjustment = StockAdjustment::empty(id);
        let mut events = adjustment.execute(&AdjustmentCommand::Create(CreateAdjustment {
            tenant_id: ctx.tenant_id,
            adjustment_id: id,
            number: tx.next_number(sequence::ADJUSTMENT)?,
            warehouse_id: input.warehouse_id,
            adjustment_type: input.adjustment_type,
            reason: input.reason,
            lines,
            policy: self.config.approval_policy.clone(),
            occurred_at: ctx.now,
            actor: ctx.actor,
        }))?;
        if adjustment.status() == AdjustmentStatus::Approved {
            events.extend(self.complete_in(&mut tx, ctx, &mut adjustment)?);
        }
        tx.save(adjustment.clone(), &events, ctx.actor)?;
        tx.commit()?;

        info!(
            tenant_id = %ctx.tenant_id,
            number = %adjustment.number(),
            total_value = %adjustment.total_value(),
            status = %adjustment.status(),
            "adjustment created"
        );
        Ok(adjustment)
    }

    /// PendingApproval → Approved → Completed, applying stock changes once.
    pub fn approve(&self, ctx: &ServiceContext, id: AdjustmentId) -> ServiceResult<StockAdjustment> {
        let mut tx = self.begin_locked(ctx.tenant_id, id)?;
        let mut adjustment = load(&tx, id)?;
        let mut events = adjustment.execute(&AdjustmentCommand::Approve {
            tenant_id: ctx.tenant_id,
            occurred_at: ctx.now,
            actor: ctx.actor,
        })?;
        events.extend(self.complete_in(&mut tx, ctx, &mut adjustment)?);
        tx.save(adjustment.clone(), &events, ctx.actor)?;
        tx.commit()?;

        info!(
            tenant_id = %ctx.tenant_id,
            number = %adjustment.number(),
            approved_by = ?ctx.actor,
            "adjustment approved"
        );
        Ok(adjustment)
    }

    pub fn reject(
        &self,
        ctx: &ServiceContext,
        id: AdjustmentId,
        reason: String,
    ) -> ServiceResult<StockAdjustment> {
        let adjustment = self.transition(
            ctx,
            id,
            AdjustmentCommand::Reject {
                tenant_id: ctx.tenant_id,
                reason,
                occurred_at: ctx.now,
                actor: ctx.actor,
            },
        )?;
        warn!(tenant_id = %ctx.tenant_id, number = %adjustment.number(), "adjustment rejected");
        Ok(adjustment)
    }

    pub fn cancel(&self, ctx: &ServiceContext, id: AdjustmentId) -> ServiceResult<StockAdjustment> {
        let adjustment = self.transition(
            ctx,
            id,
            AdjustmentCommand::Cancel {
                tenant_id: ctx.tenant_id,
                occurred_at: ctx.now,
                actor: ctx.actor,
            },
        )?;
        info!(tenant_id = %ctx.tenant_id, number = %adjustment.number(), "adjustment cancelled");
        Ok(adjustment)
    }

    pub fn get(&self, tenant_id: TenantId, id: AdjustmentId) -> ServiceResult<StockAdjustment> {
        self.store
            .read(tenant_id, |t| {
                t.document::<StockAdjustment>(id.aggregate_id()).cloned()
            })?
            .ok_or_else(|| DomainError::not_found(format!("adjustment {id}")).into())
    }

    pub fn list(
        &self,
        tenant_id: TenantId,
        status: Option<AdjustmentStatus>,
    ) -> ServiceResult<Vec<StockAdjustment>> {
        let mut found: Vec<StockAdjustment> = self.store.read(tenant_id, |t| {
            t.documents::<StockAdjustment>()
                .filter(|a| status.is_none_or(|s| a.status() == s))
                .cloned()
                .collect()
        })?;
        found.sort_by(|a, b| a.number().cmp(b.number()));
        Ok(found)
    }

    /// A state change that does not touch stock.
    fn transition(
        &self,
        ctx: &ServiceContext,
        id: AdjustmentId,
        command: AdjustmentCommand,
    ) -> ServiceResult<StockAdjustment> {
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock([RowKey::Document(id.aggregate_id())])?;
        let mut adjustment = load(&tx, id)?;
        let events = adjustment.execute(&command)?;
        tx.save(adjustment.clone(), &events, ctx.actor)?;
        tx.commit()?;
        Ok(adjustment)
    }

    fn begin_locked(&self, tenant_id: TenantId, id: AdjustmentId) -> ServiceResult<Transaction<'_>> {
        let keys: Vec<StockKey> = self
            .get(tenant_id, id)?
            .lines()
            .iter()
            .map(|l| l.key.clone())
            .collect();
        let mut tx = self.store.begin(tenant_id)?;
        tx.lock(locks_for(id, &keys))?;
        Ok(tx)
    }

    /// Apply the approved lines to stock and cost layers, post the net value
    /// and mark the adjustment Completed.
    fn complete_in(
        &self,
        tx: &mut Transaction<'_>,
        ctx: &ServiceContext,
        adjustment: &mut StockAdjustment,
    ) -> ServiceResult<Vec<AdjustmentEvent>> {
        let source = SourceDocument::new("ADJUSTMENT", adjustment.number())?;
        let mut net = Money::ZERO;
        for line in adjustment.lines() {
            if line.quantity_difference.is_positive() {
                receive_in(
                    tx,
                    ctx,
                    &line.key,
                    line.quantity_difference,
                    line.unit_cost,
                    LayerType::AdjustmentIn,
                    ctx.now,
                    &source,
                )?;
                net += line.unit_cost.times(line.quantity_difference);
            } else {
                let plan = issue_in(
                    tx,
                    ctx,
                    &self.config,
                    &line.key,
                    line.quantity_difference.abs(),
                    MovementType::AdjustmentOut,
                    &source,
                )?;
                net -= plan.total_cost;
            }
        }

        post_in(
            tx,
            ctx,
            &self.config,
            &SourceEvent::InventoryAdjusted {
                source,
                value: net,
            },
        )?;
        Ok(adjustment.execute(&AdjustmentCommand::Complete {
            tenant_id: ctx.tenant_id,
            occurred_at: ctx.now,
        })?)
    }
}

fn locks_for(id: AdjustmentId, keys: &[StockKey]) -> Vec<RowKey> {
    keys.iter()
        .flat_map(stock_locks)
        .chain([RowKey::Document(id.aggregate_id()), RowKey::Ledger])
        .collect()
}

fn load(tx: &Transaction<'_>, id: AdjustmentId) -> ServiceResult<StockAdjustment> {
    tx.load::<StockAdjustment>(id.aggregate_id())?
        .ok_or_else(|| DomainError::not_found(format!("adjustment {id}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::services::{ReceiveStock, Services};
    use rust_decimal_macros::dec;
    use stockwise_core::ProductId;

    fn stocked(qty: i64, cost: Money) -> (Services, ServiceContext, StockKey) {
        let svc = Services::new(&Settings::default());
        let ctx = ServiceContext::new(TenantId::new(), None);
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        svc.costing
            .receive(
                &ctx,
                ReceiveStock {
                    key: key.clone(),
                    quantity: Quantity::from(qty),
                    unit_cost: cost,
                    received_at: None,
                    source: SourceDocument::new("BILL", "B-1").unwrap(),
                },
            )
            .unwrap();
        (svc, ctx, key)
    }

    fn adjustment(key: &StockKey, kind: AdjustmentType, diff: i64, cost: Option<Money>) -> NewAdjustment {
        NewAdjustment {
            warehouse_id: key.warehouse_id,
            adjustment_type: kind,
            reason: "cycle count".into(),
            lines: vec![NewAdjustmentLine {
                key: key.clone(),
                quantity_difference: Quantity::from(diff),
                unit_cost: cost,
            }],
        }
    }

    #[test]
    fn small_adjustment_is_applied_immediately() {
        let (svc, ctx, key) = stocked(10, Money::new(dec!(5)));

        let adj = svc
            .adjustments
            .create(&ctx, adjustment(&key, AdjustmentType::Damage, -2, None))
            .unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::Completed);
        assert_eq!(adj.total_value(), Money::new(dec!(10)));

        let item = svc.costing.stock_item(ctx.tenant_id, &key).unwrap();
        assert_eq!(item.quantity_on_hand(), Quantity::from(8));

        let entries = svc.posting.entries(ctx.tenant_id, &Default::default()).unwrap();
        let posted = entries
            .iter()
            .find(|e| e.source.to_string() == format!("ADJUSTMENT:{}", adj.number()))
            .unwrap();
        assert_eq!(posted.lines[0].account.code, "5200");
        assert_eq!(posted.lines[0].debit, Money::new(dec!(10)));
    }

    #[test]
    fn large_adjustment_waits_for_approval_then_applies_once() {
        let (svc, ctx, key) = stocked(10, Money::new(dec!(5)));

        let adj = svc
            .adjustments
            .create(&ctx, adjustment(&key, AdjustmentType::Other, 50, Some(Money::new(dec!(100)))))
            .unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::PendingApproval);
        assert_eq!(adj.total_value(), Money::new(dec!(5000)));
        let item = svc.costing.stock_item(ctx.tenant_id, &key).unwrap();
        assert_eq!(item.quantity_on_hand(), Quantity::from(10));

        let approved = svc.adjustments.approve(&ctx, adj.id_typed()).unwrap();
        assert_eq!(approved.status(), AdjustmentStatus::Completed);
        let item = svc.costing.stock_item(ctx.tenant_id, &key).unwrap();
        assert_eq!(item.quantity_on_hand(), Quantity::from(60));

        let err = svc.adjustments.approve(&ctx, adj.id_typed()).unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
        let item = svc.costing.stock_item(ctx.tenant_id, &key).unwrap();
        assert_eq!(item.quantity_on_hand(), Quantity::from(60));
    }

    #[test]
    fn physical_counts_skip_approval_whatever_their_value() {
        let (svc, ctx, key) = stocked(10, Money::new(dec!(5)));
        let adj = svc
            .adjustments
            .create(
                &ctx,
                adjustment(&key, AdjustmentType::PhysicalCount, 50, Some(Money::new(dec!(100)))),
            )
            .unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::Completed);
    }

    #[test]
    fn failed_application_rolls_everything_back() {
        let (svc, ctx, key) = stocked(1, Money::new(dec!(500)));
        let adj = svc
            .adjustments
            .create(&ctx, adjustment(&key, AdjustmentType::Theft, -3, Some(Money::new(dec!(500)))))
            .unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::PendingApproval);

        let err = svc.adjustments.approve(&ctx, adj.id_typed()).unwrap_err();
        assert_eq!(err.code(), "insufficient_available_stock");
        assert_eq!(
            svc.adjustments.get(ctx.tenant_id, adj.id_typed()).unwrap().status(),
            AdjustmentStatus::PendingApproval
        );
        let item = svc.costing.stock_item(ctx.tenant_id, &key).unwrap();
        assert_eq!(item.quantity_on_hand(), Quantity::from(1));
    }

    #[test]
    fn rejected_adjustment_is_terminal() {
        let (svc, ctx, key) = stocked(10, Money::new(dec!(5)));
        let adj = svc
            .adjustments
            .create(&ctx, adjustment(&key, AdjustmentType::Other, 50, Some(Money::new(dec!(100)))))
            .unwrap();

        let rejected = svc
            .adjustments
            .reject(&ctx, adj.id_typed(), "count looks wrong".into())
            .unwrap();
        assert_eq!(rejected.status(), AdjustmentStatus::Rejected);
        assert_eq!(rejected.rejection_reason(), Some("count looks wrong"));

        for err in [
            svc.adjustments.approve(&ctx, adj.id_typed()).unwrap_err(),
            svc.adjustments.cancel(&ctx, adj.id_typed()).unwrap_err(),
        ] {
            assert_eq!(err.code(), "invalid_transition");
        }
    }

    #[test]
    fn missing_unit_cost_uses_current_item_cost() {
        let (svc, ctx, key) = stocked(10, Money::new(dec!(5)));
        let adj = svc
            .adjustments
            .create(&ctx, adjustment(&key, AdjustmentType::PhysicalCount, 2, None))
            .unwrap();
        assert_eq!(adj.lines()[0].unit_cost, Money::new(dec!(5)));
        assert_eq!(svc.adjustments.list(ctx.tenant_id, None).unwrap().len(), 1);
    }
}
