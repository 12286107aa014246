//! Stock receipts and issues, cost layer consumption, landed cost and valuation.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use stockwise_accounting::{JournalEntry, SourceEvent};
use stockwise_core::{
    DomainError, Money, ProductId, Quantity, SourceDocument, TenantId, WarehouseId,
};
use stockwise_inventory::{
    AllocationMethod, ConsumptionPlan, CostLayer, CostLayerId, IntegrityIssue, LandedCost,
    LandedCostId, LayerType, MovementType, StockItem, StockKey, StockMovement,
    allocate_landed_cost, check_layer_integrity,
};

use crate::error::ServiceResult;
use crate::store::{InMemoryStore, RowKey, sequence};

use super::stock_ops::{consume_in, issue_in, post_in, receive_in, stock_locks};
use super::{ServiceConfig, ServiceContext};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub key: StockKey,
    pub quantity: Quantity,
    pub unit_cost: Money,
    /// Acquisition date of the new layer; defaults to now.
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    pub source: SourceDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockReceipt {
    pub item: StockItem,
    pub layer: CostLayer,
    pub journal_entry: Option<JournalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStock {
    pub key: StockKey,
    pub quantity: Quantity,
    pub source: SourceDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockIssue {
    pub item: StockItem,
    pub consumption: ConsumptionPlan,
    pub journal_entry: Option<JournalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateLandedCost {
    /// Freight bill, customs entry or similar. One allocation per reference.
    pub reference: String,
    pub amount: Money,
    pub layer_ids: Vec<CostLayerId>,
    pub method: AllocationMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuationRow {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity_on_hand: Quantity,
    pub quantity_reserved: Quantity,
    pub layer_quantity: Quantity,
    pub value: Money,
    pub average_unit_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuationReport {
    pub rows: Vec<ValuationRow>,
    pub total_quantity: Quantity,
    pub total_value: Money,
}

#[derive(Clone)]
pub struct CostingService {
    store: Arc<InMemoryStore>,
    config: Arc<ServiceConfig>,
}

impl CostingService {
    pub fn new(store: Arc<InMemoryStore>, config: Arc<ServiceConfig>) -> Self {
        Self { store, config }
    }

    /// Receive purchased stock: new layer, moving average, Dr Inventory / Cr AP.
    pub fn receive(&self, ctx: &ServiceContext, input: ReceiveStock) -> ServiceResult<StockReceipt> {
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock(stock_locks(&input.key).into_iter().chain([RowKey::Ledger]))?;

        let layer = receive_in(
            &mut tx,
            ctx,
            &input.key,
            input.quantity,
            input.unit_cost,
            LayerType::Purchase,
            input.received_at.unwrap_or(ctx.now),
            &input.source,
        )?;
        let journal_entry = post_in(
            &mut tx,
            ctx,
            &self.config,
            &SourceEvent::InventoryReceived {
                source: input.source.clone(),
                value: input.unit_cost.times(input.quantity),
            },
        )?;
        let item = tx
            .stock_item(&input.key)?
            .ok_or_else(|| DomainError::invariant(format!("{} vanished mid-receipt", input.key)))?;
        tx.commit()?;

        info!(
            tenant_id = %ctx.tenant_id,
            key = %input.key,
            quantity = %input.quantity,
            unit_cost = %input.unit_cost,
            source = %input.source,
            "stock received"
        );
        Ok(StockReceipt {
            item,
            layer,
            journal_entry,
        })
    }

    /// Issue unreserved stock, costed from the layers: Dr COGS / Cr Inventory.
    pub fn issue(&self, ctx: &ServiceContext, input: IssueStock) -> ServiceResult<StockIssue> {
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock(stock_locks(&input.key).into_iter().chain([RowKey::Ledger]))?;

        let consumption = issue_in(
            &mut tx,
            ctx,
            &self.config,
            &input.key,
            input.quantity,
            MovementType::Issue,
            &input.source,
        )?;
        let journal_entry = post_in(
            &mut tx,
            ctx,
            &self.config,
            &SourceEvent::GoodsIssued {
                source: input.source.clone(),
                cost: consumption.total_cost,
            },
        )?;
        let item = tx
            .stock_item(&input.key)?
            .ok_or_else(|| DomainError::invariant(format!("{} vanished mid-issue", input.key)))?;
        tx.commit()?;

        info!(
            tenant_id = %ctx.tenant_id,
            key = %input.key,
            quantity = %input.quantity,
            cost = %consumption.total_cost,
            source = %input.source,
            "stock issued"
        );
        Ok(StockIssue {
            item,
            consumption,
            journal_entry,
        })
    }

    /// Draw from the cost layers without touching stock quantities.
    pub fn consume(
        &self,
        ctx: &ServiceContext,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: Quantity,
        source: &SourceDocument,
    ) -> ServiceResult<ConsumptionPlan> {
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock([RowKey::CostLayers(product_id, warehouse_id)])?;
        let plan = consume_in(
            &mut tx,
            &self.config,
            product_id,
            warehouse_id,
            quantity,
            source,
            ctx.now,
        )?;
        tx.commit()?;
        Ok(plan)
    }

    /// Spread a landed cost over receipt layers: Dr Inventory / Cr AP.
    ///
    /// Re-running with the same reference fails with `DuplicatePosting`.
    pub fn allocate_landed_cost(
        &self,
        ctx: &ServiceContext,
        input: AllocateLandedCost,
    ) -> ServiceResult<LandedCost> {
        let source = SourceDocument::new("LANDED_COST", input.reference.clone())?;
        if input.layer_ids.is_empty() {
            return Err(DomainError::validation("landed cost needs at least one cost layer").into());
        }
        let mut seen = HashSet::new();
        if let Some(dup) = input.layer_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(DomainError::validation(format!("cost layer {dup} listed twice")).into());
        }

        let sets = self.store.read(ctx.tenant_id, |t| {
            input
                .layer_ids
                .iter()
                .map(|id| {
                    t.all_cost_layers()
                        .find(|l| l.id == *id)
                        .map(|l| (l.product_id, l.warehouse_id))
                        .ok_or_else(|| DomainError::not_found(format!("cost layer {id}")))
                })
                .collect::<Result<Vec<_>, _>>()
        })??;

        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock(
            sets.iter()
                .map(|(p, w)| RowKey::CostLayers(*p, *w))
                .chain([RowKey::Ledger]),
        )?;

        let mut tables: BTreeMap<(ProductId, WarehouseId), Vec<CostLayer>> = BTreeMap::new();
        for (p, w) in &sets {
            if !tables.contains_key(&(*p, *w)) {
                tables.insert((*p, *w), tx.cost_layers(*p, *w)?);
            }
        }
        let selected = input
            .layer_ids
            .iter()
            .zip(&sets)
            .map(|(id, set)| {
                tables[set]
                    .iter()
                    .find(|l| l.id == *id)
                    .cloned()
                    .ok_or_else(|| DomainError::not_found(format!("cost layer {id}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let allocations = allocate_landed_cost(
            input.amount,
            &selected,
            input.method,
            self.config.currency_scale,
        )?;
        for (allocation, set) in allocations.iter().zip(&sets) {
            if allocation.amount.is_zero() {
                continue;
            }
            if let Some(layer) = tables
                .get_mut(set)
                .and_then(|layers| layers.iter_mut().find(|l| l.id == allocation.layer_id))
            {
                layer.add_landed_cost(allocation.amount)?;
            }
        }
        for ((p, w), layers) in tables {
            tx.put_cost_layers(p, w, layers)?;
        }

        let landed_cost = LandedCost {
            id: LandedCostId::generate(),
            number: tx.next_number(sequence::LANDED_COST)?,
            source: source.clone(),
            amount: input.amount,
            method: input.method,
            allocations,
            allocated_at: ctx.now,
        };
        tx.record_landed_cost(landed_cost.clone());
        post_in(
            &mut tx,
            ctx,
            &self.config,
            &SourceEvent::LandedCostAllocated {
                source,
                amount: input.amount,
            },
        )?;
        tx.commit()?;

        info!(
            tenant_id = %ctx.tenant_id,
            number = %landed_cost.number,
            amount = %landed_cost.amount,
            layers = landed_cost.allocations.len(),
            "landed cost allocated"
        );
        Ok(landed_cost)
    }

    /// Drop an empty stock item (nothing on hand or reserved).
    pub fn purge_item(&self, ctx: &ServiceContext, key: &StockKey) -> ServiceResult<()> {
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock([RowKey::StockItem(key.clone())])?;
        let item = tx
            .stock_item(key)?
            .ok_or_else(|| DomainError::not_found(format!("stock item {key}")))?;
        if !item.can_purge() {
            return Err(DomainError::validation(format!(
                "stock item {key} still has {} on hand and {} reserved",
                item.quantity_on_hand(),
                item.quantity_reserved()
            ))
            .into());
        }
        tx.purge_stock_item(key)?;
        tx.commit()?;
        info!(tenant_id = %ctx.tenant_id, %key, "stock item purged");
        Ok(())
    }

    // --- queries ---------------------------------------------------------

    pub fn stock_item(&self, tenant_id: TenantId, key: &StockKey) -> ServiceResult<StockItem> {
        self.store
            .read(tenant_id, |t| t.stock_item(key).cloned())?
            .ok_or_else(|| DomainError::not_found(format!("stock item {key}")).into())
    }

    pub fn stock_items(
        &self,
        tenant_id: TenantId,
        product_id: Option<ProductId>,
        warehouse_id: Option<WarehouseId>,
    ) -> ServiceResult<Vec<StockItem>> {
        self.store.read(tenant_id, |t| {
            t.stock_items()
                .filter(|i| product_id.is_none_or(|p| i.key().product_id == p))
                .filter(|i| warehouse_id.is_none_or(|w| i.key().warehouse_id == w))
                .cloned()
                .collect()
        })
    }

    /// Layers of one product/warehouse in consumption order (oldest first).
    pub fn cost_layers(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> ServiceResult<Vec<CostLayer>> {
        let mut layers = self
            .store
            .read(tenant_id, |t| t.cost_layers(product_id, warehouse_id).to_vec())?;
        layers.sort_by_key(|l| (l.acquisition_date, l.sequence));
        Ok(layers)
    }

    /// Σ(remaining × effective cost) / Σ remaining over the open layers, or zero
    /// when nothing is left. Without a warehouse, every warehouse counts.
    pub fn weighted_average_cost(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: Option<WarehouseId>,
    ) -> ServiceResult<Money> {
        self.store.read(tenant_id, |t| {
            let open: Vec<&CostLayer> = t
                .all_cost_layers()
                .filter(|l| l.product_id == product_id && l.is_open())
                .filter(|l| warehouse_id.is_none_or(|w| l.warehouse_id == w))
                .collect();
            let quantity: Quantity = open.iter().map(|l| l.quantity_remaining).sum();
            let value: Money = open.iter().map(|l| l.remaining_value()).sum();
            value.per(quantity).unwrap_or(Money::ZERO)
        })
    }

    pub fn movements(
        &self,
        tenant_id: TenantId,
        key: Option<&StockKey>,
    ) -> ServiceResult<Vec<StockMovement>> {
        self.store.read(tenant_id, |t| {
            t.movements()
                .iter()
                .filter(|m| key.is_none_or(|k| m.key == *k))
                .cloned()
                .collect()
        })
    }

    pub fn landed_costs(&self, tenant_id: TenantId) -> ServiceResult<Vec<LandedCost>> {
        self.store.read(tenant_id, |t| t.landed_costs().to_vec())
    }

    /// Cross-check layers against their consumption rows and stock on hand.
    pub fn validate_integrity(&self, tenant_id: TenantId) -> ServiceResult<Vec<IntegrityIssue>> {
        self.store.read(tenant_id, |t| {
            let mut issues = Vec::new();
            let mut layered: BTreeMap<(ProductId, WarehouseId), Quantity> = BTreeMap::new();
            for layer in t.all_cost_layers() {
                issues.extend(check_layer_integrity(layer, t.consumptions()));
                *layered
                    .entry((layer.product_id, layer.warehouse_id))
                    .or_default() += layer.quantity_remaining;
            }

            let mut on_hand: BTreeMap<(ProductId, WarehouseId), Quantity> = BTreeMap::new();
            for item in t.stock_items() {
                *on_hand
                    .entry((item.key().product_id, item.key().warehouse_id))
                    .or_default() += item.quantity_on_hand();
            }
            let keys: BTreeSet<(ProductId, WarehouseId)> =
                layered.keys().chain(on_hand.keys()).copied().collect();
            for (product_id, warehouse_id) in keys {
                let stock = on_hand
                    .get(&(product_id, warehouse_id))
                    .copied()
                    .unwrap_or_default();
                let layers = layered
                    .get(&(product_id, warehouse_id))
                    .copied()
                    .unwrap_or_default();
                if stock != layers {
                    issues.push(IntegrityIssue::StockMismatch {
                        product_id,
                        warehouse_id,
                        on_hand: stock,
                        layered: layers,
                    });
                }
            }
            issues
        })
    }

    /// Per product/warehouse quantities and layer value, plus tenant totals.
    pub fn valuation(&self, tenant_id: TenantId) -> ServiceResult<ValuationReport> {
        self.store.read(tenant_id, |t| {
            let mut rows: BTreeMap<(ProductId, WarehouseId), ValuationRow> = BTreeMap::new();
            let blank = |product_id, warehouse_id| ValuationRow {
                product_id,
                warehouse_id,
                quantity_on_hand: Quantity::ZERO,
                quantity_reserved: Quantity::ZERO,
                layer_quantity: Quantity::ZERO,
                value: Money::ZERO,
                average_unit_cost: Money::ZERO,
            };
            for item in t.stock_items() {
                let (p, w) = (item.key().product_id, item.key().warehouse_id);
                let row = rows.entry((p, w)).or_insert_with(|| blank(p, w));
                row.quantity_on_hand += item.quantity_on_hand();
                row.quantity_reserved += item.quantity_reserved();
            }
            for layer in t.all_cost_layers().filter(|l| l.is_open()) {
                let (p, w) = (layer.product_id, layer.warehouse_id);
                let row = rows.entry((p, w)).or_insert_with(|| blank(p, w));
                row.layer_quantity += layer.quantity_remaining;
                row.value += layer.remaining_value();
            }

            let rows: Vec<ValuationRow> = rows
                .into_values()
                .map(|mut row| {
                    row.average_unit_cost = row.value.per(row.layer_quantity).unwrap_or(Money::ZERO);
                    row
                })
                .collect();
            ValuationReport {
                total_quantity: rows.iter().map(|r| r.quantity_on_hand).sum(),
                total_value: rows.iter().map(|r| r.value).sum(),
                rows,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Services;
    use crate::config::Settings;
    use rust_decimal_macros::dec;
    use stockwise_accounting::JournalStatus;
    use stockwise_inventory::ValuationMethod;

    fn services() -> Services {
        Services::new(&Settings::default())
    }

    fn ctx() -> ServiceContext {
        ServiceContext::new(TenantId::new(), None)
    }

    fn bill(n: &str) -> SourceDocument {
        SourceDocument::new("BILL", n).unwrap()
    }

    fn receive(svc: &Services, ctx: &ServiceContext, key: &StockKey, qty: i64, cost: Money, n: &str) -> StockReceipt {
        svc.costing
            .receive(
                ctx,
                ReceiveStock {
                    key: key.clone(),
                    quantity: Quantity::from(qty),
                    unit_cost: cost,
                    received_at: None,
                    source: bill(n),
                },
            )
            .unwrap()
    }

    #[test]
    fn receipt_creates_layer_updates_average_and_posts() {
        let svc = services();
        let ctx = ctx();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());

        receive(&svc, &ctx, &key, 10, Money::new(dec!(5)), "B-1");
        let second = receive(&svc, &ctx, &key, 10, Money::new(dec!(7)), "B-2");

        assert_eq!(second.item.quantity_on_hand(), Quantity::from(20));
        assert_eq!(second.item.unit_cost(), Money::new(dec!(6)));
        let entry = second.journal_entry.unwrap();
        assert_eq!(entry.total_debits(), Money::new(dec!(70)));
        assert_eq!(entry.lines[0].account.code, "1300");
        assert_eq!(entry.lines[1].account.code, "2000");
        assert_eq!(svc.costing.cost_layers(ctx.tenant_id, key.product_id, key.warehouse_id).unwrap().len(), 2);
    }

    #[test]
    fn receiving_the_same_bill_twice_changes_nothing() {
        let svc = services();
        let ctx = ctx();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 10, Money::new(dec!(5)), "B-1");

        let err = svc
            .costing
            .receive(
                &ctx,
                ReceiveStock {
                    key: key.clone(),
                    quantity: Quantity::from(10),
                    unit_cost: Money::new(dec!(5)),
                    received_at: None,
                    source: bill("B-1"),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "duplicate_posting");
        let item = svc.costing.stock_item(ctx.tenant_id, &key).unwrap();
        assert_eq!(item.quantity_on_hand(), Quantity::from(10));
        assert_eq!(svc.costing.cost_layers(ctx.tenant_id, key.product_id, key.warehouse_id).unwrap().len(), 1);
    }

    #[test]
    fn zero_cost_bill_is_still_received_only_once() {
        let svc = services();
        let ctx = ctx();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        let first = receive(&svc, &ctx, &key, 4, Money::ZERO, "B-9");
        assert!(first.journal_entry.is_none());

        let err = svc
            .costing
            .receive(
                &ctx,
                ReceiveStock {
                    key: key.clone(),
                    quantity: Quantity::from(4),
                    unit_cost: Money::ZERO,
                    received_at: None,
                    source: bill("B-9"),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "duplicate_posting");
        let item = svc.costing.stock_item(ctx.tenant_id, &key).unwrap();
        assert_eq!(item.quantity_on_hand(), Quantity::from(4));
    }

    #[test]
    fn issue_costs_fifo_and_posts_cogs() {
        let svc = services();
        let ctx = ctx();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 10, Money::new(dec!(5)), "B-1");
        receive(&svc, &ctx, &key, 20, Money::new(dec!(7)), "B-2");

        let issued = svc
            .costing
            .issue(
                &ctx,
                IssueStock {
                    key: key.clone(),
                    quantity: Quantity::from(15),
                    source: SourceDocument::new("INVOICE", "INV-1").unwrap(),
                },
            )
            .unwrap();

        assert_eq!(issued.consumption.total_cost, Money::new(dec!(85)));
        assert_eq!(issued.item.quantity_on_hand(), Quantity::from(15));
        let entry = issued.journal_entry.unwrap();
        assert_eq!(entry.lines[0].account.code, "5000");
        assert_eq!(entry.lines[0].debit, Money::new(dec!(85)));
        assert_eq!(entry.status, JournalStatus::Posted);
        assert!(svc.costing.validate_integrity(ctx.tenant_id).unwrap().is_empty());
    }

    #[test]
    fn issue_beyond_available_fails_without_side_effects() {
        let svc = services();
        let ctx = ctx();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 5, Money::new(dec!(5)), "B-1");

        let err = svc
            .costing
            .issue(
                &ctx,
                IssueStock {
                    key: key.clone(),
                    quantity: Quantity::from(6),
                    source: SourceDocument::new("INVOICE", "INV-1").unwrap(),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_available_stock");
        let layers = svc.costing.cost_layers(ctx.tenant_id, key.product_id, key.warehouse_id).unwrap();
        assert_eq!(layers[0].quantity_remaining, Quantity::from(5));
    }

    #[test]
    fn consume_reports_per_layer_breakdown() {
        let svc = services();
        let ctx = ctx();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 10, Money::new(dec!(5)), "B-1");
        receive(&svc, &ctx, &key, 20, Money::new(dec!(7)), "B-2");

        let plan = svc
            .costing
            .consume(
                &ctx,
                key.product_id,
                key.warehouse_id,
                Quantity::from(15),
                &SourceDocument::new("PRODUCTION", "MO-1").unwrap(),
            )
            .unwrap();
        assert_eq!(plan.total_cost, Money::new(dec!(85)));
        assert_eq!(plan.draws.len(), 2);

        let layers = svc.costing.cost_layers(ctx.tenant_id, key.product_id, key.warehouse_id).unwrap();
        assert!(layers[0].fully_consumed);
        assert_eq!(layers[1].quantity_remaining, Quantity::from(15));
    }

    #[test]
    fn weighted_average_method_values_at_pool_average() {
        let mut config = ServiceConfig::default();
        config.valuation_method = ValuationMethod::WeightedAverage;
        let svc = Services::with_store(
            Arc::new(InMemoryStore::new(std::time::Duration::from_millis(100))),
            Arc::new(config),
        );
        let ctx = ctx();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 10, Money::new(dec!(5)), "B-1");
        receive(&svc, &ctx, &key, 10, Money::new(dec!(7)), "B-2");
        assert_eq!(
            svc.costing.weighted_average_cost(ctx.tenant_id, key.product_id, None).unwrap(),
            Money::new(dec!(6))
        );

        let issued = svc
            .costing
            .issue(
                &ctx,
                IssueStock {
                    key: key.clone(),
                    quantity: Quantity::from(5),
                    source: SourceDocument::new("INVOICE", "INV-1").unwrap(),
                },
            )
            .unwrap();
        assert_eq!(issued.consumption.total_cost, Money::new(dec!(30)));
    }

    #[test]
    fn landed_cost_raises_layer_cost_and_is_idempotent_per_reference() {
        let svc = services();
        let ctx = ctx();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        let a = receive(&svc, &ctx, &key, 10, Money::new(dec!(5)), "B-1").layer;
        let b = receive(&svc, &ctx, &key, 30, Money::new(dec!(5)), "B-2").layer;

        let input = AllocateLandedCost {
            reference: "FREIGHT-1".into(),
            amount: Money::new(dec!(40)),
            layer_ids: vec![a.id, b.id],
            method: AllocationMethod::Quantity,
        };
        let landed = svc.costing.allocate_landed_cost(&ctx, input.clone()).unwrap();
        assert_eq!(landed.allocations[0].amount, Money::new(dec!(10)));
        assert_eq!(landed.allocations[1].amount, Money::new(dec!(30)));

        let layers = svc.costing.cost_layers(ctx.tenant_id, key.product_id, key.warehouse_id).unwrap();
        assert_eq!(layers[0].effective_unit_cost(), Money::new(dec!(6)));

        let err = svc.costing.allocate_landed_cost(&ctx, input).unwrap_err();
        assert_eq!(err.code(), "duplicate_posting");
        assert_eq!(svc.costing.landed_costs(ctx.tenant_id).unwrap().len(), 1);
    }

    #[test]
    fn valuation_sums_layer_value_per_warehouse() {
        let svc = services();
        let ctx = ctx();
        let product = ProductId::new();
        let north = StockKey::new(product, WarehouseId::new());
        let south = StockKey::new(product, WarehouseId::new());
        receive(&svc, &ctx, &north, 10, Money::new(dec!(5)), "B-1");
        receive(&svc, &ctx, &south, 4, Money::new(dec!(2.5)), "B-2");

        let report = svc.costing.valuation(ctx.tenant_id).unwrap();
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.total_quantity, Quantity::from(14));
        assert_eq!(report.total_value, Money::new(dec!(60)));
    }

    #[test]
    fn only_empty_items_can_be_purged() {
        let svc = services();
        let ctx = ctx();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 1, Money::new(dec!(5)), "B-1");
        assert!(svc.costing.purge_item(&ctx, &key).is_err());

        svc.costing
            .issue(
                &ctx,
                IssueStock {
                    key: key.clone(),
                    quantity: Quantity::from(1),
                    source: SourceDocument::new("INVOICE", "INV-1").unwrap(),
                },
            )
            .unwrap();
        svc.costing.purge_item(&ctx, &key).unwrap();
        assert!(svc.costing.stock_item(ctx.tenant_id, &key).is_err());
        assert_eq!(svc.costing.movements(ctx.tenant_id, Some(&key)).unwrap().len(), 2);
    }
}
