//! Building blocks shared by the services. Callers hold every row lock these
//! touch; nothing here commits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use stockwise_accounting::{
    ClaimSource, EntryHeader, JournalCommand, JournalEntry, JournalEntryId, PostJournalEntry,
    SourceEvent, create_journal_entry,
};
use stockwise_core::{Aggregate, DomainError, Money, ProductId, Quantity, SourceDocument, WarehouseId};
use stockwise_inventory::{
    ConsumptionPlan, CostLayer, LayerType, MovementType, NewCostLayer, StockItem, StockKey,
    StockMovement, apply_plan, plan_consumption,
};

use crate::error::ServiceResult;
use crate::store::{RowKey, Transaction, sequence};

use super::{ServiceConfig, ServiceContext};

/// Row locks covering a stock change on `key`.
pub(crate) fn stock_locks(key: &StockKey) -> [RowKey; 2] {
    [
        RowKey::StockItem(key.clone()),
        RowKey::CostLayers(key.product_id, key.warehouse_id),
    ]
}

/// Book stock in: open the item if needed, add a cost layer and a movement row.
#[allow(clippy::too_many_arguments)]
pub(crate) fn receive_in(
    tx: &mut Transaction<'_>,
    ctx: &ServiceContext,
    key: &StockKey,
    quantity: Quantity,
    unit_cost: Money,
    layer_type: LayerType,
    acquired_at: DateTime<Utc>,
    source: &SourceDocument,
) -> ServiceResult<CostLayer> {
    let mut item = tx
        .stock_item(key)?
        .unwrap_or_else(|| StockItem::open(key.clone(), ctx.now, ctx.actor));
    item.receive(quantity, unit_cost, ctx.now, ctx.actor)?;

    let layer = CostLayer::open(NewCostLayer {
        product_id: key.product_id,
        warehouse_id: key.warehouse_id,
        batch: key.batch.clone(),
        layer_type,
        quantity,
        unit_cost,
        acquisition_date: acquired_at,
        sequence: tx.next_layer_sequence()?,
        source: source.clone(),
    })?;
    let mut layers = tx.cost_layers(key.product_id, key.warehouse_id)?;
    layers.push(layer.clone());
    tx.put_cost_layers(key.product_id, key.warehouse_id, layers)?;
    tx.put_stock_item(item)?;

    let movement_type = match layer_type {
        LayerType::Purchase | LayerType::Opening => MovementType::Receipt,
        LayerType::AdjustmentIn => MovementType::AdjustmentIn,
        LayerType::TransferIn => MovementType::TransferIn,
    };
    tx.record_movement(
        StockMovement::new(key.clone(), movement_type, quantity, source.clone(), ctx.now)
            .with_cost(unit_cost)
            .by(ctx.actor),
    );
    Ok(layer)
}

/// Draw `quantity` from the open layers of one product/warehouse.
pub(crate) fn consume_in(
    tx: &mut Transaction<'_>,
    config: &ServiceConfig,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    quantity: Quantity,
    source: &SourceDocument,
    at: DateTime<Utc>,
) -> ServiceResult<ConsumptionPlan> {
    let mut layers = tx.cost_layers(product_id, warehouse_id)?;
    let plan = plan_consumption(&layers, quantity, config.valuation_method)?;
    let rows = apply_plan(&mut layers, &plan, source, at)?;
    tx.put_cost_layers(product_id, warehouse_id, layers)?;
    tx.record_consumptions(rows);

    debug!(
        %product_id,
        %warehouse_id,
        %quantity,
        total_cost = %plan.total_cost,
        layers = plan.draws.len(),
        "cost layers consumed"
    );
    Ok(plan)
}

/// Take unreserved stock out of `key` and cost it from the layers.
pub(crate) fn issue_in(
    tx: &mut Transaction<'_>,
    ctx: &ServiceContext,
    config: &ServiceConfig,
    key: &StockKey,
    quantity: Quantity,
    movement_type: MovementType,
    source: &SourceDocument,
) -> ServiceResult<ConsumptionPlan> {
    let mut item = tx
        .stock_item(key)?
        .ok_or_else(|| DomainError::insufficient_available(quantity.value(), Decimal::ZERO))?;
    item.issue(quantity, ctx.now, ctx.actor)?;
    let plan = consume_in(
        tx,
        config,
        key.product_id,
        key.warehouse_id,
        quantity,
        source,
        ctx.now,
    )?;
    tx.put_stock_item(item)?;
    tx.record_movement(
        StockMovement::new(key.clone(), movement_type, quantity, source.clone(), ctx.now)
            .with_cost(plan.average_unit_cost())
            .by(ctx.actor),
    );
    Ok(plan)
}

/// Post the journal entry for `event` through the tenant ledger.
///
/// Derived events that come to nothing (zero value) post no entry and return
/// `None`, but still claim their source on the ledger so it cannot post later.
/// Lines are validated before a journal number is drawn.
pub(crate) fn post_in(
    tx: &mut Transaction<'_>,
    ctx: &ServiceContext,
    config: &ServiceConfig,
    event: &SourceEvent,
) -> ServiceResult<Option<JournalEntry>> {
    let lines = config
        .posting_rules
        .derive_lines(event, config.currency_scale)?;
    if lines.is_empty() && !matches!(event, SourceEvent::Manual { .. }) {
        tx.lock([RowKey::Ledger])?;
        let mut ledger = tx.ledger()?;
        let events = ledger.execute(&JournalCommand::ClaimSource(ClaimSource {
            tenant_id: ctx.tenant_id,
            ledger_id: ledger.id_typed(),
            source: event.source().clone(),
            occurred_at: ctx.now,
        }))?;
        tx.save(ledger, &events, ctx.actor)?;
        debug!(source = %event.source(), "nothing to post");
        return Ok(None);
    }
    stockwise_accounting::validate_lines(&lines, config.currency_scale)?;

    tx.lock([RowKey::Ledger])?;
    let header = EntryHeader {
        id: JournalEntryId::generate(),
        number: tx.next_number(sequence::JOURNAL_ENTRY)?,
        entry_date: ctx.now,
        posted_by: ctx.actor,
    };
    let entry = create_journal_entry(event, &config.posting_rules, config.currency_scale, header)?;

    let mut ledger = tx.ledger()?;
    let events = ledger.execute(&JournalCommand::PostJournalEntry(PostJournalEntry {
        tenant_id: ctx.tenant_id,
        ledger_id: ledger.id_typed(),
        entry: entry.clone(),
        currency_scale: config.currency_scale,
    }))?;
    tx.put_journal_entry(entry.clone())?;
    tx.save(ledger, &events, ctx.actor)?;

    info!(
        tenant_id = %ctx.tenant_id,
        entry = %entry.number,
        source = %entry.source,
        amount = %entry.total_debits(),
        "journal entry posted"
    );
    Ok(Some(entry))
}
