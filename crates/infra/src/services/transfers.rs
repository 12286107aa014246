//! Inter-warehouse transfers: approval, shipment and receipt with write-off of
//! what never arrived.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stockwise_accounting::SourceEvent;
use stockwise_core::{
    Aggregate, DomainError, Money, ProductId, Quantity, SourceDocument, TenantId, WarehouseId,
};
use stockwise_inventory::{
    CreateTransfer, LayerType, MovementType, ReceiptLine, StockKey, StockMovement, StockTransfer,
    TransferCommand, TransferId, TransferLine, TransferStatus,
};

use crate::error::ServiceResult;
use crate::store::{InMemoryStore, RowKey, Transaction, sequence};

use super::stock_ops::{consume_in, post_in, receive_in, stock_locks};
use super::{ServiceConfig, ServiceContext};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransferLine {
    pub product_id: ProductId,
    #[serde(default)]
    pub batch: Option<String>,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub lines: Vec<NewTransferLine>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// What arrived for one line, in the transfer's line order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub quantity_received: Quantity,
    #[serde(default)]
    pub quantity_damaged: Quantity,
}

#[derive(Clone)]
pub struct TransferService {
    store: Arc<InMemoryStore>,
    config: Arc<ServiceConfig>,
}

impl TransferService {
    pub fn new(store: Arc<InMemoryStore>, config: Arc<ServiceConfig>) -> Self {
        Self { store, config }
    }

    /// Create a transfer valued at the source's current unit costs. The
    /// requested quantities are held at the source until the transfer is
    /// received, rejected or cancelled.
    pub fn create(&self, ctx: &ServiceContext, input: NewTransfer) -> ServiceResult<StockTransfer> {
        let id = TransferId::generate();
        let lines: Vec<TransferLine> = input
            .lines
            .into_iter()
            .map(|l| TransferLine {
                batch: l.batch,
                ..TransferLine::new(l.product_id, l.quantity)
            })
            .collect();

        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock(
            lines
                .iter()
                .map(|l| RowKey::StockItem(l.key_at(input.source_warehouse_id)))
                .chain([RowKey::Document(id.aggregate_id())]),
        )?;

        let mut estimated_value = Money::ZERO;
        for line in &lines {
            let key = line.key_at(input.source_warehouse_id);
            let mut item = tx.stock_item(&key)?.ok_or_else(|| {
                DomainError::insufficient_available(
                    line.quantity_requested.value(),
                    rust_decimal::Decimal::ZERO,
                )
            })?;
            item.reserve(line.quantity_requested, ctx.now)?;
            estimated_value += item.unit_cost().times(line.quantity_requested);
            tx.put_stock_item(item)?;
        }

        let mut transfer = StockTransfer::empty(id);
        let events = transfer.execute(&TransferCommand::Create(CreateTransfer {
            tenant_id: ctx.tenant_id,
            transfer_id: id,
            number: tx.next_number(sequence::TRANSFER)?,
            source_warehouse_id: input.source_warehouse_id,
            destination_warehouse_id: input.destination_warehouse_id,
            lines,
            estimated_value,
            notes: input.notes,
            policy: self.config.approval_policy.clone(),
            occurred_at: ctx.now,
            actor: ctx.actor,
        }))?;
        tx.save(transfer.clone(), &events, ctx.actor)?;
        tx.commit()?;

        info!(
            tenant_id = %ctx.tenant_id,
            number = %transfer.number(),
            estimated_value = %estimated_value,
            status = %transfer.status(),
            "transfer created"
        );
        Ok(transfer)
    }

    pub fn approve(&self, ctx: &ServiceContext, id: TransferId) -> ServiceResult<StockTransfer> {
        let transfer = self.transition(
            ctx,
            id,
            TransferCommand::Approve {
                tenant_id: ctx.tenant_id,
                occurred_at: ctx.now,
                actor: ctx.actor,
            },
        )?;
        info!(tenant_id = %ctx.tenant_id, number = %transfer.number(), approved_by = ?ctx.actor, "transfer approved");
        Ok(transfer)
    }

    pub fn reject(&self, ctx: &ServiceContext, id: TransferId, reason: String) -> ServiceResult<StockTransfer> {
        let transfer = self.release_holds(
            ctx,
            id,
            TransferCommand::Reject {
                tenant_id: ctx.tenant_id,
                reason,
                occurred_at: ctx.now,
                actor: ctx.actor,
            },
        )?;
        warn!(tenant_id = %ctx.tenant_id, number = %transfer.number(), "transfer rejected");
        Ok(transfer)
    }

    pub fn ship(
        &self,
        ctx: &ServiceContext,
        id: TransferId,
        carrier: Option<String>,
        tracking_number: Option<String>,
    ) -> ServiceResult<StockTransfer> {
        let transfer = self.transition(
            ctx,
            id,
            TransferCommand::Ship {
                tenant_id: ctx.tenant_id,
                carrier,
                tracking_number,
                occurred_at: ctx.now,
                actor: ctx.actor,
            },
        )?;
        info!(tenant_id = %ctx.tenant_id, number = %transfer.number(), "transfer shipped");
        Ok(transfer)
    }

    pub fn cancel(&self, ctx: &ServiceContext, id: TransferId) -> ServiceResult<StockTransfer> {
        let transfer = self.release_holds(
            ctx,
            id,
            TransferCommand::Cancel {
                tenant_id: ctx.tenant_id,
                occurred_at: ctx.now,
                actor: ctx.actor,
            },
        )?;
        info!(tenant_id = %ctx.tenant_id, number = %transfer.number(), "transfer cancelled");
        Ok(transfer)
    }

    /// Complete the transfer. The hold is consumed and the full requested
    /// quantity leaves the source layers; what arrived enters the destination
    /// at the drawn average cost and the rest is written off.
    pub fn receive(
        &self,
        ctx: &ServiceContext,
        id: TransferId,
        received: Vec<ReceivedLine>,
    ) -> ServiceResult<StockTransfer> {
        let current = self.get(ctx.tenant_id, id)?;
        let (from, to) = (current.source_warehouse_id(), current.destination_warehouse_id());
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock(
            current
                .lines()
                .iter()
                .flat_map(|l| {
                    let mut keys = stock_locks(&l.key_at(from)).to_vec();
                    keys.extend(stock_locks(&l.key_at(to)));
                    keys
                })
                .chain([RowKey::Document(id.aggregate_id()), RowKey::Ledger]),
        )?;

        let mut transfer = load(&tx, id)?;
        let mut receipts: Vec<ReceiptLine> = received
            .iter()
            .map(|r| ReceiptLine {
                quantity_received: r.quantity_received,
                quantity_damaged: r.quantity_damaged,
                unit_cost: Money::ZERO,
            })
            .collect();
        // Status and quantities are checked before any stock moves.
        transfer.handle(&TransferCommand::Receive {
            tenant_id: ctx.tenant_id,
            lines: receipts.clone(),
            occurred_at: ctx.now,
            actor: ctx.actor,
        })?;

        let source = SourceDocument::new("TRANSFER", transfer.number())?;
        let mut written_off_value = Money::ZERO;
        for (line, receipt) in transfer.lines().iter().zip(receipts.iter_mut()) {
            let moved = TransferLine {
                quantity_received: receipt.quantity_received,
                ..line.clone()
            };
            let (avg, lost) = self.move_line(&mut tx, ctx, &moved, from, to, &source)?;
            receipt.unit_cost = avg;
            written_off_value += lost;
        }

        post_in(
            &mut tx,
            ctx,
            &self.config,
            &SourceEvent::TransferWriteOff {
                source,
                value: written_off_value,
            },
        )?;
        let events = transfer.execute(&TransferCommand::Receive {
            tenant_id: ctx.tenant_id,
            lines: receipts,
            occurred_at: ctx.now,
            actor: ctx.actor,
        })?;
        tx.save(transfer.clone(), &events, ctx.actor)?;
        tx.commit()?;

        info!(
            tenant_id = %ctx.tenant_id,
            number = %transfer.number(),
            written_off = %written_off_value,
            "transfer received"
        );
        Ok(transfer)
    }

    pub fn get(&self, tenant_id: TenantId, id: TransferId) -> ServiceResult<StockTransfer> {
        self.store
            .read(tenant_id, |t| t.document::<StockTransfer>(id.aggregate_id()).cloned())?
            .ok_or_else(|| DomainError::not_found(format!("transfer {id}")).into())
    }

    pub fn list(
        &self,
        tenant_id: TenantId,
        status: Option<TransferStatus>,
    ) -> ServiceResult<Vec<StockTransfer>> {
        let mut found: Vec<StockTransfer> = self.store.read(tenant_id, |t| {
            t.documents::<StockTransfer>()
                .filter(|tr| status.is_none_or(|s| tr.status() == s))
                .cloned()
                .collect()
        })?;
        found.sort_by(|a, b| a.number().cmp(b.number()));
        Ok(found)
    }

    fn transition(
        &self,
        ctx: &ServiceContext,
        id: TransferId,
        command: TransferCommand,
    ) -> ServiceResult<StockTransfer> {
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock([RowKey::Document(id.aggregate_id())])?;
        let mut transfer = load(&tx, id)?;
        let events = transfer.execute(&command)?;
        tx.save(transfer.clone(), &events, ctx.actor)?;
        tx.commit()?;
        Ok(transfer)
    }

    /// Run a terminal transition that gives the held source stock back.
    fn release_holds(
        &self,
        ctx: &ServiceContext,
        id: TransferId,
        command: TransferCommand,
    ) -> ServiceResult<StockTransfer> {
        let current = self.get(ctx.tenant_id, id)?;
        let from = current.source_warehouse_id();
        let mut tx = self.store.begin(ctx.tenant_id)?;
        tx.lock(
            current
                .lines()
                .iter()
                .map(|l| RowKey::StockItem(l.key_at(from)))
                .chain([RowKey::Document(id.aggregate_id())]),
        )?;

        let mut transfer = load(&tx, id)?;
        let events = transfer.execute(&command)?;
        for line in transfer.lines() {
            let key = line.key_at(from);
            let mut item = tx
                .stock_item(&key)?
                .ok_or_else(|| DomainError::invariant(format!("held stock {key} vanished")))?;
            item.release(line.quantity_requested, ctx.now)?;
            tx.put_stock_item(item)?;
        }
        tx.save(transfer.clone(), &events, ctx.actor)?;
        tx.commit()?;
        Ok(transfer)
    }

    /// Move one line between warehouses. Returns the average unit cost drawn
    /// and the value written off.
    fn move_line(
        &self,
        tx: &mut Transaction<'_>,
        ctx: &ServiceContext,
        line: &TransferLine,
        from: WarehouseId,
        to: WarehouseId,
        source: &SourceDocument,
    ) -> ServiceResult<(Money, Money)> {
        let out_key = line.key_at(from);
        let requested = line.quantity_requested;
        let mut item = tx.stock_item(&out_key)?.ok_or_else(|| {
            DomainError::insufficient_available(requested.value(), rust_decimal::Decimal::ZERO)
        })?;
        item.fulfill(requested, requested, ctx.now, ctx.actor)?;
        let plan = consume_in(
            tx,
            &self.config,
            line.product_id,
            from,
            requested,
            source,
            ctx.now,
        )?;
        tx.put_stock_item(item)?;

        let avg = plan.average_unit_cost();
        let received = line.quantity_received;
        let lost = line.quantity_written_off();
        if received.is_positive() {
            tx.record_movement(
                StockMovement::new(out_key.clone(), MovementType::TransferOut, received, source.clone(), ctx.now)
                    .with_cost(avg)
                    .by(ctx.actor),
            );
            receive_in(
                tx,
                ctx,
                &line.key_at(to),
                received,
                avg,
                LayerType::TransferIn,
                ctx.now,
                source,
            )?;
        }
        if lost.is_positive() {
            tx.record_movement(
                StockMovement::new(out_key, MovementType::WriteOff, lost, source.clone(), ctx.now)
                    .with_cost(avg)
                    .by(ctx.actor),
            );
        }
        Ok((avg, plan.total_cost - avg.times(received)))
    }
}

fn load(tx: &Transaction<'_>, id: TransferId) -> ServiceResult<StockTransfer> {
    tx.load::<StockTransfer>(id.aggregate_id())?
        .ok_or_else(|| DomainError::not_found(format!("transfer {id}")).into())
}
