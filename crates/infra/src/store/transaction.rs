//! Unit of work over one tenant's tables.
//!
//! Reads see the transaction's own staged writes first, then committed rows.
//! Writes require the row lock and stay invisible to everyone else until
//! `commit`. Dropping a transaction without committing discards its writes
//! and releases its locks.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use stockwise_accounting::{JournalEntry, JournalEntryId, Ledger};
use stockwise_core::{
    AggregateId, DomainError, ExpectedVersion, ProductId, TenantId, UserId, WarehouseId,
};
use stockwise_inventory::{
    CostConsumption, CostLayer, LandedCost, StockItem, StockKey, StockMovement,
};

use crate::error::{ServiceError, ServiceResult};
use crate::event_store::PendingEvent;

use super::InMemoryStore;
use super::locks::RowKey;
use super::sequence;
use super::tables::{Document, DocumentTables, TenantTables};

#[derive(Debug)]
pub(crate) struct AuditBatch {
    pub(crate) aggregate_type: &'static str,
    /// Stream version the document had when this transaction first saved it.
    pub(crate) expected: ExpectedVersion,
    pub(crate) events: Vec<PendingEvent>,
}

#[derive(Debug, Default)]
pub(crate) struct Staged {
    pub(crate) stock_items: BTreeMap<StockKey, StockItem>,
    pub(crate) purged: BTreeSet<StockKey>,
    pub(crate) cost_layers: BTreeMap<(ProductId, WarehouseId), Vec<CostLayer>>,
    pub(crate) consumptions: Vec<CostConsumption>,
    pub(crate) movements: Vec<StockMovement>,
    pub(crate) landed_costs: Vec<LandedCost>,
    pub(crate) documents: DocumentTables,
    pub(crate) journal: BTreeMap<JournalEntryId, JournalEntry>,
    pub(crate) audit: BTreeMap<AggregateId, AuditBatch>,
}

impl Staged {
    pub(crate) fn check_journal_sources(&self, committed: &TenantTables) -> ServiceResult<()> {
        let mut seen = HashSet::new();
        for entry in self.journal.values() {
            let duplicate = !seen.insert(&entry.source)
                || committed
                    .journal_sources
                    .get(&entry.source)
                    .is_some_and(|existing| *existing != entry.id);
            if duplicate {
                return Err(DomainError::DuplicatePosting(entry.source.to_string()).into());
            }
        }
        Ok(())
    }
}

pub struct Transaction<'a> {
    store: &'a InMemoryStore,
    tenant_id: TenantId,
    id: u64,
    held: BTreeSet<RowKey>,
    staged: Staged,
}

impl<'a> Transaction<'a> {
    pub(super) fn new(store: &'a InMemoryStore, tenant_id: TenantId, id: u64) -> Self {
        Self {
            store,
            tenant_id,
            id,
            held: BTreeSet::new(),
            staged: Staged::default(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Take row locks in global order. Keys already held are skipped.
    pub fn lock(&mut self, keys: impl IntoIterator<Item = RowKey>) -> ServiceResult<()> {
        let wanted: BTreeSet<RowKey> = keys
            .into_iter()
            .filter(|k| !self.held.contains(k))
            .collect();
        for key in wanted {
            self.store
                .locks
                .acquire(self.tenant_id, &key, self.id, self.store.lock_timeout)?;
            self.held.insert(key);
        }
        Ok(())
    }

    fn ensure_locked(&self, key: &RowKey) -> ServiceResult<()> {
        if self.held.contains(key) {
            Ok(())
        } else {
            Err(ServiceError::Store(format!("{key} written without holding its lock")))
        }
    }

    fn committed<R>(&self, f: impl FnOnce(&TenantTables) -> R) -> ServiceResult<R> {
        self.store.read(self.tenant_id, f)
    }

    // --- stock items -----------------------------------------------------

    pub fn stock_item(&self, key: &StockKey) -> ServiceResult<Option<StockItem>> {
        if self.staged.purged.contains(key) {
            return Ok(None);
        }
        if let Some(item) = self.staged.stock_items.get(key) {
            return Ok(Some(item.clone()));
        }
        self.committed(|t| t.stock_item(key).cloned())
    }

    pub fn put_stock_item(&mut self, item: StockItem) -> ServiceResult<()> {
        self.ensure_locked(&RowKey::StockItem(item.key().clone()))?;
        item.check_invariants()?;
        self.staged.purged.remove(item.key());
        self.staged.stock_items.insert(item.key().clone(), item);
        Ok(())
    }

    pub fn purge_stock_item(&mut self, key: &StockKey) -> ServiceResult<()> {
        self.ensure_locked(&RowKey::StockItem(key.clone()))?;
        self.staged.stock_items.remove(key);
        self.staged.purged.insert(key.clone());
        Ok(())
    }

    // --- cost layers -----------------------------------------------------

    pub fn cost_layers(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> ServiceResult<Vec<CostLayer>> {
        if let Some(layers) = self.staged.cost_layers.get(&(product_id, warehouse_id)) {
            return Ok(layers.clone());
        }
        self.committed(|t| t.cost_layers(product_id, warehouse_id).to_vec())
    }

    pub fn put_cost_layers(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        layers: Vec<CostLayer>,
    ) -> ServiceResult<()> {
        self.ensure_locked(&RowKey::CostLayers(product_id, warehouse_id))?;
        self.staged
            .cost_layers
            .insert((product_id, warehouse_id), layers);
        Ok(())
    }

    pub fn record_consumptions(&mut self, rows: Vec<CostConsumption>) {
        self.staged.consumptions.extend(rows);
    }

    pub fn record_movement(&mut self, movement: StockMovement) {
        self.staged.movements.push(movement);
    }

    pub fn record_landed_cost(&mut self, landed_cost: LandedCost) {
        self.staged.landed_costs.push(landed_cost);
    }

    // --- documents -------------------------------------------------------

    pub fn load<D: Document>(&self, id: AggregateId) -> ServiceResult<Option<D>> {
        if let Some(doc) = D::table(&self.staged.documents).get(&id) {
            return Ok(Some(doc.clone()));
        }
        self.committed(|t| t.document::<D>(id).cloned())
    }

    /// Stage `doc` and append `events` to its audit stream.
    ///
    /// `doc` must already have `events` applied. The stream version check
    /// happens at commit against the version the document had before this
    /// transaction touched it.
    pub fn save<D>(&mut self, doc: D, events: &[D::Event], actor: Option<UserId>) -> ServiceResult<()>
    where
        D: Document,
        D::Event: stockwise_events::Event + Serialize,
    {
        let id = doc.document_id();
        if doc.document_tenant() != Some(self.tenant_id) {
            return Err(ServiceError::TenantIsolation(format!(
                "{} {id} does not belong to tenant {}",
                D::AGGREGATE_TYPE,
                self.tenant_id
            )));
        }
        self.ensure_locked(&D::lock_key(id))?;

        if !events.is_empty() {
            let batch = self.staged.audit.entry(id).or_insert_with(|| AuditBatch {
                aggregate_type: D::AGGREGATE_TYPE,
                expected: ExpectedVersion::before(&doc, events.len()),
                events: Vec::new(),
            });
            for event in events {
                batch.events.push(PendingEvent::from_typed(actor, event)?);
            }
        }
        D::table_mut(&mut self.staged.documents).insert(id, doc);
        Ok(())
    }

    // --- journal ---------------------------------------------------------

    /// The tenant's ledger aggregate (empty until the first posting).
    pub fn ledger(&self) -> ServiceResult<Ledger> {
        let ledger_id = self.committed(|t| t.ledger_id())?;
        Ok(self
            .load::<Ledger>(ledger_id.0)?
            .unwrap_or_else(|| Ledger::empty(ledger_id)))
    }

    pub fn journal_entry(&self, id: JournalEntryId) -> ServiceResult<Option<JournalEntry>> {
        if let Some(entry) = self.staged.journal.get(&id) {
            return Ok(Some(entry.clone()));
        }
        self.committed(|t| t.journal_entry(id).cloned())
    }

    pub fn put_journal_entry(&mut self, entry: JournalEntry) -> ServiceResult<()> {
        self.ensure_locked(&RowKey::Ledger)?;
        self.staged.journal.insert(entry.id, entry);
        Ok(())
    }

    // --- numbering -------------------------------------------------------

    pub fn next_number(&self, prefix: &'static str) -> ServiceResult<String> {
        self.store.sequences.next_number(self.tenant_id, prefix)
    }

    pub fn next_layer_sequence(&self) -> ServiceResult<u64> {
        self.store
            .sequences
            .next_value(self.tenant_id, sequence::COST_LAYER)
    }

    /// Apply every staged write atomically, or none of them.
    pub fn commit(mut self) -> ServiceResult<()> {
        let staged = std::mem::take(&mut self.staged);
        self.store.apply(self.tenant_id, staged)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        let keys: Vec<RowKey> = self.held.iter().cloned().collect();
        self.store.locks.release(self.tenant_id, &keys, self.id);
    }
}
