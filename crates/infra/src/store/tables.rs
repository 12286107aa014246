//! Committed per-tenant tables.

use std::collections::{BTreeMap, HashMap};

use stockwise_accounting::{JournalEntry, JournalEntryId, Ledger, LedgerId};
use stockwise_core::{Aggregate, AggregateId, DomainError, ProductId, SourceDocument, TenantId, WarehouseId};
use stockwise_inventory::{
    CostConsumption, CostLayer, LandedCost, StockAdjustment, StockItem, StockKey, StockMovement,
    StockReservation, StockTransfer,
};

use super::locks::RowKey;

/// A document aggregate persisted as a snapshot plus an audit stream.
pub trait Document: Aggregate<Error = DomainError> + Clone + Send + Sync + 'static {
    /// Stream name in the audit trail.
    const AGGREGATE_TYPE: &'static str;

    fn document_id(&self) -> AggregateId;

    fn document_tenant(&self) -> Option<TenantId>;

    fn lock_key(id: AggregateId) -> RowKey {
        RowKey::Document(id)
    }

    fn table(tables: &DocumentTables) -> &HashMap<AggregateId, Self>;

    fn table_mut(tables: &mut DocumentTables) -> &mut HashMap<AggregateId, Self>;
}

#[derive(Debug, Clone, Default)]
pub struct DocumentTables {
    reservations: HashMap<AggregateId, StockReservation>,
    adjustments: HashMap<AggregateId, StockAdjustment>,
    transfers: HashMap<AggregateId, StockTransfer>,
    ledgers: HashMap<AggregateId, Ledger>,
}

impl DocumentTables {
    pub(crate) fn merge(&mut self, staged: DocumentTables) {
        self.reservations.extend(staged.reservations);
        self.adjustments.extend(staged.adjustments);
        self.transfers.extend(staged.transfers);
        self.ledgers.extend(staged.ledgers);
    }
}

impl Document for StockReservation {
    const AGGREGATE_TYPE: &'static str = "inventory.reservation";

    fn document_id(&self) -> AggregateId {
        self.id_typed().aggregate_id()
    }

    fn document_tenant(&self) -> Option<TenantId> {
        self.tenant_id()
    }

    fn table(tables: &DocumentTables) -> &HashMap<AggregateId, Self> {
        &tables.reservations
    }

    fn table_mut(tables: &mut DocumentTables) -> &mut HashMap<AggregateId, Self> {
        &mut tables.reservations
    }
}

impl Document for StockAdjustment {
    const AGGREGATE_TYPE: &'static str = "inventory.adjustment";

    fn document_id(&self) -> AggregateId {
        self.id_typed().aggregate_id()
    }

    fn document_tenant(&self) -> Option<TenantId> {
        self.tenant_id()
    }

    fn table(tables: &DocumentTables) -> &HashMap<AggregateId, Self> {
        &tables.adjustments
    }

    fn table_mut(tables: &mut DocumentTables) -> &mut HashMap<AggregateId, Self> {
        &mut tables.adjustments
    }
}

impl Document for StockTransfer {
    const AGGREGATE_TYPE: &'static str = "inventory.transfer";

    fn document_id(&self) -> AggregateId {
        self.id_typed().aggregate_id()
    }

    fn document_tenant(&self) -> Option<TenantId> {
        self.tenant_id()
    }

    fn table(tables: &DocumentTables) -> &HashMap<AggregateId, Self> {
        &tables.transfers
    }

    fn table_mut(tables: &mut DocumentTables) -> &mut HashMap<AggregateId, Self> {
        &mut tables.transfers
    }
}

impl Document for Ledger {
    const AGGREGATE_TYPE: &'static str = "accounting.ledger";

    fn document_id(&self) -> AggregateId {
        self.id_typed().0
    }

    fn document_tenant(&self) -> Option<TenantId> {
        self.tenant_id()
    }

    fn lock_key(_id: AggregateId) -> RowKey {
        RowKey::Ledger
    }

    fn table(tables: &DocumentTables) -> &HashMap<AggregateId, Self> {
        &tables.ledgers
    }

    fn table_mut(tables: &mut DocumentTables) -> &mut HashMap<AggregateId, Self> {
        &mut tables.ledgers
    }
}

/// Everything one tenant owns. Nothing in here refers to another tenant.
#[derive(Debug, Clone)]
pub struct TenantTables {
    pub(crate) ledger_id: LedgerId,
    pub(crate) stock_items: BTreeMap<StockKey, StockItem>,
    pub(crate) cost_layers: BTreeMap<(ProductId, WarehouseId), Vec<CostLayer>>,
    pub(crate) consumptions: Vec<CostConsumption>,
    pub(crate) movements: Vec<StockMovement>,
    pub(crate) landed_costs: Vec<LandedCost>,
    pub(crate) documents: DocumentTables,
    pub(crate) journal: BTreeMap<JournalEntryId, JournalEntry>,
    pub(crate) journal_sources: HashMap<SourceDocument, JournalEntryId>,
}

impl TenantTables {
    pub fn new() -> Self {
        Self {
            ledger_id: LedgerId::new(AggregateId::new()),
            stock_items: BTreeMap::new(),
            cost_layers: BTreeMap::new(),
            consumptions: Vec::new(),
            movements: Vec::new(),
            landed_costs: Vec::new(),
            documents: DocumentTables::default(),
            journal: BTreeMap::new(),
            journal_sources: HashMap::new(),
        }
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn stock_item(&self, key: &StockKey) -> Option<&StockItem> {
        self.stock_items.get(key)
    }

    pub fn stock_items(&self) -> impl Iterator<Item = &StockItem> {
        self.stock_items.values()
    }

    pub fn cost_layers(&self, product_id: ProductId, warehouse_id: WarehouseId) -> &[CostLayer] {
        self.cost_layers
            .get(&(product_id, warehouse_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_cost_layers(&self) -> impl Iterator<Item = &CostLayer> {
        self.cost_layers.values().flatten()
    }

    pub fn consumptions(&self) -> &[CostConsumption] {
        &self.consumptions
    }

    pub fn movements(&self) -> &[StockMovement] {
        &self.movements
    }

    pub fn landed_costs(&self) -> &[LandedCost] {
        &self.landed_costs
    }

    pub fn document<D: Document>(&self, id: AggregateId) -> Option<&D> {
        D::table(&self.documents).get(&id)
    }

    pub fn documents<D: Document>(&self) -> impl Iterator<Item = &D> {
        D::table(&self.documents).values()
    }

    pub fn journal_entry(&self, id: JournalEntryId) -> Option<&JournalEntry> {
        self.journal.get(&id)
    }

    pub fn journal_entries(&self) -> impl Iterator<Item = &JournalEntry> {
        self.journal.values()
    }

    pub fn journal_entry_for(&self, source: &SourceDocument) -> Option<&JournalEntry> {
        self.journal_sources
            .get(source)
            .and_then(|id| self.journal.get(id))
    }
}

impl Default for TenantTables {
    fn default() -> Self {
        Self::new()
    }
}
