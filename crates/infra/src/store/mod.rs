//! Transactional in-memory store.
//!
//! One table set per tenant, row locks with timeouts, document numbering and
//! an audit trail appended in the same commit as the rows it describes.

pub mod locks;
pub mod sequence;
pub mod tables;
pub mod transaction;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::debug;

use stockwise_core::{AggregateId, TenantId};

use crate::error::{ServiceError, ServiceResult};
use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent, StreamAppend};

pub use locks::{RowKey, RowLocks};
pub use sequence::Sequences;
pub use tables::{Document, TenantTables};
pub use transaction::Transaction;

use transaction::Staged;

pub struct InMemoryStore {
    tenants: RwLock<HashMap<TenantId, TenantTables>>,
    locks: RowLocks,
    sequences: Sequences,
    audit: Arc<dyn EventStore>,
    next_tx: AtomicU64,
    lock_timeout: Duration,
}

impl InMemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self::with_event_store(lock_timeout, Arc::new(InMemoryEventStore::new()))
    }

    pub fn with_event_store(lock_timeout: Duration, audit: Arc<dyn EventStore>) -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            locks: RowLocks::new(),
            sequences: Sequences::new(),
            audit,
            next_tx: AtomicU64::new(1),
            lock_timeout,
        }
    }

    /// Start a transaction for `tenant_id`. The tenant becomes known to the store.
    pub fn begin(&self, tenant_id: TenantId) -> ServiceResult<Transaction<'_>> {
        {
            let mut tenants = self
                .tenants
                .write()
                .map_err(|_| ServiceError::poisoned("tenant tables"))?;
            tenants.entry(tenant_id).or_default();
        }
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed);
        Ok(Transaction::new(self, tenant_id, id))
    }

    /// Run `f` against the committed tables of one tenant.
    pub fn read<R>(&self, tenant_id: TenantId, f: impl FnOnce(&TenantTables) -> R) -> ServiceResult<R> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| ServiceError::poisoned("tenant tables"))?;
        match tenants.get(&tenant_id) {
            Some(tables) => Ok(f(tables)),
            None => Ok(f(&TenantTables::new())),
        }
    }

    pub fn tenants(&self) -> ServiceResult<Vec<TenantId>> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| ServiceError::poisoned("tenant tables"))?;
        Ok(tenants.keys().copied().collect())
    }

    /// Audit trail of one document, oldest first.
    pub fn history(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> ServiceResult<Vec<StoredEvent>> {
        Ok(self.audit.load_stream(tenant_id, aggregate_id)?)
    }

    fn apply(&self, tenant_id: TenantId, staged: Staged) -> ServiceResult<()> {
        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| ServiceError::poisoned("tenant tables"))?;
        let tables = tenants.entry(tenant_id).or_default();

        // Validate everything before the first write.
        staged.check_journal_sources(tables)?;
        for (aggregate_id, batch) in &staged.audit {
            let current = self.audit.stream_version(tenant_id, *aggregate_id)?;
            if !batch.expected.matches(current) {
                return Err(ServiceError::Concurrency(format!(
                    "document {aggregate_id} is at version {current}, expected {:?}",
                    batch.expected
                )));
            }
        }

        let appended: usize = staged.audit.values().map(|b| b.events.len()).sum();
        for (aggregate_id, batch) in staged.audit {
            self.audit.append(StreamAppend {
                tenant_id,
                aggregate_type: batch.aggregate_type,
                aggregate_id,
                expected: batch.expected,
                events: batch.events,
            })?;
        }

        for key in &staged.purged {
            tables.stock_items.remove(key);
        }
        let items = staged.stock_items.len();
        tables.stock_items.extend(staged.stock_items);
        tables.cost_layers.extend(staged.cost_layers);
        tables.consumptions.extend(staged.consumptions);
        tables.movements.extend(staged.movements);
        tables.landed_costs.extend(staged.landed_costs);
        tables.documents.merge(staged.documents);
        for (id, entry) in staged.journal {
            tables.journal_sources.insert(entry.source.clone(), id);
            tables.journal.insert(id, entry);
        }

        debug!(%tenant_id, stock_items = items, audit_events = appended, "transaction committed");
        Ok(())
    }
}
