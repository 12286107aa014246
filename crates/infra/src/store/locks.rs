//! Row-level locks with select-for-update semantics.
//!
//! A transaction takes every lock it needs in one sorted batch, so two
//! transactions touching the same rows queue in the same order. A wait longer
//! than the configured timeout fails with `ServiceError::Concurrency`.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use stockwise_core::{AggregateId, ProductId, TenantId, WarehouseId};
use stockwise_inventory::StockKey;

use crate::error::{ServiceError, ServiceResult};

/// A lockable row. Ordering is the global lock acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Document(AggregateId),
    StockItem(StockKey),
    /// The whole layer set of a product at a warehouse.
    CostLayers(ProductId, WarehouseId),
    /// The tenant's journal (one per tenant).
    Ledger,
}

impl core::fmt::Display for RowKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RowKey::Document(id) => write!(f, "document {id}"),
            RowKey::StockItem(key) => write!(f, "stock item {key}"),
            RowKey::CostLayers(product, warehouse) => {
                write!(f, "cost layers {product}@{warehouse}")
            }
            RowKey::Ledger => write!(f, "ledger"),
        }
    }
}

#[derive(Debug, Default)]
pub struct RowLocks {
    held: Mutex<HashMap<(TenantId, RowKey), u64>>,
    released: Condvar,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `owner` holds `key`, or fail once `timeout` has passed.
    /// Re-acquiring a lock the owner already holds succeeds immediately.
    pub fn acquire(
        &self,
        tenant_id: TenantId,
        key: &RowKey,
        owner: u64,
        timeout: Duration,
    ) -> ServiceResult<()> {
        let deadline = Instant::now() + timeout;
        let slot = (tenant_id, key.clone());
        let mut held = self
            .held
            .lock()
            .map_err(|_| ServiceError::poisoned("row lock table"))?;

        loop {
            match held.get(&slot) {
                None => {
                    held.insert(slot, owner);
                    return Ok(());
                }
                Some(current) if *current == owner => return Ok(()),
                Some(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ServiceError::Concurrency(format!(
                            "timed out after {}ms waiting for {key}",
                            timeout.as_millis()
                        )));
                    }
                    let (guard, _) = self
                        .released
                        .wait_timeout(held, deadline - now)
                        .map_err(|_| ServiceError::poisoned("row lock table"))?;
                    held = guard;
                }
            }
        }
    }

    /// Release `keys` held by `owner`. Keys held by someone else are left alone.
    pub fn release(&self, tenant_id: TenantId, keys: &[RowKey], owner: u64) {
        if let Ok(mut held) = self.held.lock() {
            for key in keys {
                let slot = (tenant_id, key.clone());
                if held.get(&slot) == Some(&owner) {
                    held.remove(&slot);
                }
            }
        }
        self.released.notify_all();
    }

    pub fn is_locked(&self, tenant_id: TenantId, key: &RowKey) -> bool {
        self.held
            .lock()
            .map(|held| held.contains_key(&(tenant_id, key.clone())))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn second_owner_times_out() {
        let locks = RowLocks::new();
        let tenant = TenantId::new();
        locks
            .acquire(tenant, &RowKey::Ledger, 1, Duration::from_millis(10))
            .unwrap();

        let err = locks
            .acquire(tenant, &RowKey::Ledger, 2, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Concurrency(_)));
    }

    #[test]
    fn same_row_in_other_tenant_is_independent() {
        let locks = RowLocks::new();
        locks
            .acquire(TenantId::new(), &RowKey::Ledger, 1, Duration::from_millis(10))
            .unwrap();
        locks
            .acquire(TenantId::new(), &RowKey::Ledger, 2, Duration::from_millis(10))
            .unwrap();
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let locks = Arc::new(RowLocks::new());
        let tenant = TenantId::new();
        locks
            .acquire(tenant, &RowKey::Ledger, 1, Duration::from_millis(10))
            .unwrap();

        let waiter = {
            let locks = locks.clone();
            thread::spawn(move || locks.acquire(tenant, &RowKey::Ledger, 2, Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        locks.release(tenant, &[RowKey::Ledger], 1);

        assert!(waiter.join().unwrap().is_ok());
        assert!(locks.is_locked(tenant, &RowKey::Ledger));
    }

    #[test]
    fn documents_sort_before_stock_and_ledger_last() {
        let mut keys = vec![
            RowKey::Ledger,
            RowKey::CostLayers(ProductId::new(), WarehouseId::new()),
            RowKey::Document(AggregateId::new()),
        ];
        keys.sort();
        assert!(matches!(keys[0], RowKey::Document(_)));
        assert!(matches!(keys[2], RowKey::Ledger));
    }
}
