//! Per-tenant document numbering.
//!
//! Numbers are handed out outside the transaction, like database sequences:
//! a rolled-back transaction leaves a gap, never a duplicate.

use std::collections::HashMap;
use std::sync::Mutex;

use stockwise_core::TenantId;

use crate::error::{ServiceError, ServiceResult};

pub const RESERVATION: &str = "RSV";
pub const ADJUSTMENT: &str = "ADJ";
pub const TRANSFER: &str = "TRF";
pub const JOURNAL_ENTRY: &str = "JE";
pub const LANDED_COST: &str = "LC";
/// Creation order of cost layers (tie-breaker for equal acquisition dates).
pub const COST_LAYER: &str = "cost_layer";

#[derive(Debug, Default)]
pub struct Sequences {
    counters: Mutex<HashMap<(TenantId, &'static str), u64>>,
}

impl Sequences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_value(&self, tenant_id: TenantId, name: &'static str) -> ServiceResult<u64> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| ServiceError::poisoned("sequence"))?;
        let counter = counters.entry((tenant_id, name)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    /// Formatted document number, e.g. `ADJ-000042`.
    pub fn next_number(&self, tenant_id: TenantId, prefix: &'static str) -> ServiceResult<String> {
        let n = self.next_value(tenant_id, prefix)?;
        Ok(format!("{prefix}-{n:06}"))
    }
}
