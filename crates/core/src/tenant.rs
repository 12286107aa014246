//! Tenant scoping and audit metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{TenantId, UserId};

/// A row owned by exactly one tenant.
///
/// Every persisted record is wrapped (or carries a `tenant_id` field) so that
/// no read or write can cross a tenant boundary unnoticed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenanted<T> {
    pub tenant_id: TenantId,
    pub value: T,
}

impl<T> Tenanted<T> {
    pub fn new(tenant_id: TenantId, value: T) -> Self {
        Self { tenant_id, value }
    }

    /// Borrow the value if it belongs to `tenant_id`.
    pub fn for_tenant(&self, tenant_id: TenantId) -> DomainResult<&T> {
        if self.tenant_id != tenant_id {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(&self.value)
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Who touched a record, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<UserId>,
}

impl AuditStamp {
    pub fn new(at: DateTime<Utc>, by: Option<UserId>) -> Self {
        Self {
            created_at: at,
            created_by: by,
            updated_at: at,
            updated_by: by,
        }
    }

    pub fn touch(&mut self, at: DateTime<Utc>, by: Option<UserId>) {
        self.updated_at = at;
        if by.is_some() {
            self.updated_by = by;
        }
    }
}
