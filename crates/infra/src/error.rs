//! Service-level error: domain failures plus what can go wrong around them.

use thiserror::Error;

use stockwise_core::DomainError;

use crate::event_store::EventStoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A row lock could not be taken in time, or a document changed under us.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Cross-tenant access attempted.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("store failure: {0}")]
    Store(String),
}

/// Coarse classification used for logging and transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    BusinessRule,
    NotFound,
    Conflict,
    Forbidden,
    /// Blocks the commit outright; never rounded or retried away.
    Fatal,
    Internal,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Domain(e) => match e {
                DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorKind::Validation,
                DomainError::NotFound(_) => ErrorKind::NotFound,
                DomainError::Conflict(_) | DomainError::DuplicatePosting(_) => ErrorKind::Conflict,
                DomainError::Unauthorized => ErrorKind::Forbidden,
                DomainError::InsufficientStock { .. }
                | DomainError::InsufficientAvailableStock { .. }
                | DomainError::InvalidTransition { .. } => ErrorKind::BusinessRule,
                DomainError::PostingImbalance { .. } | DomainError::InvariantViolation(_) => {
                    ErrorKind::Fatal
                }
            },
            ServiceError::Concurrency(_) => ErrorKind::Conflict,
            ServiceError::TenantIsolation(_) => ErrorKind::Forbidden,
            ServiceError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Domain(e) => e.code(),
            ServiceError::Concurrency(_) => "concurrency_conflict",
            ServiceError::TenantIsolation(_) => "tenant_isolation",
            ServiceError::Store(_) => "internal_error",
        }
    }

    /// Safe to retry the whole operation from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Concurrency(_) | ServiceError::Domain(DomainError::Conflict(_))
        )
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        ServiceError::Store(format!("{what} lock poisoned"))
    }
}

impl From<EventStoreError> for ServiceError {
    fn from(value: EventStoreError) -> Self {
        match value {
            e @ EventStoreError::Concurrency { .. } => ServiceError::Concurrency(e.to_string()),
            other => ServiceError::Store(other.to_string()),
        }
    }
}
