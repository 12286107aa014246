//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, stock shortfalls, posting rules). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found within the tenant.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,

    /// Cost layers (or on-hand stock) cannot cover the requested quantity.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: Decimal, available: Decimal },

    /// Unreserved stock cannot cover the requested quantity.
    #[error("insufficient available stock: requested {requested}, available {available}")]
    InsufficientAvailableStock { requested: Decimal, available: Decimal },

    /// A document action is not allowed from the document's current state.
    #[error("cannot {action} a document in status {from}")]
    InvalidTransition { from: String, action: String },

    /// Journal debits and credits differ. Never rounded away.
    #[error("journal entry does not balance: debits {debits}, credits {credits}")]
    PostingImbalance { debits: Decimal, credits: Decimal },

    /// A journal entry already exists for this source document.
    #[error("journal entry already posted for source {0}")]
    DuplicatePosting(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn insufficient_stock(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn insufficient_available(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientAvailableStock {
            requested,
            available,
        }
    }

    pub fn invalid_transition(from: impl core::fmt::Display, action: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            action: action.into(),
        }
    }

    /// Stable machine-readable code, used by transport layers.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "concurrency_conflict",
            DomainError::Unauthorized => "unauthorized",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::InsufficientAvailableStock { .. } => "insufficient_available_stock",
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::PostingImbalance { .. } => "posting_imbalance",
            DomainError::DuplicatePosting(_) => "duplicate_posting",
        }
    }
}
