//! `stockwise-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, exact decimal value objects, tenant scoping and the error taxonomy
//! shared by the inventory and accounting modules.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod source;
pub mod tenant;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, ProductId, TenantId, UserId, WarehouseId};
pub use source::SourceDocument;
pub use tenant::{AuditStamp, Tenanted};
pub use value_object::{Money, Quantity, ValueObject};
