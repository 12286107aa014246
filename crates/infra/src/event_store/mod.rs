//! Append-only audit trail of document events.
//!
//! Every document aggregate (reservation, adjustment, transfer, ledger) keeps one
//! tenant-scoped stream. Streams are appended by the transaction that saves the
//! document, so the stream length always equals the document's version.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, PendingEvent, StoredEvent, StreamAppend};
