//! Audit-trail vocabulary: the [`Event`] trait document aggregates implement,
//! and the [`EventEnvelope`] their history is read back as.

pub mod envelope;
pub mod event;

pub use envelope::{EventEnvelope, StreamPosition};
pub use event::Event;
