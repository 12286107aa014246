use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockwise_core::{AggregateId, ExpectedVersion, TenantId, UserId};
use stockwise_events::{Event, EventEnvelope};

/// A committed audit record. Sequence numbers never change once assigned.
pub type StoredEvent = EventEnvelope<JsonValue>;

/// One event waiting for a sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub schema_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<UserId>,
    pub payload: JsonValue,
}

impl PendingEvent {
    pub fn from_typed<E>(actor: Option<UserId>, event: &E) -> Result<Self, EventStoreError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::Payload(format!("{}: {e}", event.event_type())))?;
        Ok(Self {
            event_id: Uuid::now_v7(),
            event_type: event.event_type().to_string(),
            schema_version: event.schema_version(),
            occurred_at: event.occurred_at(),
            actor,
            payload,
        })
    }
}

/// Events for a single document stream, appended as a unit.
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub tenant_id: TenantId,
    pub aggregate_type: &'static str,
    pub aggregate_id: AggregateId,
    pub expected: ExpectedVersion,
    pub events: Vec<PendingEvent>,
}

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("stream {aggregate_id} is at version {actual}, expected {expected:?}")]
    Concurrency {
        aggregate_id: AggregateId,
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("stream {aggregate_id} holds '{stored}' events, not '{attempted}'")]
    StreamTypeMismatch {
        aggregate_id: AggregateId,
        stored: String,
        attempted: String,
    },

    #[error("unserializable payload for {0}")]
    Payload(String),

    #[error("audit store unavailable: {0}")]
    Unavailable(String),
}

/// Tenant-scoped, append-only audit store.
///
/// `append` checks `expected` against the stream's last sequence number,
/// numbers the batch from `current + 1` without gaps and stores all of it or
/// none of it.
pub trait EventStore: Send + Sync {
    fn append(&self, batch: StreamAppend) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Oldest first; empty for a document that was never saved.
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Last sequence number, 0 for an empty stream.
    fn stream_version(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<u64, EventStoreError>;
}
