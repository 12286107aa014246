use std::collections::HashMap;
use std::sync::RwLock;

use stockwise_core::{AggregateId, TenantId};
use stockwise_events::{EventEnvelope, StreamPosition};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend};

type Streams = HashMap<(TenantId, AggregateId), Vec<StoredEvent>>;

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<Streams>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&Streams) -> R) -> Result<R, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Unavailable("stream lock poisoned".into()))?;
        Ok(f(&streams))
    }
}

fn last_sequence(stream: &[StoredEvent]) -> u64 {
    stream.last().map_or(0, |e| e.position.sequence)
}

impl EventStore for InMemoryEventStore {
    fn append(&self, batch: StreamAppend) -> Result<Vec<StoredEvent>, EventStoreError> {
        if batch.events.is_empty() {
            return Ok(Vec::new());
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Unavailable("stream lock poisoned".into()))?;
        let stream = streams
            .entry((batch.tenant_id, batch.aggregate_id))
            .or_default();

        let current = last_sequence(stream);
        if !batch.expected.matches(current) {
            return Err(EventStoreError::Concurrency {
                aggregate_id: batch.aggregate_id,
                expected: batch.expected,
                actual: current,
            });
        }
        if let Some(first) = stream.first() {
            if first.position.aggregate_type != batch.aggregate_type {
                return Err(EventStoreError::StreamTypeMismatch {
                    aggregate_id: batch.aggregate_id,
                    stored: first.position.aggregate_type.clone(),
                    attempted: batch.aggregate_type.to_string(),
                });
            }
        }

        let committed: Vec<StoredEvent> = batch
            .events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, sequence)| EventEnvelope {
                event_id: e.event_id,
                position: StreamPosition {
                    tenant_id: batch.tenant_id,
                    aggregate_type: batch.aggregate_type.to_string(),
                    aggregate_id: batch.aggregate_id,
                    sequence,
                },
                event_type: e.event_type,
                schema_version: e.schema_version,
                occurred_at: e.occurred_at,
                actor: e.actor,
                payload: e.payload,
            })
            .collect();
        stream.extend(committed.iter().cloned());
        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.read(|s| s.get(&(tenant_id, aggregate_id)).cloned().unwrap_or_default())
    }

    fn stream_version(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<u64, EventStoreError> {
        self.read(|s| s.get(&(tenant_id, aggregate_id)).map_or(0, |v| last_sequence(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::PendingEvent;
    use chrono::Utc;
    use serde_json::json;
    use stockwise_core::ExpectedVersion;
    use uuid::Uuid;

    fn pending(event_type: &str) -> PendingEvent {
        PendingEvent {
            event_id: Uuid::now_v7(),
            event_type: event_type.to_string(),
            schema_version: 1,
            occurred_at: Utc::now(),
            actor: None,
            payload: json!({}),
        }
    }

    fn batch(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        expected: ExpectedVersion,
        types: &[&str],
    ) -> StreamAppend {
        StreamAppend {
            tenant_id,
            aggregate_type,
            aggregate_id,
            expected,
            events: types.iter().map(|t| pending(t)).collect(),
        }
    }

    #[test]
    fn sequence_numbers_continue_across_appends() {
        let store = InMemoryEventStore::new();
        let (tenant, doc) = (TenantId::new(), AggregateId::new());
        let adj = "inventory.adjustment";

        store
            .append(batch(tenant, doc, adj, ExpectedVersion::Exact(0), &["created", "submitted"]))
            .unwrap();
        let stored = store
            .append(batch(tenant, doc, adj, ExpectedVersion::Exact(2), &["approved"]))
            .unwrap();

        assert_eq!(stored[0].position.sequence, 3);
        assert_eq!(store.stream_version(tenant, doc).unwrap(), 3);
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let store = InMemoryEventStore::new();
        let (tenant, doc) = (TenantId::new(), AggregateId::new());
        let adj = "inventory.adjustment";
        store
            .append(batch(tenant, doc, adj, ExpectedVersion::Exact(0), &["created"]))
            .unwrap();

        let err = store
            .append(batch(tenant, doc, adj, ExpectedVersion::Exact(0), &["approved"]))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency { actual: 1, .. }));
        assert_eq!(store.load_stream(tenant, doc).unwrap().len(), 1);
    }

    #[test]
    fn streams_are_tenant_scoped() {
        let store = InMemoryEventStore::new();
        let doc = AggregateId::new();
        let tenant_a = TenantId::new();
        store
            .append(batch(tenant_a, doc, "inventory.transfer", ExpectedVersion::Any, &["created"]))
            .unwrap();

        assert!(store.load_stream(TenantId::new(), doc).unwrap().is_empty());
        assert_eq!(store.load_stream(tenant_a, doc).unwrap().len(), 1);
    }

    #[test]
    fn a_stream_keeps_its_document_type() {
        let store = InMemoryEventStore::new();
        let (tenant, doc) = (TenantId::new(), AggregateId::new());
        store
            .append(batch(tenant, doc, "inventory.transfer", ExpectedVersion::Any, &["created"]))
            .unwrap();
        let err = store
            .append(batch(tenant, doc, "inventory.reservation", ExpectedVersion::Any, &["created"]))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::StreamTypeMismatch { .. }));
    }
}
