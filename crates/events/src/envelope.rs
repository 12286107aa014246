use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockwise_core::{AggregateId, TenantId, UserId};

/// Where an audit record sits: one document's stream inside one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPosition {
    pub tenant_id: TenantId,
    pub aggregate_type: String,
    pub aggregate_id: AggregateId,
    /// 1-based, gap-free within the stream.
    pub sequence: u64,
}

/// One audit record as read back from a document's history.
///
/// The payload stays raw JSON until a reader asks for a concrete event type
/// with [`EventEnvelope::decode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<P = JsonValue> {
    pub event_id: Uuid,
    pub position: StreamPosition,
    pub event_type: String,
    pub schema_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<UserId>,
    pub payload: P,
}

impl<P> EventEnvelope<P> {
    pub fn tenant_id(&self) -> TenantId {
        self.position.tenant_id
    }

    pub fn belongs_to(&self, tenant_id: TenantId) -> bool {
        self.position.tenant_id == tenant_id
    }

    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> EventEnvelope<Q> {
        EventEnvelope {
            event_id: self.event_id,
            position: self.position,
            event_type: self.event_type,
            schema_version: self.schema_version,
            occurred_at: self.occurred_at,
            actor: self.actor,
            payload: f(self.payload),
        }
    }
}

impl EventEnvelope<JsonValue> {
    pub fn decode<E: DeserializeOwned>(&self) -> Result<EventEnvelope<E>, serde_json::Error> {
        let payload = E::deserialize(&self.payload)?;
        Ok(self.clone().map_payload(|_| payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    enum Fake {
        Shipped { carrier: String },
    }

    fn record(payload: JsonValue) -> EventEnvelope {
        EventEnvelope {
            event_id: Uuid::now_v7(),
            position: StreamPosition {
                tenant_id: TenantId::new(),
                aggregate_type: "inventory.transfer".into(),
                aggregate_id: AggregateId::new(),
                sequence: 3,
            },
            event_type: "inventory.transfer.shipped".into(),
            schema_version: 1,
            occurred_at: Utc::now(),
            actor: None,
            payload,
        }
    }

    #[test]
    fn decode_keeps_position_and_types_the_payload() {
        let raw = record(json!({ "Shipped": { "carrier": "DHL" } }));
        let typed = raw.decode::<Fake>().unwrap();
        assert_eq!(typed.position, raw.position);
        assert_eq!(typed.payload, Fake::Shipped { carrier: "DHL".into() });
        assert!(typed.belongs_to(raw.tenant_id()));
        assert!(!typed.belongs_to(TenantId::new()));
    }

    #[test]
    fn decode_reports_shape_mismatch() {
        assert!(record(json!({ "Lost": {} })).decode::<Fake>().is_err());
    }
}
