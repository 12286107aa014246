//! Stock reservation document: holds available stock for a fixed time until it
//! is released, fulfilled or swept as expired.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::{
    Aggregate, AggregateRoot, DomainError, Quantity, TenantId, UserId,
};
use stockwise_events::Event;

use crate::ids::ReservationId;
use crate::stock::StockKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Fulfilled,
    Released,
    Expired,
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Fulfilled => "fulfilled",
            Self::Released => "released",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    pub key: StockKey,
    pub quantity: Quantity,
    pub quantity_fulfilled: Quantity,
}

/// Aggregate root: StockReservation.
///
/// Holds stock for an order (or any caller-supplied reference) until it is
/// fulfilled, released, or expires. The stock item side of each transition is
/// applied by the reservation service in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservation {
    id: ReservationId,
    tenant_id: Option<TenantId>,
    number: String,
    reference: Option<String>,
    lines: Vec<ReservationLine>,
    status: ReservationStatus,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    created_by: Option<UserId>,
    closed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl StockReservation {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ReservationId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            reference: None,
            lines: Vec::new(),
            status: ReservationStatus::Active,
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            created_by: None,
            closed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReservationId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn lines(&self) -> &[ReservationLine] {
        &self.lines
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Active and past its expiry instant.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && self.expires_at <= now
    }
}

impl AggregateRoot for StockReservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateReservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReservation {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub number: String,
    pub reference: Option<String>,
    pub lines: Vec<(StockKey, Quantity)>,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationCommand {
    Create(CreateReservation),
    Release {
        tenant_id: TenantId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
        actor: Option<UserId>,
    },
    /// `quantities[i]` is the actual quantity shipped for `lines[i]`.
    Fulfill {
        tenant_id: TenantId,
        quantities: Vec<Quantity>,
        occurred_at: DateTime<Utc>,
        actor: Option<UserId>,
    },
    Expire {
        tenant_id: TenantId,
        now: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCreated {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub number: String,
    pub reference: Option<String>,
    pub lines: Vec<(StockKey, Quantity)>,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationEvent {
    Created(ReservationCreated),
    Released {
        tenant_id: TenantId,
        reservation_id: ReservationId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    Fulfilled {
        tenant_id: TenantId,
        reservation_id: ReservationId,
        quantities: Vec<Quantity>,
        occurred_at: DateTime<Utc>,
    },
    Expired {
        tenant_id: TenantId,
        reservation_id: ReservationId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ReservationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReservationEvent::Created(_) => "inventory.reservation.created",
            ReservationEvent::Released { .. } => "inventory.reservation.released",
            ReservationEvent::Fulfilled { .. } => "inventory.reservation.fulfilled",
            ReservationEvent::Expired { .. } => "inventory.reservation.expired",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReservationEvent::Created(e) => e.occurred_at,
            ReservationEvent::Released { occurred_at, .. }
            | ReservationEvent::Fulfilled { occurred_at, .. }
            | ReservationEvent::Expired { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for StockReservation {
    type Command = ReservationCommand;
    type Event = ReservationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReservationEvent::Created(e) => {
                self.id = e.reservation_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.reference = e.reference.clone();
                self.lines = e
                    .lines
                    .iter()
                    .map(|(key, quantity)| ReservationLine {
                        key: key.clone(),
                        quantity: *quantity,
                        quantity_fulfilled: Quantity::ZERO,
                    })
                    .collect();
                self.status = ReservationStatus::Active;
                self.expires_at = e.expires_at;
                self.created_at = e.occurred_at;
                self.created_by = e.actor;
                self.created = true;
            }
            ReservationEvent::Released { occurred_at, .. } => {
                self.status = ReservationStatus::Released;
                self.closed_at = Some(*occurred_at);
            }
            ReservationEvent::Fulfilled {
                quantities,
                occurred_at,
                ..
            } => {
                for (line, actual) in self.lines.iter_mut().zip(quantities) {
                    line.quantity_fulfilled = *actual;
                }
                self.status = ReservationStatus::Fulfilled;
                self.closed_at = Some(*occurred_at);
            }
            ReservationEvent::Expired { occurred_at, .. } => {
                self.status = ReservationStatus::Expired;
                self.closed_at = Some(*occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReservationCommand::Create(cmd) => self.handle_create(cmd),
            ReservationCommand::Release {
                tenant_id,
                reason,
                occurred_at,
                ..
            } => {
                self.ensure_active(*tenant_id, "release")?;
                Ok(vec![ReservationEvent::Released {
                    tenant_id: *tenant_id,
                    reservation_id: self.id,
                    reason: reason.clone(),
                    occurred_at: *occurred_at,
                }])
            }
            ReservationCommand::Fulfill {
                tenant_id,
                quantities,
                occurred_at,
                ..
            } => self.handle_fulfill(*tenant_id, quantities, *occurred_at),
            ReservationCommand::Expire { tenant_id, now } => {
                self.ensure_active(*tenant_id, "expire")?;
                if self.expires_at > *now {
                    return Err(DomainError::validation(format!(
                        "reservation {} does not expire until {}",
                        self.number, self.expires_at
                    )));
                }
                Ok(vec![ReservationEvent::Expired {
                    tenant_id: *tenant_id,
                    reservation_id: self.id,
                    occurred_at: *now,
                }])
            }
        }
    }
}

impl StockReservation {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("reservation {}", self.id)));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_active(&self, tenant_id: TenantId, action: &str) -> Result<(), DomainError> {
        self.ensure_tenant(tenant_id)?;
        if self.status != ReservationStatus::Active {
            return Err(DomainError::invalid_transition(self.status, action));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateReservation) -> Result<Vec<ReservationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("reservation already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("reservation needs at least one line"));
        }
        let mut seen = HashSet::new();
        for (key, quantity) in &cmd.lines {
            if !quantity.is_positive() {
                return Err(DomainError::validation(format!(
                    "reserved quantity for {key} must be positive"
                )));
            }
            if !seen.insert(key) {
                return Err(DomainError::validation(format!(
                    "stock item {key} appears more than once"
                )));
            }
        }
        if cmd.expires_at <= cmd.occurred_at {
            return Err(DomainError::validation("expiry must be in the future"));
        }

        Ok(vec![ReservationEvent::Created(ReservationCreated {
            tenant_id: cmd.tenant_id,
            reservation_id: cmd.reservation_id,
            number: cmd.number.clone(),
            reference: cmd.reference.clone(),
            lines: cmd.lines.clone(),
            expires_at: cmd.expires_at,
            occurred_at: cmd.occurred_at,
            actor: cmd.actor,
        })])
    }

    fn handle_fulfill(
        &self,
        tenant_id: TenantId,
        quantities: &[Quantity],
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<ReservationEvent>, DomainError> {
        self.ensure_active(tenant_id, "fulfill")?;
        // Past expiry the hold is only waiting for the sweep.
        if self.is_due(occurred_at) {
            return Err(DomainError::invalid_transition(
                format!("active (expired at {})", self.expires_at),
                "fulfill",
            ));
        }
        if quantities.len() != self.lines.len() {
            return Err(DomainError::validation(format!(
                "expected {} fulfilled quantities, got {}",
                self.lines.len(),
                quantities.len()
            )));
        }
        for (line, actual) in self.lines.iter().zip(quantities) {
            if actual.is_negative() {
                return Err(DomainError::validation("fulfilled quantity cannot be negative"));
            }
            if *actual > line.quantity {
                return Err(DomainError::validation(format!(
                    "fulfilled quantity {actual} exceeds reserved {} for {}",
                    line.quantity, line.key
                )));
            }
        }

        Ok(vec![ReservationEvent::Fulfilled {
            tenant_id,
            reservation_id: self.id,
            quantities: quantities.to_vec(),
            occurred_at,
        }])
    }
}
