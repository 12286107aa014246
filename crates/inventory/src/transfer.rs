use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::{
    Aggregate, AggregateRoot, DomainError, Money, ProductId, Quantity, TenantId, UserId,
    WarehouseId,
};
use stockwise_events::Event;

use crate::ids::TransferId;
use crate::policy::ApprovalPolicy;
use crate::stock::StockKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    InTransit,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Cancelled)
    }
}

impl core::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InTransit => "in_transit",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    pub quantity_requested: Quantity,
    pub quantity_received: Quantity,
    pub quantity_damaged: Quantity,
    /// Average cost drawn from the source layers; set on completion.
    pub unit_cost: Option<Money>,
}

impl TransferLine {
    pub fn new(product_id: ProductId, quantity: Quantity) -> Self {
        Self {
            product_id,
            batch: None,
            quantity_requested: quantity,
            quantity_received: Quantity::ZERO,
            quantity_damaged: Quantity::ZERO,
            unit_cost: None,
        }
    }

    pub fn key_at(&self, warehouse_id: WarehouseId) -> StockKey {
        StockKey {
            product_id: self.product_id,
            warehouse_id,
            batch: self.batch.clone(),
        }
    }

    /// Quantity that left the source but never reached the destination.
    pub fn quantity_written_off(&self) -> Quantity {
        self.quantity_requested - self.quantity_received
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub shipped_at: DateTime<Utc>,
}

/// What arrived for one transfer line, in line order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub quantity_received: Quantity,
    pub quantity_damaged: Quantity,
    /// Filled by the service from the cost layers it consumed.
    pub unit_cost: Money,
}

/// Aggregate root: StockTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransfer {
    id: TransferId,
    tenant_id: Option<TenantId>,
    number: String,
    source_warehouse_id: WarehouseId,
    destination_warehouse_id: WarehouseId,
    lines: Vec<TransferLine>,
    estimated_value: Money,
    notes: Option<String>,
    status: TransferStatus,
    requires_approval: bool,
    approved_by: Option<UserId>,
    rejection_reason: Option<String>,
    shipment: Option<Shipment>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl StockTransfer {
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            source_warehouse_id: WarehouseId::default(),
            destination_warehouse_id: WarehouseId::default(),
            lines: Vec::new(),
            estimated_value: Money::ZERO,
            notes: None,
            status: TransferStatus::Draft,
            requires_approval: false,
            approved_by: None,
            rejection_reason: None,
            shipment: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn source_warehouse_id(&self) -> WarehouseId {
        self.source_warehouse_id
    }

    pub fn destination_warehouse_id(&self) -> WarehouseId {
        self.destination_warehouse_id
    }

    pub fn lines(&self) -> &[TransferLine] {
        &self.lines
    }

    pub fn estimated_value(&self) -> Money {
        self.estimated_value
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    pub fn shipment(&self) -> Option<&Shipment> {
        self.shipment.as_ref()
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

impl AggregateRoot for StockTransfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub number: String,
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub lines: Vec<TransferLine>,
    /// Valued at the source's current cost by the caller.
    pub estimated_value: Money,
    pub notes: Option<String>,
    pub policy: ApprovalPolicy,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    Create(CreateTransfer),
    Approve {
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
        actor: Option<UserId>,
    },
    Reject {
        tenant_id: TenantId,
        reason: String,
        occurred_at: DateTime<Utc>,
        actor: Option<UserId>,
    },
    Ship {
        tenant_id: TenantId,
        carrier: Option<String>,
        tracking_number: Option<String>,
        occurred_at: DateTime<Utc>,
        actor: Option<UserId>,
    },
    Receive {
        tenant_id: TenantId,
        lines: Vec<ReceiptLine>,
        occurred_at: DateTime<Utc>,
        actor: Option<UserId>,
    },
    Cancel {
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
        actor: Option<UserId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCreated {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub number: String,
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub lines: Vec<TransferLine>,
    pub estimated_value: Money,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    Created(TransferCreated),
    SubmittedForApproval {
        tenant_id: TenantId,
        transfer_id: TransferId,
        occurred_at: DateTime<Utc>,
    },
    Approved {
        tenant_id: TenantId,
        transfer_id: TransferId,
        approved_by: Option<UserId>,
        automatic: bool,
        occurred_at: DateTime<Utc>,
    },
    Rejected {
        tenant_id: TenantId,
        transfer_id: TransferId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    Shipped {
        tenant_id: TenantId,
        transfer_id: TransferId,
        shipment: Shipment,
    },
    Received {
        tenant_id: TenantId,
        transfer_id: TransferId,
        lines: Vec<ReceiptLine>,
        occurred_at: DateTime<Utc>,
        actor: Option<UserId>,
    },
    Cancelled {
        tenant_id: TenantId,
        transfer_id: TransferId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::Created(_) => "inventory.transfer.created",
            TransferEvent::SubmittedForApproval { .. } => "inventory.transfer.submitted",
            TransferEvent::Approved { .. } => "inventory.transfer.approved",
            TransferEvent::Rejected { .. } => "inventory.transfer.rejected",
            TransferEvent::Shipped { .. } => "inventory.transfer.shipped",
            TransferEvent::Received { .. } => "inventory.transfer.received",
            TransferEvent::Cancelled { .. } => "inventory.transfer.cancelled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::Created(e) => e.occurred_at,
            TransferEvent::Shipped { shipment, .. } => shipment.shipped_at,
            TransferEvent::SubmittedForApproval { occurred_at, .. }
            | TransferEvent::Approved { occurred_at, .. }
            | TransferEvent::Rejected { occurred_at, .. }
            | TransferEvent::Received { occurred_at, .. }
            | TransferEvent::Cancelled { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for StockTransfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::Created(e) => {
                self.id = e.transfer_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.source_warehouse_id = e.source_warehouse_id;
                self.destination_warehouse_id = e.destination_warehouse_id;
                self.lines = e.lines.clone();
                self.estimated_value = e.estimated_value;
                self.notes = e.notes.clone();
                self.status = TransferStatus::Draft;
                self.created_at = e.occurred_at;
                self.created = true;
            }
            TransferEvent::SubmittedForApproval { .. } => {
                self.status = TransferStatus::PendingApproval;
                self.requires_approval = true;
            }
            TransferEvent::Approved { approved_by, .. } => {
                self.status = TransferStatus::Approved;
                self.approved_by = *approved_by;
            }
            TransferEvent::Rejected { reason, .. } => {
                self.status = TransferStatus::Rejected;
                self.rejection_reason = Some(reason.clone());
            }
            TransferEvent::Shipped { shipment, .. } => {
                self.status = TransferStatus::InTransit;
                self.shipment = Some(shipment.clone());
            }
            TransferEvent::Received {
                lines, occurred_at, ..
            } => {
                for (line, receipt) in self.lines.iter_mut().zip(lines) {
                    line.quantity_received = receipt.quantity_received;
                    line.quantity_damaged = receipt.quantity_damaged;
                    line.unit_cost = Some(receipt.unit_cost);
                }
                self.status = TransferStatus::Completed;
                self.completed_at = Some(*occurred_at);
            }
            TransferEvent::Cancelled { .. } => {
                self.status = TransferStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::Create(cmd) => self.handle_create(cmd),
            TransferCommand::Approve {
                tenant_id,
                occurred_at,
                actor,
            } => {
                self.ensure_status(*tenant_id, &[TransferStatus::PendingApproval], "approve")?;
                Ok(vec![TransferEvent::Approved {
                    tenant_id: *tenant_id,
                    transfer_id: self.id,
                    approved_by: *actor,
                    automatic: false,
                    occurred_at: *occurred_at,
                }])
            }
            TransferCommand::Reject {
                tenant_id,
                reason,
                occurred_at,
                ..
            } => {
                self.ensure_status(*tenant_id, &[TransferStatus::PendingApproval], "reject")?;
                if reason.trim().is_empty() {
                    return Err(DomainError::validation("a rejection reason is required"));
                }
                Ok(vec![TransferEvent::Rejected {
                    tenant_id: *tenant_id,
                    transfer_id: self.id,
                    reason: reason.clone(),
                    occurred_at: *occurred_at,
                }])
            }
            TransferCommand::Ship {
                tenant_id,
                carrier,
                tracking_number,
                occurred_at,
                ..
            } => {
                self.ensure_status(*tenant_id, &[TransferStatus::Approved], "ship")?;
                Ok(vec![TransferEvent::Shipped {
                    tenant_id: *tenant_id,
                    transfer_id: self.id,
                    shipment: Shipment {
                        carrier: carrier.clone(),
                        tracking_number: tracking_number.clone(),
                        shipped_at: *occurred_at,
                    },
                }])
            }
            TransferCommand::Receive {
                tenant_id,
                lines,
                occurred_at,
                actor,
            } => {
                self.ensure_status(
                    *tenant_id,
                    &[TransferStatus::Approved, TransferStatus::InTransit],
                    "receive",
                )?;
                self.validate_receipt(lines)?;
                Ok(vec![TransferEvent::Received {
                    tenant_id: *tenant_id,
                    transfer_id: self.id,
                    lines: lines.clone(),
                    occurred_at: *occurred_at,
                    actor: *actor,
                }])
            }
            TransferCommand::Cancel {
                tenant_id,
                occurred_at,
                ..
            } => {
                self.ensure_status(
                    *tenant_id,
                    &[
                        TransferStatus::Draft,
                        TransferStatus::PendingApproval,
                        TransferStatus::Approved,
                    ],
                    "cancel",
                )?;
                Ok(vec![TransferEvent::Cancelled {
                    tenant_id: *tenant_id,
                    transfer_id: self.id,
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

impl StockTransfer {
    fn ensure_status(
        &self,
        tenant_id: TenantId,
        allowed: &[TransferStatus],
        action: &str,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("transfer {}", self.id)));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if !allowed.contains(&self.status) {
            return Err(DomainError::invalid_transition(self.status, action));
        }
        Ok(())
    }

    fn validate_receipt(&self, lines: &[ReceiptLine]) -> Result<(), DomainError> {
        if lines.len() != self.lines.len() {
            return Err(DomainError::validation(format!(
                "expected {} receipt lines, got {}",
                self.lines.len(),
                lines.len()
            )));
        }
        for (line, receipt) in self.lines.iter().zip(lines) {
            if receipt.quantity_received.is_negative() || receipt.quantity_damaged.is_negative() {
                return Err(DomainError::validation("received quantities cannot be negative"));
            }
            if receipt.quantity_received > line.quantity_requested {
                return Err(DomainError::validation(format!(
                    "received {} exceeds requested {} for product {}",
                    receipt.quantity_received, line.quantity_requested, line.product_id
                )));
            }
            if receipt.quantity_damaged > line.quantity_requested - receipt.quantity_received {
                return Err(DomainError::validation(format!(
                    "damaged quantity for product {} exceeds what did not arrive",
                    line.product_id
                )));
            }
            if receipt.unit_cost.is_negative() {
                return Err(DomainError::validation("unit cost cannot be negative"));
            }
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("transfer already exists"));
        }
        if cmd.source_warehouse_id == cmd.destination_warehouse_id {
            return Err(DomainError::validation(
                "source and destination warehouses must differ",
            ));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("transfer needs at least one line"));
        }
        let mut seen = std::collections::HashSet::new();
        for line in &cmd.lines {
            if !line.quantity_requested.is_positive() {
                return Err(DomainError::validation(format!(
                    "requested quantity for product {} must be positive",
                    line.product_id
                )));
            }
            if !seen.insert((line.product_id, line.batch.clone())) {
                return Err(DomainError::validation(format!(
                    "product {} appears twice",
                    line.product_id
                )));
            }
        }

        let lines = cmd
            .lines
            .iter()
            .map(|l| TransferLine {
                quantity_received: Quantity::ZERO,
                quantity_damaged: Quantity::ZERO,
                unit_cost: None,
                ..l.clone()
            })
            .collect();

        let mut events = vec![TransferEvent::Created(TransferCreated {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            number: cmd.number.clone(),
            source_warehouse_id: cmd.source_warehouse_id,
            destination_warehouse_id: cmd.destination_warehouse_id,
            lines,
            estimated_value: cmd.estimated_value,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
            actor: cmd.actor,
        })];

        if cmd.policy.transfer_requires_approval(cmd.estimated_value) {
            events.push(TransferEvent::SubmittedForApproval {
                tenant_id: cmd.tenant_id,
                transfer_id: cmd.transfer_id,
                occurred_at: cmd.occurred_at,
            });
        } else {
            events.push(TransferEvent::Approved {
                tenant_id: cmd.tenant_id,
                transfer_id: cmd.transfer_id,
                approved_by: None,
                automatic: true,
                occurred_at: cmd.occurred_at,
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn created(tenant: TenantId, value: rust_decimal::Decimal) -> StockTransfer {
        let id = TransferId::generate();
        let mut t = StockTransfer::empty(id);
        t.execute(&TransferCommand::Create(CreateTransfer {
            tenant_id: tenant,
            transfer_id: id,
            number: "TRF-000001".into(),
            source_warehouse_id: WarehouseId::new(),
            destination_warehouse_id: WarehouseId::new(),
            lines: vec![TransferLine::new(ProductId::new(), Quantity::from(10))],
            estimated_value: Money::new(value),
            notes: None,
            policy: ApprovalPolicy::new(Money::new(dec!(1000))),
            occurred_at: Utc::now(),
            actor: None,
        }))
        .unwrap();
        t
    }

    fn receive(tenant: TenantId, received: i64, damaged: i64) -> TransferCommand {
        TransferCommand::Receive {
            tenant_id: tenant,
            lines: vec![ReceiptLine {
                quantity_received: Quantity::from(received),
                quantity_damaged: Quantity::from(damaged),
                unit_cost: Money::new(dec!(4)),
            }],
            occurred_at: Utc::now(),
            actor: None,
        }
    }

    #[test]
    fn same_warehouse_transfer_is_rejected() {
        let wh = WarehouseId::new();
        let id = TransferId::generate();
        let cmd = TransferCommand::Create(CreateTransfer {
            tenant_id: TenantId::new(),
            transfer_id: id,
            number: "TRF-000001".into(),
            source_warehouse_id: wh,
            destination_warehouse_id: wh,
            lines: vec![TransferLine::new(ProductId::new(), Quantity::from(1))],
            estimated_value: Money::ZERO,
            notes: None,
            policy: ApprovalPolicy::new(Money::new(dec!(1000))),
            occurred_at: Utc::now(),
            actor: None,
        });
        assert!(StockTransfer::empty(id).handle(&cmd).is_err());
    }

    #[test]
    fn ship_then_receive_with_damage() {
        let tenant = TenantId::new();
        let mut t = created(tenant, dec!(40));
        assert_eq!(t.status(), TransferStatus::Approved);

        t.execute(&TransferCommand::Ship {
            tenant_id: tenant,
            carrier: Some("DHL".into()),
            tracking_number: Some("1Z999".into()),
            occurred_at: Utc::now(),
            actor: None,
        })
        .unwrap();
        assert_eq!(t.status(), TransferStatus::InTransit);
        assert_eq!(t.shipment().and_then(|s| s.carrier.as_deref()), Some("DHL"));

        t.execute(&receive(tenant, 8, 2)).unwrap();
        assert_eq!(t.status(), TransferStatus::Completed);
        assert_eq!(t.lines()[0].quantity_written_off(), Quantity::from(2));
        assert_eq!(t.lines()[0].unit_cost, Some(Money::new(dec!(4))));
    }

    #[test]
    fn receipt_cannot_exceed_request() {
        let tenant = TenantId::new();
        let t = created(tenant, dec!(40));
        assert!(t.handle(&receive(tenant, 11, 0)).is_err());
        assert!(t.handle(&receive(tenant, 8, 3)).is_err());
        assert!(t.handle(&receive(tenant, 10, 0)).is_ok());
    }

    #[test]
    fn expensive_transfer_needs_approval_before_shipping() {
        let tenant = TenantId::new();
        let mut t = created(tenant, dec!(5000));
        assert_eq!(t.status(), TransferStatus::PendingApproval);

        let ship = TransferCommand::Ship {
            tenant_id: tenant,
            carrier: None,
            tracking_number: None,
            occurred_at: Utc::now(),
            actor: None,
        };
        assert!(matches!(
            t.handle(&ship),
            Err(DomainError::InvalidTransition { .. })
        ));

        t.execute(&TransferCommand::Approve {
            tenant_id: tenant,
            occurred_at: Utc::now(),
            actor: Some(UserId::new()),
        })
        .unwrap();
        t.execute(&ship).unwrap();
        assert_eq!(t.status(), TransferStatus::InTransit);
    }

    #[test]
    fn in_transit_transfer_cannot_be_cancelled() {
        let tenant = TenantId::new();
        let mut t = created(tenant, dec!(40));
        t.execute(&TransferCommand::Ship {
            tenant_id: tenant,
            carrier: None,
            tracking_number: None,
            occurred_at: Utc::now(),
            actor: None,
        })
        .unwrap();
        assert!(t
            .handle(&TransferCommand::Cancel {
                tenant_id: tenant,
                occurred_at: Utc::now(),
                actor: None,
            })
            .is_err());
    }

    #[test]
    fn other_tenant_cannot_touch_transfer() {
        let t = created(TenantId::new(), dec!(40));
        assert!(matches!(
            t.handle(&receive(TenantId::new(), 10, 0)),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}
