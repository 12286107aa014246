use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::{
    Aggregate, AggregateRoot, DomainError, Money, Quantity, TenantId, UserId, WarehouseId,
};
use stockwise_events::Event;

use crate::ids::AdjustmentId;
use crate::policy::ApprovalPolicy;
use crate::stock::StockKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    PhysicalCount,
    Damage,
    Theft,
    Expiry,
    QualityRejection,
    SystemCorrection,
    TransferDamage,
    Obsolete,
    Other,
}

impl core::str::FromStr for AdjustmentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "physical_count" => Ok(Self::PhysicalCount),
            "damage" => Ok(Self::Damage),
            "theft" => Ok(Self::Theft),
            "expiry" => Ok(Self::Expiry),
            "quality_rejection" => Ok(Self::QualityRejection),
            "system_correction" => Ok(Self::SystemCorrection),
            "transfer_damage" => Ok(Self::TransferDamage),
            "obsolete" => Ok(Self::Obsolete),
            "other" => Ok(Self::Other),
            _ => Err(DomainError::validation(format!("unknown adjustment type: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl AdjustmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Cancelled)
    }
}

impl core::fmt::Display for AdjustmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentLine {
    pub key: StockKey,
    /// Signed: positive adds stock, negative removes it.
    pub quantity_difference: Quantity,
    pub unit_cost: Money,
}

impl AdjustmentLine {
    pub fn value(&self) -> Money {
        self.unit_cost.times(self.quantity_difference).abs()
    }
}

/// Aggregate root: StockAdjustment.
///
/// Lifecycle: Draft → PendingApproval → {Approved, Rejected}, Approved → Completed,
/// Draft | PendingApproval → Cancelled. Stock changes happen only on the way
/// from Approved to Completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    id: AdjustmentId,
    tenant_id: Option<TenantId>,
    number: String,
    warehouse_id: Option<WarehouseId>,
    adjustment_type: AdjustmentType,
    reason: String,
    lines: Vec<AdjustmentLine>,
    total_value: Money,
    status: AdjustmentStatus,
    requires_approval: bool,
    created_at: DateTime<Utc>,
    created_by: Option<UserId>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl StockAdjustment {
    pub fn empty(id: AdjustmentId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            warehouse_id: None,
            adjustment_type: AdjustmentType::Other,
            reason: String::new(),
            lines: Vec::new(),
            total_value: Money::ZERO,
            status: AdjustmentStatus::Draft,
            requires_approval: false,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            created_by: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> AdjustmentId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn adjustment_type(&self) -> AdjustmentType {
        self.adjustment_type
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn lines(&self) -> &[AdjustmentLine] {
        &self.lines
    }

    pub fn total_value(&self) -> Money {
        self.total_value
    }

    pub fn status(&self) -> AdjustmentStatus {
        self.status
    }

    pub fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

impl AggregateRoot for StockAdjustment {
    type Id = AdjustmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateAdjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAdjustment {
    pub tenant_id: TenantId,
    pub adjustment_id: AdjustmentId,
    pub number: String,
    pub warehouse_id: WarehouseId,
    pub adjustment_type: AdjustmentType,
    pub reason: String,
    pub lines: Vec<AdjustmentLine>,
    pub policy: ApprovalPolicy,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentCommand {
    Create(CreateAdjustment),
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
    Cancel {
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
        actor: Option<UserId>,
    },
    /// Recorded once the stock side has been applied.
    Complete {
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentCreated {
    pub tenant_id: TenantId,
    pub adjustment_id: AdjustmentId,
    pub number: String,
    pub warehouse_id: WarehouseId,
    pub adjustment_type: AdjustmentType,
    pub reason: String,
    pub lines: Vec<AdjustmentLine>,
    pub total_value: Money,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentEvent {
    Created(AdjustmentCreated),
    SubmittedForApproval {
        tenant_id: TenantId,
        adjustment_id: AdjustmentId,
        total_value: Money,
        occurred_at: DateTime<Utc>,
    },
    Approved {
        tenant_id: TenantId,
        adjustment_id: AdjustmentId,
        /// `None` when the policy approved it automatically.
        approved_by: Option<UserId>,
        automatic: bool,
        occurred_at: DateTime<Utc>,
    },
    Rejected {
        tenant_id: TenantId,
        adjustment_id: AdjustmentId,
        rejected_by: Option<UserId>,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    Cancelled {
        tenant_id: TenantId,
        adjustment_id: AdjustmentId,
        occurred_at: DateTime<Utc>,
    },
    Completed {
        tenant_id: TenantId,
        adjustment_id: AdjustmentId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for AdjustmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AdjustmentEvent::Created(_) => "inventory.adjustment.created",
            AdjustmentEvent::SubmittedForApproval { .. } => "inventory.adjustment.submitted",
            AdjustmentEvent::Approved { .. } => "inventory.adjustment.approved",
            AdjustmentEvent::Rejected { .. } => "inventory.adjustment.rejected",
            AdjustmentEvent::Cancelled { .. } => "inventory.adjustment.cancelled",
            AdjustmentEvent::Completed { .. } => "inventory.adjustment.completed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AdjustmentEvent::Created(e) => e.occurred_at,
            AdjustmentEvent::SubmittedForApproval { occurred_at, .. }
            | AdjustmentEvent::Approved { occurred_at, .. }
            | AdjustmentEvent::Rejected { occurred_at, .. }
            | AdjustmentEvent::Cancelled { occurred_at, .. }
            | AdjustmentEvent::Completed { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for StockAdjustment {
    type Command = AdjustmentCommand;
    type Event = AdjustmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AdjustmentEvent::Created(e) => {
                self.id = e.adjustment_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.warehouse_id = Some(e.warehouse_id);
                self.adjustment_type = e.adjustment_type;
                self.reason = e.reason.clone();
                self.lines = e.lines.clone();
                self.total_value = e.total_value;
                self.status = AdjustmentStatus::Draft;
                self.created_at = e.occurred_at;
                self.created_by = e.actor;
                self.created = true;
            }
            AdjustmentEvent::SubmittedForApproval { .. } => {
                self.status = AdjustmentStatus::PendingApproval;
                self.requires_approval = true;
            }
            AdjustmentEvent::Approved {
                approved_by,
                occurred_at,
                ..
            } => {
                self.status = AdjustmentStatus::Approved;
                self.approved_by = *approved_by;
                self.approved_at = Some(*occurred_at);
            }
            AdjustmentEvent::Rejected { reason, .. } => {
                self.status = AdjustmentStatus::Rejected;
                self.rejection_reason = Some(reason.clone());
            }
            AdjustmentEvent::Cancelled { .. } => {
                self.status = AdjustmentStatus::Cancelled;
            }
            AdjustmentEvent::Completed { occurred_at, .. } => {
                self.status = AdjustmentStatus::Completed;
                self.completed_at = Some(*occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AdjustmentCommand::Create(cmd) => self.handle_create(cmd),
            AdjustmentCommand::Approve {
                tenant_id,
                occurred_at,
                actor,
            } => {
                self.ensure_status(*tenant_id, &[AdjustmentStatus::PendingApproval], "approve")?;
                Ok(vec![AdjustmentEvent::Approved {
                    tenant_id: *tenant_id,
                    adjustment_id: self.id,
                    approved_by: *actor,
                    automatic: false,
                    occurred_at: *occurred_at,
                }])
            }
            AdjustmentCommand::Reject {
                tenant_id,
                reason,
                occurred_at,
                actor,
            } => {
                self.ensure_status(*tenant_id, &[AdjustmentStatus::PendingApproval], "reject")?;
                if reason.trim().is_empty() {
                    return Err(DomainError::validation("a rejection reason is required"));
                }
                Ok(vec![AdjustmentEvent::Rejected {
                    tenant_id: *tenant_id,
                    adjustment_id: self.id,
                    rejected_by: *actor,
                    reason: reason.clone(),
                    occurred_at: *occurred_at,
                }])
            }
            AdjustmentCommand::Cancel {
                tenant_id,
                occurred_at,
                ..
            } => {
                self.ensure_status(
                    *tenant_id,
                    &[AdjustmentStatus::Draft, AdjustmentStatus::PendingApproval],
                    "cancel",
                )?;
                Ok(vec![AdjustmentEvent::Cancelled {
                    tenant_id: *tenant_id,
                    adjustment_id: self.id,
                    occurred_at: *occurred_at,
                }])
            }
            AdjustmentCommand::Complete {
                tenant_id,
                occurred_at,
            } => {
                self.ensure_status(*tenant_id, &[AdjustmentStatus::Approved], "complete")?;
                Ok(vec![AdjustmentEvent::Completed {
                    tenant_id: *tenant_id,
                    adjustment_id: self.id,
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

impl StockAdjustment {
    fn ensure_status(
        &self,
        tenant_id: TenantId,
        allowed: &[AdjustmentStatus],
        action: &str,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("adjustment {}", self.id)));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if !allowed.contains(&self.status) {
            return Err(DomainError::invalid_transition(self.status, action));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateAdjustment) -> Result<Vec<AdjustmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("adjustment already exists"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("adjustment reason is required"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("adjustment needs at least one line"));
        }
        for line in &cmd.lines {
            if line.quantity_difference.is_zero() {
                return Err(DomainError::validation(format!(
                    "quantity difference for {} cannot be zero",
                    line.key
                )));
            }
            if line.unit_cost.is_negative() {
                return Err(DomainError::validation("unit cost cannot be negative"));
            }
            if line.key.warehouse_id != cmd.warehouse_id {
                return Err(DomainError::validation(format!(
                    "line {} is not in warehouse {}",
                    line.key, cmd.warehouse_id
                )));
            }
        }

        let total_value: Money = cmd.lines.iter().map(AdjustmentLine::value).sum();
        let mut events = vec![AdjustmentEvent::Created(AdjustmentCreated {
            tenant_id: cmd.tenant_id,
            adjustment_id: cmd.adjustment_id,
            number: cmd.number.clone(),
            warehouse_id: cmd.warehouse_id,
            adjustment_type: cmd.adjustment_type,
            reason: cmd.reason.clone(),
            lines: cmd.lines.clone(),
            total_value,
            occurred_at: cmd.occurred_at,
            actor: cmd.actor,
        })];

        if cmd
            .policy
            .adjustment_requires_approval(cmd.adjustment_type, total_value)
        {
            events.push(AdjustmentEvent::SubmittedForApproval {
                tenant_id: cmd.tenant_id,
                adjustment_id: cmd.adjustment_id,
                total_value,
                occurred_at: cmd.occurred_at,
            });
        } else {
            events.push(AdjustmentEvent::Approved {
                tenant_id: cmd.tenant_id,
                adjustment_id: cmd.adjustment_id,
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
    use stockwise_core::ProductId;

    fn create_cmd(
        tenant_id: TenantId,
        kind: AdjustmentType,
        qty: i64,
        cost: rust_decimal::Decimal,
    ) -> (AdjustmentId, AdjustmentCommand) {
        let warehouse_id = WarehouseId::new();
        let id = AdjustmentId::generate();
        let cmd = AdjustmentCommand::Create(CreateAdjustment {
            tenant_id,
            adjustment_id: id,
            number: "ADJ-000001".into(),
            warehouse_id,
            adjustment_type: kind,
            reason: "cycle count".into(),
            lines: vec![AdjustmentLine {
                key: StockKey::new(ProductId::new(), warehouse_id),
                quantity_difference: Quantity::from(qty),
                unit_cost: Money::new(cost),
            }],
            policy: ApprovalPolicy::new(Money::new(dec!(1000))),
            occurred_at: Utc::now(),
            actor: None,
        });
        (id, cmd)
    }

    #[test]
    fn high_value_adjustment_waits_for_approval() {
        let tenant = TenantId::new();
        let (id, cmd) = create_cmd(tenant, AdjustmentType::Damage, -100, dec!(50));
        let mut adj = StockAdjustment::empty(id);
        adj.execute(&cmd).unwrap();

        assert_eq!(adj.status(), AdjustmentStatus::PendingApproval);
        assert_eq!(adj.total_value(), Money::new(dec!(5000)));

        adj.execute(&AdjustmentCommand::Approve {
            tenant_id: tenant,
            occurred_at: Utc::now(),
            actor: Some(UserId::new()),
        })
        .unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::Approved);

        adj.execute(&AdjustmentCommand::Complete {
            tenant_id: tenant,
            occurred_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::Completed);
        assert!(adj.status().is_terminal());
    }

    #[test]
    fn low_value_adjustment_is_approved_on_creation() {
        let tenant = TenantId::new();
        let (id, cmd) = create_cmd(tenant, AdjustmentType::Damage, -2, dec!(50));
        let mut adj = StockAdjustment::empty(id);
        let events = adj.execute(&cmd).unwrap();
        assert!(matches!(
            events[1],
            AdjustmentEvent::Approved { automatic: true, .. }
        ));
        assert_eq!(adj.status(), AdjustmentStatus::Approved);
        assert!(!adj.requires_approval());
    }

    #[test]
    fn physical_count_never_needs_approval() {
        let tenant = TenantId::new();
        let (id, cmd) = create_cmd(tenant, AdjustmentType::PhysicalCount, 1000, dec!(50));
        let mut adj = StockAdjustment::empty(id);
        adj.execute(&cmd).unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::Approved);
    }

    #[test]
    fn completed_adjustment_is_immutable() {
        let tenant = TenantId::new();
        let (id, cmd) = create_cmd(tenant, AdjustmentType::Damage, -1, dec!(1));
        let mut adj = StockAdjustment::empty(id);
        adj.execute(&cmd).unwrap();
        adj.execute(&AdjustmentCommand::Complete {
            tenant_id: tenant,
            occurred_at: Utc::now(),
        })
        .unwrap();

        for cmd in [
            AdjustmentCommand::Approve {
                tenant_id: tenant,
                occurred_at: Utc::now(),
                actor: None,
            },
            AdjustmentCommand::Cancel {
                tenant_id: tenant,
                occurred_at: Utc::now(),
                actor: None,
            },
            AdjustmentCommand::Complete {
                tenant_id: tenant,
                occurred_at: Utc::now(),
            },
        ] {
            assert!(matches!(
                adj.handle(&cmd),
                Err(DomainError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn reject_needs_reason_and_is_terminal() {
        let tenant = TenantId::new();
        let (id, cmd) = create_cmd(tenant, AdjustmentType::Theft, -100, dec!(50));
        let mut adj = StockAdjustment::empty(id);
        adj.execute(&cmd).unwrap();

        assert!(adj
            .handle(&AdjustmentCommand::Reject {
                tenant_id: tenant,
                reason: " ".into(),
                occurred_at: Utc::now(),
                actor: None,
            })
            .is_err());

        adj.execute(&AdjustmentCommand::Reject {
            tenant_id: tenant,
            reason: "count was wrong".into(),
            occurred_at: Utc::now(),
            actor: None,
        })
        .unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::Rejected);
        assert_eq!(adj.rejection_reason(), Some("count was wrong"));
    }

    #[test]
    fn zero_difference_line_is_invalid() {
        let tenant = TenantId::new();
        let (id, cmd) = create_cmd(tenant, AdjustmentType::Other, 0, dec!(1));
        assert!(matches!(
            StockAdjustment::empty(id).handle(&cmd),
            Err(DomainError::Validation(_))
        ));
    }
}
