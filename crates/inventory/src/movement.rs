//! Stock movement audit rows. Append-only; one row per quantity change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::{AggregateId, Money, Quantity, SourceDocument, UserId};

use crate::ids::MovementId;
use crate::stock::StockKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Receipt,
    Issue,
    AdjustmentIn,
    AdjustmentOut,
    TransferOut,
    TransferIn,
    WriteOff,
    Reservation,
    Release,
    Fulfillment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub key: StockKey,
    pub movement_type: MovementType,
    /// Always positive; the direction is implied by `movement_type`.
    pub quantity: Quantity,
    pub unit_cost: Option<Money>,
    pub reference: SourceDocument,
    pub at: DateTime<Utc>,
    pub actor: Option<UserId>,
}

impl StockMovement {
    pub fn new(
        key: StockKey,
        movement_type: MovementType,
        quantity: Quantity,
        reference: SourceDocument,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(AggregateId::new()),
            key,
            movement_type,
            quantity: quantity.abs(),
            unit_cost: None,
            reference,
            at,
            actor: None,
        }
    }

    pub fn with_cost(mut self, unit_cost: Money) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn by(mut self, actor: Option<UserId>) -> Self {
        self.actor = actor;
        self
    }

    /// Signed effect on on-hand quantity.
    pub fn on_hand_delta(&self) -> Quantity {
        match self.movement_type {
            MovementType::Receipt | MovementType::AdjustmentIn | MovementType::TransferIn => {
                self.quantity
            }
            MovementType::Issue
            | MovementType::AdjustmentOut
            | MovementType::TransferOut
            | MovementType::WriteOff
            | MovementType::Fulfillment => -self.quantity,
            MovementType::Reservation | MovementType::Release => Quantity::ZERO,
        }
    }
}
