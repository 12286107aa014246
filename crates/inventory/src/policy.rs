//! Approval threshold policy shared by adjustments and transfers.

use serde::{Deserialize, Serialize};

use stockwise_core::Money;

use crate::adjustment::AdjustmentType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Documents valued strictly above this need a second pair of eyes.
    pub threshold: Money,
    /// Adjustment types that never need approval, whatever their value.
    pub auto_approve_types: Vec<AdjustmentType>,
}

impl ApprovalPolicy {
    pub fn new(threshold: Money) -> Self {
        Self {
            threshold,
            auto_approve_types: vec![
                AdjustmentType::PhysicalCount,
                AdjustmentType::SystemCorrection,
            ],
        }
    }

    pub fn adjustment_requires_approval(&self, kind: AdjustmentType, total_value: Money) -> bool {
        !self.auto_approve_types.contains(&kind) && total_value > self.threshold
    }

    pub fn transfer_requires_approval(&self, estimated_value: Money) -> bool {
        estimated_value > self.threshold
    }
}
