//! Landed cost allocation (freight, duty, handling) across receipt layers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockwise_core::{DomainError, DomainResult, Money, SourceDocument};

use crate::cost_layer::CostLayer;
use crate::ids::{CostLayerId, LandedCostId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    /// Proportional to each layer's received quantity.
    #[default]
    Quantity,
    /// Proportional to each layer's received value (quantity × unit cost).
    Value,
    /// Split evenly between the layers.
    Equal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCostAllocation {
    pub layer_id: CostLayerId,
    pub amount: Money,
}

/// A landed cost charge and how it was spread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCost {
    pub id: LandedCostId,
    pub number: String,
    pub source: SourceDocument,
    pub amount: Money,
    pub method: AllocationMethod,
    pub allocations: Vec<LandedCostAllocation>,
    pub allocated_at: DateTime<Utc>,
}

/// Split `amount` over `layers`.
///
/// Shares are taken from the rounded running total, so each one is non-negative
/// and they always sum to `amount` exactly.
pub fn allocate_landed_cost(
    amount: Money,
    layers: &[CostLayer],
    method: AllocationMethod,
    scale: u32,
) -> DomainResult<Vec<LandedCostAllocation>> {
    if !amount.is_positive() {
        return Err(DomainError::validation("landed cost amount must be positive"));
    }
    amount.ensure_scale(scale)?;
    if layers.is_empty() {
        return Err(DomainError::validation(
            "landed cost needs at least one cost layer",
        ));
    }

    let weights: Vec<Decimal> = layers
        .iter()
        .map(|l| match method {
            AllocationMethod::Quantity => l.original_quantity.value(),
            AllocationMethod::Value => l.unit_cost.times(l.original_quantity).amount(),
            AllocationMethod::Equal => Decimal::ONE,
        })
        .collect();
    let total_weight: Decimal = weights.iter().copied().sum();
    if total_weight <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "cannot allocate by {method:?}: layers carry no weight"
        )));
    }

    let mut allocations = Vec::with_capacity(layers.len());
    let mut cumulative_weight = Decimal::ZERO;
    let mut allocated = Money::ZERO;
    for (layer, weight) in layers.iter().zip(weights) {
        cumulative_weight += weight;
        let running = Money::new(amount.amount() * cumulative_weight / total_weight).round_to(scale);
        allocations.push(LandedCostAllocation {
            layer_id: layer.id,
            amount: running - allocated,
        });
        allocated = running;
    }
    Ok(allocations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost_layer::{LayerType, NewCostLayer};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use stockwise_core::{ProductId, Quantity, WarehouseId};

    fn layer(qty: i64, cost: Decimal) -> CostLayer {
        CostLayer::open(NewCostLayer {
            product_id: ProductId::new(),
            warehouse_id: WarehouseId::new(),
            batch: None,
            layer_type: LayerType::Purchase,
            quantity: Quantity::from(qty),
            unit_cost: Money::new(cost),
            acquisition_date: Utc::now(),
            sequence: 0,
            source: SourceDocument::new("BILL", "B-1").unwrap(),
        })
        .unwrap()
    }

    #[test]
    fn quantity_allocation_is_proportional() {
        let layers = vec![layer(10, dec!(1)), layer(30, dec!(1))];
        let shares =
            allocate_landed_cost(Money::new(dec!(100)), &layers, AllocationMethod::Quantity, 2)
                .unwrap();
        assert_eq!(shares[0].amount, Money::new(dec!(25)));
        assert_eq!(shares[1].amount, Money::new(dec!(75)));
    }

    #[test]
    fn value_allocation_uses_extended_cost() {
        let layers = vec![layer(10, dec!(3)), layer(10, dec!(1))];
        let shares =
            allocate_landed_cost(Money::new(dec!(40)), &layers, AllocationMethod::Value, 2)
                .unwrap();
        assert_eq!(shares[0].amount, Money::new(dec!(30)));
        assert_eq!(shares[1].amount, Money::new(dec!(10)));
    }

    #[test]
    fn rounding_never_loses_a_cent() {
        let layers = vec![layer(1, dec!(1)), layer(1, dec!(1)), layer(1, dec!(1))];
        let shares =
            allocate_landed_cost(Money::new(dec!(100)), &layers, AllocationMethod::Equal, 2)
                .unwrap();
        assert_eq!(shares[0].amount, Money::new(dec!(33.33)));
        assert_eq!(shares[1].amount, Money::new(dec!(33.34)));
        assert_eq!(shares[2].amount, Money::new(dec!(33.33)));
    }

    #[test]
    fn zero_value_layers_cannot_take_value_allocation() {
        let layers = vec![layer(5, dec!(0))];
        assert!(
            allocate_landed_cost(Money::new(dec!(10)), &layers, AllocationMethod::Value, 2)
                .is_err()
        );
    }

    proptest! {
        #[test]
        fn shares_sum_to_amount(
            cents in 1i64..10_000_000,
            sizes in prop::collection::vec(1i64..500, 1..8),
        ) {
            let layers: Vec<CostLayer> = sizes.iter().map(|q| layer(*q, dec!(2.5))).collect();
            let amount = Money::new(Decimal::new(cents, 2));
            for method in [AllocationMethod::Quantity, AllocationMethod::Value, AllocationMethod::Equal] {
                let shares = allocate_landed_cost(amount, &layers, method, 2).unwrap();
                let total: Money = shares.iter().map(|s| s.amount).sum();
                prop_assert_eq!(total, amount);
                prop_assert!(shares.iter().all(|s| !s.amount.is_negative()));
            }
        }
    }
}
