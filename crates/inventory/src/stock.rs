//! The stock item ledger row: on-hand and reserved quantities per location.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::{
    AuditStamp, DomainError, DomainResult, Money, ProductId, Quantity, UserId, WarehouseId,
};

/// Identity of a stock item within a tenant: product at a warehouse, optionally
/// narrowed to a batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
}

impl StockKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
            batch: None,
        }
    }

    pub fn with_batch(mut self, batch: impl Into<String>) -> Self {
        self.batch = Some(batch.into());
        self
    }

    /// The same product and batch at another warehouse.
    pub fn at(&self, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id: self.product_id,
            warehouse_id,
            batch: self.batch.clone(),
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.warehouse_id)?;
        if let Some(batch) = &self.batch {
            write!(f, "#{batch}")?;
        }
        Ok(())
    }
}

/// Per-location stock position.
///
/// Invariant after every committed change: `0 <= reserved <= on_hand`, hence
/// `available = on_hand - reserved >= 0`. Every mutator validates before it
/// writes, so a failed call leaves the item untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    key: StockKey,
    quantity_on_hand: Quantity,
    quantity_reserved: Quantity,
    /// Moving weighted average of receipts.
    unit_cost: Money,
    last_cost: Option<Money>,
    last_receipt_at: Option<DateTime<Utc>>,
    stamp: AuditStamp,
}

impl StockItem {
    /// A fresh, empty item. Items come into existence on their first receipt.
    pub fn open(key: StockKey, at: DateTime<Utc>, by: Option<UserId>) -> Self {
        Self {
            key,
            quantity_on_hand: Quantity::ZERO,
            quantity_reserved: Quantity::ZERO,
            unit_cost: Money::ZERO,
            last_cost: None,
            last_receipt_at: None,
            stamp: AuditStamp::new(at, by),
        }
    }

    pub fn key(&self) -> &StockKey {
        &self.key
    }

    pub fn quantity_on_hand(&self) -> Quantity {
        self.quantity_on_hand
    }

    pub fn quantity_reserved(&self) -> Quantity {
        self.quantity_reserved
    }

    pub fn quantity_available(&self) -> Quantity {
        self.quantity_on_hand - self.quantity_reserved
    }

    pub fn unit_cost(&self) -> Money {
        self.unit_cost
    }

    pub fn last_cost(&self) -> Option<Money> {
        self.last_cost
    }

    pub fn last_receipt_at(&self) -> Option<DateTime<Utc>> {
        self.last_receipt_at
    }

    pub fn stamp(&self) -> &AuditStamp {
        &self.stamp
    }

    /// Book `quantity` units in at `unit_cost`, folding the cost into the moving average.
    pub fn receive(
        &mut self,
        quantity: Quantity,
        unit_cost: Money,
        at: DateTime<Utc>,
        by: Option<UserId>,
    ) -> DomainResult<()> {
        ensure_positive(quantity)?;
        if unit_cost.is_negative() {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }

        let new_on_hand = self.quantity_on_hand + quantity;
        let current_value = self.unit_cost.times(self.quantity_on_hand);
        let incoming_value = unit_cost.times(quantity);
        self.unit_cost = (current_value + incoming_value)
            .per(new_on_hand)
            .unwrap_or(unit_cost);
        self.quantity_on_hand = new_on_hand;
        self.last_cost = Some(unit_cost);
        self.last_receipt_at = Some(at);
        self.stamp.touch(at, by);
        Ok(())
    }

    /// Hold `quantity` unreserved units for a caller.
    pub fn reserve(&mut self, quantity: Quantity, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity)?;
        let available = self.quantity_available();
        if quantity > available {
            return Err(DomainError::insufficient_available(
                quantity.value(),
                available.value(),
            ));
        }
        self.quantity_reserved += quantity;
        self.stamp.touch(at, None);
        Ok(())
    }

    /// Return previously reserved units to the available pool.
    pub fn release(&mut self, quantity: Quantity, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity)?;
        if quantity > self.quantity_reserved {
            return Err(DomainError::invariant(format!(
                "cannot release {quantity} from {} reserved on {}",
                self.quantity_reserved, self.key
            )));
        }
        self.quantity_reserved -= quantity;
        self.stamp.touch(at, None);
        Ok(())
    }

    /// Take `quantity` unreserved units out of stock.
    pub fn issue(
        &mut self,
        quantity: Quantity,
        at: DateTime<Utc>,
        by: Option<UserId>,
    ) -> DomainResult<()> {
        ensure_positive(quantity)?;
        let available = self.quantity_available();
        if quantity > available {
            return Err(DomainError::insufficient_available(
                quantity.value(),
                available.value(),
            ));
        }
        self.quantity_on_hand -= quantity;
        self.stamp.touch(at, by);
        Ok(())
    }

    /// Consume a reservation: drop `reserved` from the reserved pool and ship
    /// `actual` (which may be less, never more) out of on-hand stock.
    pub fn fulfill(
        &mut self,
        reserved: Quantity,
        actual: Quantity,
        at: DateTime<Utc>,
        by: Option<UserId>,
    ) -> DomainResult<()> {
        ensure_positive(reserved)?;
        if actual.is_negative() {
            return Err(DomainError::validation("fulfilled quantity cannot be negative"));
        }
        if actual > reserved {
            return Err(DomainError::validation(format!(
                "fulfilled quantity {actual} exceeds reserved quantity {reserved}"
            )));
        }
        if reserved > self.quantity_reserved {
            return Err(DomainError::invariant(format!(
                "reservation of {reserved} exceeds {} reserved on {}",
                self.quantity_reserved, self.key
            )));
        }
        self.quantity_reserved -= reserved;
        self.quantity_on_hand -= actual;
        self.stamp.touch(at, by);
        Ok(())
    }

    /// Signed change to on-hand: receives at `unit_cost` when positive, issues
    /// unreserved stock when negative.
    pub fn apply_delta(
        &mut self,
        delta: Quantity,
        unit_cost: Money,
        at: DateTime<Utc>,
        by: Option<UserId>,
    ) -> DomainResult<()> {
        if delta.is_positive() {
            self.receive(delta, unit_cost, at, by)
        } else if delta.is_negative() {
            self.issue(delta.abs(), at, by)
        } else {
            Err(DomainError::validation("stock delta cannot be zero"))
        }
    }

    /// Items may only be purged once nothing is on hand or reserved.
    pub fn can_purge(&self) -> bool {
        self.quantity_on_hand.is_zero() && self.quantity_reserved.is_zero()
    }

    pub fn check_invariants(&self) -> DomainResult<()> {
        if self.quantity_reserved.is_negative() {
            return Err(DomainError::invariant("reserved quantity is negative"));
        }
        if self.quantity_reserved > self.quantity_on_hand {
            return Err(DomainError::invariant(format!(
                "reserved {} exceeds on hand {} for {}",
                self.quantity_reserved, self.quantity_on_hand, self.key
            )));
        }
        Ok(())
    }
}

fn ensure_positive(quantity: Quantity) -> DomainResult<()> {
    if !quantity.is_positive() {
        return Err(DomainError::validation(format!(
            "quantity must be positive (got {quantity})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn item_with(on_hand: i64) -> StockItem {
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        let mut item = StockItem::open(key, Utc::now(), None);
        if on_hand > 0 {
            item.receive(Quantity::from(on_hand), Money::new(dec!(5)), Utc::now(), None)
                .unwrap();
        }
        item
    }

    #[test]
    fn over_reservation_fails_and_leaves_state_unchanged() {
        let mut item = item_with(100);
        item.reserve(Quantity::from(30), Utc::now()).unwrap();
        assert_eq!(item.quantity_available(), Quantity::from(70));

        let before = item.clone();
        let err = item.reserve(Quantity::from(80), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientAvailableStock {
                requested: dec!(80),
                available: dec!(70),
            }
        );
        assert_eq!(item, before);
    }

    #[test]
    fn receive_maintains_moving_average() {
        let mut item = item_with(10);
        item.receive(Quantity::from(30), Money::new(dec!(9)), Utc::now(), None)
            .unwrap();
        // (10 * 5 + 30 * 9) / 40 = 8
        assert_eq!(item.unit_cost(), Money::new(dec!(8)));
        assert_eq!(item.last_cost(), Some(Money::new(dec!(9))));
    }

    #[test]
    fn issue_cannot_touch_reserved_units() {
        let mut item = item_with(10);
        item.reserve(Quantity::from(8), Utc::now()).unwrap();
        assert!(matches!(
            item.issue(Quantity::from(3), Utc::now(), None),
            Err(DomainError::InsufficientAvailableStock { .. })
        ));
        item.issue(Quantity::from(2), Utc::now(), None).unwrap();
        assert_eq!(item.quantity_on_hand(), Quantity::from(8));
    }

    #[test]
    fn fulfill_releases_full_reservation_but_ships_actual() {
        let mut item = item_with(10);
        item.reserve(Quantity::from(6), Utc::now()).unwrap();
        item.fulfill(Quantity::from(6), Quantity::from(4), Utc::now(), None)
            .unwrap();
        assert_eq!(item.quantity_on_hand(), Quantity::from(6));
        assert_eq!(item.quantity_reserved(), Quantity::ZERO);
    }

    #[test]
    fn fulfill_rejects_more_than_reserved() {
        let mut item = item_with(10);
        item.reserve(Quantity::from(3), Utc::now()).unwrap();
        assert!(item
            .fulfill(Quantity::from(3), Quantity::from(4), Utc::now(), None)
            .is_err());
    }

    #[test]
    fn purge_requires_empty_item() {
        let mut item = item_with(2);
        assert!(!item.can_purge());
        item.issue(Quantity::from(2), Utc::now(), None).unwrap();
        assert!(item.can_purge());
    }

    #[test]
    fn apply_delta_routes_by_sign() {
        let mut item = item_with(5);
        item.apply_delta(Quantity::from(5), Money::new(dec!(7)), Utc::now(), None)
            .unwrap();
        item.apply_delta(Quantity::from(-3), Money::ZERO, Utc::now(), None)
            .unwrap();
        assert_eq!(item.quantity_on_hand(), Quantity::from(7));
        assert!(item
            .apply_delta(Quantity::ZERO, Money::ZERO, Utc::now(), None)
            .is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Receive(i64),
        Reserve(i64),
        Release(i64),
        Issue(i64),
        Fulfill(i64, i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..50).prop_map(Op::Receive),
            (1i64..50).prop_map(Op::Reserve),
            (1i64..50).prop_map(Op::Release),
            (1i64..50).prop_map(Op::Issue),
            (1i64..50, 0i64..50).prop_map(|(r, a)| Op::Fulfill(r, a)),
        ]
    }

    proptest! {
        /// Property: whatever sequence of operations is attempted (failures
        /// included), reserved never exceeds on hand and available is their difference.
        #[test]
        fn quantities_stay_consistent(ops in prop::collection::vec(op(), 1..60)) {
            let mut item = item_with(0);
            let now = Utc::now();
            for op in ops {
                let before = item.clone();
                let result = match op {
                    Op::Receive(q) => item.receive(Quantity::from(q), Money::new(Decimal::new(q, 1)), now, None),
                    Op::Reserve(q) => item.reserve(Quantity::from(q), now),
                    Op::Release(q) => item.release(Quantity::from(q), now),
                    Op::Issue(q) => item.issue(Quantity::from(q), now, None),
                    Op::Fulfill(r, a) => item.fulfill(Quantity::from(r), Quantity::from(a), now, None),
                };
                if result.is_err() {
                    prop_assert_eq!(&item, &before);
                }
                prop_assert!(item.check_invariants().is_ok());
                prop_assert_eq!(
                    item.quantity_available(),
                    item.quantity_on_hand() - item.quantity_reserved()
                );
                prop_assert!(!item.quantity_available().is_negative());
            }
        }
    }
}
