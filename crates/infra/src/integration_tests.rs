//! End-to-end service scenarios over one shared store.
//!
//! Verifies:
//! - multi-step workflows commit stock, layers and journal together or not at all
//! - concurrent reservations on one item never oversell
//! - the audit trail matches every document's version
//! - the inventory account always equals the value left in the cost layers

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use stockwise_accounting::{ManualLine, SourceEvent};
    use stockwise_core::{
        AggregateRoot, Money, ProductId, Quantity, SourceDocument, TenantId, WarehouseId,
    };
    use stockwise_inventory::{
        AdjustmentEvent, AdjustmentStatus, AdjustmentType, ReservationStatus, StockKey,
    };

    use crate::config::Settings;
    use crate::services::{
        EntryFilter, IssueStock, NewAdjustment, NewAdjustmentLine, ReceiveStock, ReserveStock,
        ServiceContext, Services,
    };

    fn services() -> (Services, ServiceContext) {
        (
            Services::new(&Settings::default()),
            ServiceContext::new(TenantId::new(), None),
        )
    }

    fn receive(svc: &Services, ctx: &ServiceContext, key: &StockKey, qty: i64, cost: Money, bill: &str) {
        svc.costing
            .receive(
                ctx,
                ReceiveStock {
                    key: key.clone(),
                    quantity: Quantity::from(qty),
                    unit_cost: cost,
                    received_at: None,
                    source: SourceDocument::new("BILL", bill).unwrap(),
                },
            )
            .unwrap();
    }

    fn journal_count(svc: &Services, ctx: &ServiceContext) -> usize {
        svc.posting
            .entries(ctx.tenant_id, &EntryFilter::default())
            .unwrap()
            .len()
    }

    #[test]
    fn reserve_then_overreserve_leaves_availability_untouched() {
        let (svc, ctx) = services();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 100, Money::new(dec!(1)), "B-1");

        svc.reservations
            .reserve_one(&ctx, key.clone(), Quantity::from(30), None)
            .unwrap();
        let err = svc
            .reservations
            .reserve_one(&ctx, key.clone(), Quantity::from(80), None)
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_available_stock");

        let item = svc.costing.stock_item(ctx.tenant_id, &key).unwrap();
        assert_eq!(item.quantity_available(), Quantity::from(70));
        assert_eq!(
            svc.reservations
                .list(ctx.tenant_id, Some(ReservationStatus::Active))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn fifo_issue_costs_across_layers_and_posts_cogs() {
        let (svc, ctx) = services();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 10, Money::new(dec!(5)), "B-1");
        receive(&svc, &ctx, &key, 20, Money::new(dec!(7)), "B-2");

        let issued = svc
            .costing
            .issue(
                &ctx,
                IssueStock {
                    key: key.clone(),
                    quantity: Quantity::from(15),
                    source: SourceDocument::new("INVOICE", "INV-1").unwrap(),
                },
            )
            .unwrap();
        assert_eq!(issued.consumption.total_cost, Money::new(dec!(85)));

        let layers = svc
            .costing
            .cost_layers(ctx.tenant_id, key.product_id, key.warehouse_id)
            .unwrap();
        assert_eq!(layers[0].quantity_remaining, Quantity::ZERO);
        assert_eq!(layers[1].quantity_remaining, Quantity::from(15));

        let cogs = issued.journal_entry.expect("cogs entry");
        assert_eq!(cogs.lines[0].account.code, "5000");
        assert_eq!(cogs.total_debits(), Money::new(dec!(85)));
        assert!(svc.costing.validate_integrity(ctx.tenant_id).unwrap().is_empty());
    }

    #[test]
    fn large_adjustment_waits_for_approval_and_applies_once() {
        let (svc, ctx) = services();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 1000, Money::new(dec!(10)), "B-1");

        let adj = svc
            .adjustments
            .create(
                &ctx,
                NewAdjustment {
                    warehouse_id: key.warehouse_id,
                    adjustment_type: AdjustmentType::Damage,
                    reason: "flood".into(),
                    lines: vec![NewAdjustmentLine {
                        key: key.clone(),
                        quantity_difference: Quantity::from(-500),
                        unit_cost: None,
                    }],
                },
            )
            .unwrap();
        assert_eq!(adj.status(), AdjustmentStatus::PendingApproval);
        assert_eq!(adj.total_value(), Money::new(dec!(5000)));
        assert_eq!(
            svc.costing.stock_item(ctx.tenant_id, &key).unwrap().quantity_on_hand(),
            Quantity::from(1000)
        );

        let approver = ServiceContext::new(ctx.tenant_id, Some(stockwise_core::UserId::new()));
        let done = svc.adjustments.approve(&approver, adj.id_typed()).unwrap();
        assert_eq!(done.status(), AdjustmentStatus::Completed);
        assert!(svc.adjustments.approve(&approver, adj.id_typed()).is_err());

        assert_eq!(
            svc.costing.stock_item(ctx.tenant_id, &key).unwrap().quantity_on_hand(),
            Quantity::from(500)
        );
        let history = svc
            .store
            .history(ctx.tenant_id, adj.id_typed().aggregate_id())
            .unwrap();
        assert_eq!(history.len() as u64, done.version());
        assert!(history
            .iter()
            .any(|e| e.event_type == "inventory.adjustment.approved"));
        let first = history[0].decode::<AdjustmentEvent>().unwrap();
        assert_eq!(first.position.sequence, 1);
        assert!(matches!(first.payload, AdjustmentEvent::Created(_)));
    }

    #[test]
    fn failed_workflow_step_rolls_back_everything() {
        let (svc, ctx) = services();
        let warehouse = WarehouseId::new();
        let plenty = StockKey::new(ProductId::new(), warehouse);
        let scarce = StockKey::new(ProductId::new(), warehouse);
        receive(&svc, &ctx, &plenty, 10, Money::new(dec!(3)), "B-1");
        receive(&svc, &ctx, &scarce, 1, Money::new(dec!(3)), "B-2");
        let entries_before = journal_count(&svc, &ctx);

        let err = svc
            .adjustments
            .create(
                &ctx,
                NewAdjustment {
                    warehouse_id: warehouse,
                    adjustment_type: AdjustmentType::PhysicalCount,
                    reason: "count".into(),
                    lines: vec![
                        NewAdjustmentLine {
                            key: plenty.clone(),
                            quantity_difference: Quantity::from(5),
                            unit_cost: None,
                        },
                        NewAdjustmentLine {
                            key: scarce.clone(),
                            quantity_difference: Quantity::from(-2),
                            unit_cost: None,
                        },
                    ],
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_available_stock");

        assert_eq!(
            svc.costing.stock_item(ctx.tenant_id, &plenty).unwrap().quantity_on_hand(),
            Quantity::from(10)
        );
        assert_eq!(
            svc.costing
                .cost_layers(ctx.tenant_id, plenty.product_id, warehouse)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(journal_count(&svc, &ctx), entries_before);
        assert!(svc.adjustments.list(ctx.tenant_id, None).unwrap().is_empty());
    }

    #[test]
    fn concurrent_reservations_never_oversell() {
        let (svc, ctx) = services();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 100, Money::new(dec!(1)), "B-1");

        let svc = Arc::new(svc);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                let key = key.clone();
                thread::spawn(move || {
                    svc.reservations
                        .reserve(
                            &ctx,
                            ReserveStock {
                                lines: vec![(key, Quantity::from(20))],
                                ttl_secs: None,
                                reference: None,
                            },
                        )
                        .map_err(|e| e.code())
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let granted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(granted, 5);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|code| *code == "insufficient_available_stock"));

        let item = svc.costing.stock_item(ctx.tenant_id, &key).unwrap();
        assert_eq!(item.quantity_reserved(), Quantity::from(100));
        assert_eq!(item.quantity_available(), Quantity::ZERO);
    }

    #[test]
    fn unbalanced_manual_entry_is_never_persisted() {
        let (svc, ctx) = services();
        let line = |code: &str, debit, credit| ManualLine {
            account_code: code.into(),
            debit: Money::new(debit),
            credit: Money::new(credit),
            memo: None,
        };
        let err = svc
            .posting
            .post(
                &ctx,
                SourceEvent::Manual {
                    source: SourceDocument::new("MANUAL", "M-1").unwrap(),
                    description: "accrual".into(),
                    lines: vec![
                        line("6000", dec!(100.00), dec!(0)),
                        line("2000", dec!(0), dec!(99.99)),
                    ],
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "posting_imbalance");
        assert_eq!(journal_count(&svc, &ctx), 0);
        assert!(svc.posting.trial_balance(ctx.tenant_id, None).unwrap().is_empty());
    }

    #[test]
    fn duplicate_receipt_source_posts_once() {
        let (svc, ctx) = services();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 5, Money::new(dec!(4)), "B-1");

        let again = svc.costing.receive(
            &ctx,
            ReceiveStock {
                key: key.clone(),
                quantity: Quantity::from(5),
                unit_cost: Money::new(dec!(4)),
                received_at: None,
                source: SourceDocument::new("BILL", "B-1").unwrap(),
            },
        );
        assert_eq!(again.unwrap_err().code(), "duplicate_posting");
        assert_eq!(
            svc.costing.stock_item(ctx.tenant_id, &key).unwrap().quantity_on_hand(),
            Quantity::from(5)
        );
        assert_eq!(journal_count(&svc, &ctx), 1);
    }

    #[test]
    fn tenants_never_see_each_other() {
        let (svc, ctx) = services();
        let other = ServiceContext::new(TenantId::new(), None);
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        receive(&svc, &ctx, &key, 5, Money::new(dec!(4)), "B-1");
        let reservation = svc
            .reservations
            .reserve_one(&ctx, key.clone(), Quantity::from(2), None)
            .unwrap();

        assert_eq!(
            svc.costing.stock_item(other.tenant_id, &key).unwrap_err().code(),
            "not_found"
        );
        assert_eq!(
            svc.reservations
                .get(other.tenant_id, reservation.id_typed())
                .unwrap_err()
                .code(),
            "not_found"
        );
        // Same bill number, different tenant: no duplicate.
        receive(&svc, &other, &key, 1, Money::new(dec!(4)), "B-1");
        assert_eq!(journal_count(&svc, &other), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Receive(i64, i64),
        Reserve(i64),
        ReleaseOldest,
        Issue(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..50, 1i64..2_000).prop_map(|(q, cents)| Op::Receive(q, cents)),
            (1i64..40).prop_map(Op::Reserve),
            Just(Op::ReleaseOldest),
            (1i64..40).prop_map(Op::Issue),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Property: after any mix of receipts, reservations and issues
        /// (failures included) stock, layers and ledger still agree.
        #[test]
        fn stock_layers_and_ledger_stay_in_step(ops in prop::collection::vec(op(), 1..30)) {
            let (svc, ctx) = services();
            let key = StockKey::new(ProductId::new(), WarehouseId::new());
            for (n, op) in ops.into_iter().enumerate() {
                let _ = match op {
                    Op::Receive(q, cents) => svc
                        .costing
                        .receive(
                            &ctx,
                            ReceiveStock {
                                key: key.clone(),
                                quantity: Quantity::from(q),
                                unit_cost: Money::new(Decimal::new(cents, 2)),
                                received_at: None,
                                source: SourceDocument::new("BILL", format!("B-{n}")).unwrap(),
                            },
                        )
                        .map(drop),
                    Op::Reserve(q) => svc
                        .reservations
                        .reserve_one(&ctx, key.clone(), Quantity::from(q), None)
                        .map(drop),
                    Op::ReleaseOldest => {
                        let active = svc
                            .reservations
                            .list(ctx.tenant_id, Some(ReservationStatus::Active))
                            .unwrap();
                        match active.first() {
                            Some(r) => svc.reservations.release(&ctx, r.id_typed(), None).map(drop),
                            None => Ok(()),
                        }
                    }
                    Op::Issue(q) => svc
                        .costing
                        .issue(
                            &ctx,
                            IssueStock {
                                key: key.clone(),
                                quantity: Quantity::from(q),
                                source: SourceDocument::new("INVOICE", format!("INV-{n}")).unwrap(),
                            },
                        )
                        .map(drop),
                };

                prop_assert!(svc.costing.validate_integrity(ctx.tenant_id).unwrap().is_empty());
                if let Ok(item) = svc.costing.stock_item(ctx.tenant_id, &key) {
                    prop_assert!(item.quantity_reserved() <= item.quantity_on_hand());
                }
                let layer_value = svc.costing.valuation(ctx.tenant_id).unwrap().total_value;
                let inventory_balance = svc
                    .posting
                    .trial_balance(ctx.tenant_id, None)
                    .unwrap()
                    .into_iter()
                    .find(|row| row.account.code == "1300")
                    .map(|row| row.balance)
                    .unwrap_or(Money::ZERO);
                prop_assert_eq!(inventory_balance, layer_value);
            }
        }
    }
}
