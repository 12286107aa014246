use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;

use stockwise_core::{Money, ProductId, Quantity, SourceDocument, TenantId, WarehouseId};
use stockwise_infra::services::{IssueStock, ReceiveStock, ServiceContext, Services};
use stockwise_infra::Settings;
use stockwise_inventory::{
    CostLayer, LayerType, NewCostLayer, StockKey, ValuationMethod, plan_consumption,
};

static BILL: AtomicU64 = AtomicU64::new(0);

fn next_bill() -> SourceDocument {
    let n = BILL.fetch_add(1, Ordering::Relaxed);
    SourceDocument::new("BILL", format!("B-{n}")).unwrap()
}

fn layers(count: usize) -> Vec<CostLayer> {
    let (product_id, warehouse_id) = (ProductId::new(), WarehouseId::new());
    let start = Utc::now();
    (0..count)
        .map(|i| {
            CostLayer::open(NewCostLayer {
                product_id,
                warehouse_id,
                batch: None,
                layer_type: LayerType::Purchase,
                quantity: Quantity::from(10),
                unit_cost: Money::new(Decimal::new(500 + i as i64, 2)),
                acquisition_date: start + Duration::seconds(i as i64),
                sequence: i as u64,
                source: next_bill(),
            })
            .unwrap()
        })
        .collect()
}

fn bench_consumption_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("consumption_planning");
    for count in [10usize, 100, 1000] {
        let open = layers(count);
        // Draw through half of the layers.
        let quantity = Quantity::from(count as i64 * 5);
        group.throughput(Throughput::Elements(count as u64));
        for method in [ValuationMethod::Fifo, ValuationMethod::WeightedAverage] {
            group.bench_with_input(
                BenchmarkId::new(method.to_string(), count),
                &open,
                |b, open| b.iter(|| plan_consumption(black_box(open), quantity, method).unwrap()),
            );
        }
    }
    group.finish();
}

fn bench_service_round_trips(c: &mut Criterion) {
    let mut group = c.benchmark_group("service_round_trips");

    group.bench_function("receive_and_post", |b| {
        let svc = Services::new(&Settings::default());
        let ctx = ServiceContext::new(TenantId::new(), None);
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        b.iter(|| {
            svc.costing
                .receive(
                    &ctx,
                    ReceiveStock {
                        key: key.clone(),
                        quantity: Quantity::from(1),
                        unit_cost: Money::new(Decimal::ONE),
                        received_at: None,
                        source: next_bill(),
                    },
                )
                .unwrap()
        });
    });

    group.bench_function("reserve_and_release", |b| {
        let svc = Services::new(&Settings::default());
        let ctx = ServiceContext::new(TenantId::new(), None);
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        svc.costing
            .receive(
                &ctx,
                ReceiveStock {
                    key: key.clone(),
                    quantity: Quantity::from(1_000),
                    unit_cost: Money::new(Decimal::ONE),
                    received_at: None,
                    source: next_bill(),
                },
            )
            .unwrap();
        b.iter(|| {
            let r = svc
                .reservations
                .reserve_one(&ctx, key.clone(), black_box(Quantity::from(5)), None)
                .unwrap();
            svc.reservations.release(&ctx, r.id_typed(), None).unwrap()
        });
    });

    group.bench_function("issue_across_layers", |b| {
        let svc = Services::new(&Settings::default());
        let ctx = ServiceContext::new(TenantId::new(), None);
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        b.iter_batched(
            || {
                for _ in 0..5 {
                    svc.costing
                        .receive(
                            &ctx,
                            ReceiveStock {
                                key: key.clone(),
                                quantity: Quantity::from(2),
                                unit_cost: Money::new(Decimal::TWO),
                                received_at: None,
                                source: next_bill(),
                            },
                        )
                        .unwrap();
                }
            },
            |()| {
                svc.costing
                    .issue(
                        &ctx,
                        IssueStock {
                            key: key.clone(),
                            quantity: Quantity::from(10),
                            source: SourceDocument::new("INVOICE", next_bill().number).unwrap(),
                        },
                    )
                    .unwrap()
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_consumption_planning, bench_service_round_trips);
criterion_main!(benches);
