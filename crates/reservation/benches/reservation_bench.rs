use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use reservation::{ReservationService, ReserveOutcome};
use store::{InMemoryCatalog, InMemoryLedger, Money, Product, ProductId, UserId};

fn service_with_stock(stock: u32) -> ReservationService {
    let catalog = InMemoryCatalog::with_products([Product::new(
        "SKU-BENCH",
        "Benchmark Widget",
        Money::from_cents(1000),
        stock,
    )]);
    ReservationService::new(Arc::new(catalog), Arc::new(InMemoryLedger::new()))
}

fn bench_reserve_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = service_with_stock(1_000);
    let product = ProductId::new("SKU-BENCH");
    let user = UserId::new("bench-user");

    c.bench_function("reservation/reserve_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                let outcome = service
                    .reserve(&product, &user, 1, Duration::minutes(10))
                    .await
                    .unwrap();
                if let ReserveOutcome::Reserved(r) = outcome {
                    service.release(r.id).await.unwrap();
                }
            });
        });
    });
}

fn bench_change_quantity(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = service_with_stock(1_000);
    let product = ProductId::new("SKU-BENCH");
    let user = UserId::new("bench-user");

    let id = rt.block_on(async {
        match service
            .reserve(&product, &user, 1, Duration::minutes(10))
            .await
            .unwrap()
        {
            ReserveOutcome::Reserved(r) => r.id,
            other => panic!("unexpected outcome: {other:?}"),
        }
    });

    c.bench_function("reservation/change_quantity_up_down", |b| {
        b.iter(|| {
            rt.block_on(async {
                service
                    .change_quantity(id, 5, Duration::minutes(10))
                    .await
                    .unwrap();
                service
                    .change_quantity(id, 1, Duration::minutes(10))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_sweep_100_due(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let product = ProductId::new("SKU-BENCH");

    c.bench_function("reservation/sweep_100_due", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service = service_with_stock(100);
                for n in 0..100 {
                    let user = UserId::new(format!("user-{n}"));
                    service
                        .reserve(&product, &user, 1, Duration::zero())
                        .await
                        .unwrap();
                }
                let report = service.sweep_expired(Utc::now()).await.unwrap();
                assert_eq!(report.count(), 100);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_release,
    bench_change_quantity,
    bench_sweep_100_due,
);
criterion_main!(benches);
