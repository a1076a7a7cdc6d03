//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    Cart, CartStore, CatalogStore, DecrementOutcome, LedgerStore, Money, PostgresCartStore,
    PostgresCatalog, PostgresLedger, Product, ProductId, Reservation, ReservationStatus,
    StoreError, UserId,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            store::run_migrations(&temp_pool).await.unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh pool with cleared tables
async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE products, reservations, carts")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

/// Postgres stores microseconds; whole seconds keep equality checks exact.
fn now_secs() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap()
}

fn widget(stock: u32) -> Product {
    Product::new("SKU-001", "Widget", Money::from_cents(1999), stock)
}

fn reservation(user: &str, qty: u32, now: DateTime<Utc>, ttl_secs: i64) -> Reservation {
    Reservation::new(
        "SKU-001".into(),
        user.into(),
        qty,
        now,
        Duration::seconds(ttl_secs),
    )
}

#[tokio::test]
#[serial]
async fn put_and_get_product() {
    let catalog = PostgresCatalog::new(get_test_pool().await);
    catalog.put_product(widget(7)).await.unwrap();

    let product = catalog
        .get_product(&ProductId::new("SKU-001"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product, widget(7));
    assert!(
        catalog
            .get_product(&ProductId::new("missing"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[serial]
async fn try_decrement_is_conditional() {
    let catalog = PostgresCatalog::new(get_test_pool().await);
    catalog.put_product(widget(3)).await.unwrap();
    let id = ProductId::new("SKU-001");

    assert_eq!(
        catalog.try_decrement(&id, 2).await.unwrap(),
        DecrementOutcome::Applied { remaining: 1 }
    );
    assert_eq!(
        catalog.try_decrement(&id, 2).await.unwrap(),
        DecrementOutcome::Insufficient { available: 1 }
    );
    assert_eq!(
        catalog
            .try_decrement(&ProductId::new("missing"), 1)
            .await
            .unwrap(),
        DecrementOutcome::ProductMissing
    );
    assert_eq!(catalog.get_stock(&id).await.unwrap(), Some(1));
}

#[tokio::test]
#[serial]
async fn concurrent_decrements_sell_exactly_the_stock() {
    let catalog = PostgresCatalog::new(get_test_pool().await);
    catalog.put_product(widget(5)).await.unwrap();
    let id = ProductId::new("SKU-001");

    let mut handles = Vec::new();
    for _ in 0..12 {
        let catalog = catalog.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            catalog.try_decrement(&id, 1).await.unwrap()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), DecrementOutcome::Applied { .. }) {
            applied += 1;
        }
    }

    assert_eq!(applied, 5);
    assert_eq!(catalog.get_stock(&id).await.unwrap(), Some(0));
}

#[tokio::test]
#[serial]
async fn increment_on_missing_product_is_a_noop() {
    let catalog = PostgresCatalog::new(get_test_pool().await);
    assert!(
        !catalog
            .increment(&ProductId::new("missing"), 3)
            .await
            .unwrap()
    );

    catalog.put_product(widget(0)).await.unwrap();
    assert!(
        catalog
            .increment(&ProductId::new("SKU-001"), 3)
            .await
            .unwrap()
    );
    assert_eq!(
        catalog.get_stock(&ProductId::new("SKU-001")).await.unwrap(),
        Some(3)
    );
}

#[tokio::test]
#[serial]
async fn ledger_insert_get_and_guarded_transition() {
    let ledger = PostgresLedger::new(get_test_pool().await);
    let now = now_secs();
    let row = reservation("u1", 2, now, 600);
    let id = ledger.insert(row.clone()).await.unwrap();

    assert_eq!(ledger.get(id).await.unwrap(), Some(row.clone()));
    assert!(matches!(
        ledger.insert(row).await,
        Err(StoreError::DuplicateReservation(_))
    ));

    let committed = ledger
        .update_status(id, ReservationStatus::Committed)
        .await
        .unwrap();
    assert_eq!(committed.status, ReservationStatus::Committed);

    let again = ledger.update_status(id, ReservationStatus::Released).await;
    assert!(matches!(
        again,
        Err(StoreError::TransitionRejected {
            status: ReservationStatus::Committed,
            ..
        })
    ));
}

#[tokio::test]
#[serial]
async fn ledger_sweep_query_and_expire() {
    let ledger = PostgresLedger::new(get_test_pool().await);
    let now = now_secs();
    let due = ledger.insert(reservation("u1", 1, now, 30)).await.unwrap();
    let not_due = ledger.insert(reservation("u2", 1, now, 600)).await.unwrap();

    let listed = ledger
        .list_active_expiring_before(now + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(listed.iter().map(|r| r.id).collect::<Vec<_>>(), vec![due]);

    assert!(matches!(
        ledger.expire(not_due, now + Duration::seconds(60)).await,
        Err(StoreError::TransitionRejected {
            status: ReservationStatus::Active,
            ..
        })
    ));

    let expired = ledger
        .expire(due, now + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(expired.status, ReservationStatus::Expired);
    assert!(
        ledger
            .list_active_expiring_before(now + Duration::seconds(60))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
#[serial]
async fn ledger_quantity_update_and_extend() {
    let ledger = PostgresLedger::new(get_test_pool().await);
    let now = now_secs();
    let id = ledger.insert(reservation("u1", 2, now, 60)).await.unwrap();
    let later = now + Duration::seconds(600);

    let updated = ledger.update_quantity(id, 2, 5, later).await.unwrap();
    assert_eq!(updated.quantity, 5);
    assert_eq!(updated.expires_at, later);

    assert!(matches!(
        ledger.update_quantity(id, 2, 3, later).await,
        Err(StoreError::ConcurrencyConflict {
            expected: 2,
            actual: 5,
            ..
        })
    ));

    let extended = ledger
        .extend(id, later + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(extended.expires_at, later + Duration::seconds(60));

    let by_user = ledger.list_active_by_user(&UserId::new("u1")).await.unwrap();
    assert_eq!(by_user.len(), 1);
    assert!(
        ledger
            .list_active_by_user(&UserId::new("u2"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
#[serial]
async fn cart_document_is_overwritten() {
    let carts = PostgresCartStore::new(get_test_pool().await);
    let user = UserId::new("u1");
    let now = now_secs();
    assert!(carts.get(&user).await.unwrap().is_none());

    let mut cart = Cart::empty(user.clone(), now);
    cart.upsert_line(&reservation("u1", 2, now, 600));
    carts.put(&cart).await.unwrap();
    assert_eq!(carts.get(&user).await.unwrap(), Some(cart.clone()));

    cart.clear();
    carts.put(&cart).await.unwrap();
    assert!(carts.get(&user).await.unwrap().unwrap().is_empty());
}
