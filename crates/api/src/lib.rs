//! HTTP API for the stock reservation engine.
//!
//! Exposes catalog, cart and reservation endpoints over the cart controller,
//! with structured logging (tracing) and Prometheus metrics. Stores are
//! in-memory by default or PostgreSQL when a pool is supplied.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use cart::CartController;
use metrics_exporter_prometheus::PrometheusHandle;
use reservation::{ReservationConfig, ReservationService};
use sqlx::PgPool;
use store::{
    CartStore, CatalogStore, InMemoryCartStore, InMemoryCatalog, InMemoryLedger, LedgerStore,
    PostgresCartStore, PostgresCatalog, PostgresLedger,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/products/{id}",
            put(routes::products::put).get(routes::products::get),
        )
        .route("/carts/{user_id}", get(routes::carts::load))
        .route("/carts/{user_id}/items", post(routes::carts::add_item))
        .route(
            "/carts/{user_id}/items/{product_id}",
            put(routes::carts::update_item).delete(routes::carts::remove_item),
        )
        .route(
            "/carts/{user_id}/items/{product_id}/touch",
            post(routes::carts::touch_item),
        )
        .route("/carts/{user_id}/checkout", post(routes::carts::checkout))
        .route("/carts/{user_id}/cancel", post(routes::carts::cancel))
        .route("/reservations/{id}", get(routes::reservations::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the reservation service and cart controller over the given stores.
pub fn create_state(
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn LedgerStore>,
    carts: Arc<dyn CartStore>,
    config: ReservationConfig,
    backend: &'static str,
) -> Arc<AppState> {
    let reservations = ReservationService::new(catalog.clone(), ledger);
    let controller = CartController::new(reservations, carts, config);

    Arc::new(AppState {
        controller: Arc::new(controller),
        catalog,
        backend,
    })
}

/// Application state over fresh in-memory stores.
pub fn create_in_memory_state(config: ReservationConfig) -> Arc<AppState> {
    create_state(
        Arc::new(InMemoryCatalog::new()),
        Arc::new(InMemoryLedger::new()),
        Arc::new(InMemoryCartStore::new()),
        config,
        "memory",
    )
}

/// Application state over PostgreSQL. Migrations must already have run.
pub fn create_postgres_state(pool: PgPool, config: ReservationConfig) -> Arc<AppState> {
    create_state(
        Arc::new(PostgresCatalog::new(pool.clone())),
        Arc::new(PostgresLedger::new(pool.clone())),
        Arc::new(PostgresCartStore::new(pool)),
        config,
        "postgres",
    )
}
