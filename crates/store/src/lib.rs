//! Persistence for the stock reservation engine.
//!
//! Three stores back the engine:
//! - [`CatalogStore`]: authoritative product stock with a conditional decrement
//! - [`LedgerStore`]: reservation rows with guarded status transitions
//! - [`CartStore`]: one cart document per user
//!
//! Each has an in-memory implementation (tests, single-node use) and a
//! PostgreSQL implementation.

pub mod cart;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod product;
pub mod reservation;
pub mod store;

pub use cart::{Cart, CartLine};
pub use common::{Money, ProductId, ReservationId, UserId};
pub use error::{Result, StoreError};
pub use memory::{InMemoryCartStore, InMemoryCatalog, InMemoryLedger};
pub use postgres::{PostgresCartStore, PostgresCatalog, PostgresLedger, run_migrations};
pub use product::Product;
pub use reservation::{Reservation, ReservationStatus};
pub use store::{CartStore, CatalogStore, DecrementOutcome, LedgerStore};
