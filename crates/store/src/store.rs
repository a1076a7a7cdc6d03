use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Cart, Product, ProductId, Reservation, ReservationId, ReservationStatus, Result, UserId,
};

/// Result of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// Stock was decremented; `remaining` is the stock after the write.
    Applied { remaining: u32 },
    /// Not enough stock; nothing was written.
    Insufficient { available: u32 },
    /// The product does not exist; nothing was written.
    ProductMissing,
}

/// Authoritative product stock.
///
/// Implementations must make [`CatalogStore::try_decrement`] a single
/// conditional write: concurrent callers never observe a stock read that a
/// later write of theirs depends on.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Loads a product by ID.
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Authoritative catalog write (create or overwrite).
    async fn put_product(&self, product: Product) -> Result<()>;

    /// Writes `stock - qty` if and only if `stock >= qty`.
    async fn try_decrement(&self, id: &ProductId, qty: u32) -> Result<DecrementOutcome>;

    /// Adds `qty` back to stock.
    ///
    /// Returns `false` without error if the product no longer exists.
    async fn increment(&self, id: &ProductId, qty: u32) -> Result<bool>;

    /// Returns the current stock, or None if the product does not exist.
    async fn get_stock(&self, id: &ProductId) -> Result<Option<u32>> {
        Ok(self.get_product(id).await?.map(|p| p.stock))
    }
}

/// Reservation rows.
///
/// Every mutation of an existing row is conditional on the row being
/// Active; terminal rows are never rewritten.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts a new reservation row.
    async fn insert(&self, reservation: Reservation) -> Result<ReservationId>;

    /// Loads a reservation by ID.
    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Moves an Active row to `status`, returning the row as transitioned.
    ///
    /// Fails with `TransitionRejected` if the row is not Active.
    async fn update_status(
        &self,
        id: ReservationId,
        status: ReservationStatus,
    ) -> Result<Reservation>;

    /// Moves an Active row to Expired if its `expires_at <= now`.
    ///
    /// Fails with `TransitionRejected` if the row is not Active or not yet due.
    async fn expire(&self, id: ReservationId, now: DateTime<Utc>) -> Result<Reservation>;

    /// Changes the quantity of an Active row whose current quantity is
    /// `expected`, refreshing its expiry.
    async fn update_quantity(
        &self,
        id: ReservationId,
        expected: u32,
        quantity: u32,
        expires_at: DateTime<Utc>,
    ) -> Result<Reservation>;

    /// Refreshes the expiry of an Active row.
    async fn extend(&self, id: ReservationId, expires_at: DateTime<Utc>) -> Result<Reservation>;

    /// Active rows with `expires_at <= before`, earliest first.
    async fn list_active_expiring_before(&self, before: DateTime<Utc>)
    -> Result<Vec<Reservation>>;

    /// Active rows held by `user_id`.
    async fn list_active_by_user(&self, user_id: &UserId) -> Result<Vec<Reservation>>;
}

/// One cart document per user, overwritten on every mutation.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get(&self, user_id: &UserId) -> Result<Option<Cart>>;

    async fn put(&self, cart: &Cart) -> Result<()>;
}
