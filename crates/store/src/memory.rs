use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    Cart, Product, ProductId, Reservation, ReservationId, ReservationStatus, Result, StoreError,
    UserId,
    store::{CartStore, CatalogStore, DecrementOutcome, LedgerStore},
};

/// In-memory product catalog.
///
/// Each conditional write runs under the map's write lock, which makes the
/// check-and-decrement a single atomic step.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryCatalog {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog seeded with `products`.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let map = products.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            products: Arc::new(RwLock::new(map)),
        }
    }

    /// Removes a product, as a catalog administrator would.
    pub async fn delete_product(&self, id: &ProductId) -> Option<Product> {
        self.products.write().await.remove(id)
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(id).cloned())
    }

    async fn put_product(&self, product: Product) -> Result<()> {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
        Ok(())
    }

    async fn try_decrement(&self, id: &ProductId, qty: u32) -> Result<DecrementOutcome> {
        let mut products = self.products.write().await;
        let Some(product) = products.get_mut(id) else {
            return Ok(DecrementOutcome::ProductMissing);
        };

        if product.stock < qty {
            return Ok(DecrementOutcome::Insufficient {
                available: product.stock,
            });
        }

        product.stock -= qty;
        Ok(DecrementOutcome::Applied {
            remaining: product.stock,
        })
    }

    async fn increment(&self, id: &ProductId, qty: u32) -> Result<bool> {
        let mut products = self.products.write().await;
        match products.get_mut(id) {
            Some(product) => {
                product.stock = product.stock.checked_add(qty).ok_or_else(|| {
                    StoreError::InvalidData(format!("stock overflow for product {id}"))
                })?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
struct LedgerState {
    rows: HashMap<ReservationId, Reservation>,
    /// Secondary index over Active rows only, ordered by expiry.
    active_by_expiry: BTreeSet<(DateTime<Utc>, ReservationId)>,
}

impl LedgerState {
    fn active_row_mut(&mut self, id: ReservationId) -> Result<&mut Reservation> {
        let row = self
            .rows
            .get_mut(&id)
            .ok_or(StoreError::ReservationNotFound(id))?;
        if !row.is_active() {
            return Err(StoreError::TransitionRejected {
                id,
                status: row.status,
            });
        }
        Ok(row)
    }

    fn reindex(&mut self, old_expiry: DateTime<Utc>, row: &Reservation) {
        self.active_by_expiry.remove(&(old_expiry, row.id));
        if row.is_active() {
            self.active_by_expiry.insert((row.expires_at, row.id));
        }
    }
}

/// In-memory reservation ledger.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of rows, terminal ones included.
    pub async fn row_count(&self) -> usize {
        self.state.read().await.rows.len()
    }

    async fn transition(
        &self,
        id: ReservationId,
        status: ReservationStatus,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Reservation> {
        let mut state = self.state.write().await;
        let row = state.active_row_mut(id)?;
        if !row.status.can_transition_to(status) {
            return Err(StoreError::InvalidData(format!(
                "cannot move reservation {id} from {} to {status}",
                row.status
            )));
        }

        if let Some(now) = due_at
            && !row.is_due(now)
        {
            return Err(StoreError::TransitionRejected {
                id,
                status: row.status,
            });
        }

        row.status = status;
        let row = row.clone();
        state.reindex(row.expires_at, &row);
        Ok(row)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn insert(&self, reservation: Reservation) -> Result<ReservationId> {
        let mut state = self.state.write().await;
        let id = reservation.id;
        if state.rows.contains_key(&id) {
            return Err(StoreError::DuplicateReservation(id));
        }
        if reservation.is_active() {
            state.active_by_expiry.insert((reservation.expires_at, id));
        }
        state.rows.insert(id, reservation);
        Ok(id)
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.state.read().await.rows.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: ReservationId,
        status: ReservationStatus,
    ) -> Result<Reservation> {
        self.transition(id, status, None).await
    }

    async fn expire(&self, id: ReservationId, now: DateTime<Utc>) -> Result<Reservation> {
        self.transition(id, ReservationStatus::Expired, Some(now))
            .await
    }

    async fn update_quantity(
        &self,
        id: ReservationId,
        expected: u32,
        quantity: u32,
        expires_at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let mut state = self.state.write().await;
        let row = state.active_row_mut(id)?;
        if row.quantity != expected {
            return Err(StoreError::ConcurrencyConflict {
                id,
                expected,
                actual: row.quantity,
            });
        }

        let old_expiry = row.expires_at;
        row.quantity = quantity;
        row.expires_at = expires_at;
        let row = row.clone();
        state.reindex(old_expiry, &row);
        Ok(row)
    }

    async fn extend(&self, id: ReservationId, expires_at: DateTime<Utc>) -> Result<Reservation> {
        let mut state = self.state.write().await;
        let row = state.active_row_mut(id)?;
        let old_expiry = row.expires_at;
        row.expires_at = expires_at;
        let row = row.clone();
        state.reindex(old_expiry, &row);
        Ok(row)
    }

    async fn list_active_expiring_before(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state
            .active_by_expiry
            .iter()
            .take_while(|(expires_at, _)| *expires_at <= before)
            .filter_map(|(_, id)| state.rows.get(id).cloned())
            .collect())
    }

    async fn list_active_by_user(&self, user_id: &UserId) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .rows
            .values()
            .filter(|r| r.is_active() && &r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.reserved_at);
        Ok(rows)
    }
}

/// In-memory cart documents.
#[derive(Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<HashMap<UserId, Cart>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<Cart>> {
        Ok(self.carts.read().await.get(user_id).cloned())
    }

    async fn put(&self, cart: &Cart) -> Result<()> {
        self.carts
            .write()
            .await
            .insert(cart.user_id.clone(), cart.clone());
        Ok(())
    }
}
