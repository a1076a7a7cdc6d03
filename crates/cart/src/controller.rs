//! Cart controller: user cart intents mapped onto reservation calls.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use common::{Money, ProductId, ReservationId, UserId};
use reservation::{
    ChangeOutcome, ReservationConfig, ReservationError, ReservationService, ReserveOutcome,
};
use store::{Cart, CartStore, Reservation};

use crate::error::{CartError, Result};
use crate::locks::UserLocks;
use crate::report::{
    CartOutcome, CheckoutLine, CheckoutReport, ExpiryNotice, LineResult, LoadedCart, TickReport,
};

/// Keeps each user's cart document in step with their Active reservations.
///
/// A cart line's quantity always equals the quantity of its linked
/// reservation: every change goes through the reservation service first and
/// the cart is written only after it succeeds. Mutations for one user are
/// serialized; different users never wait on each other.
pub struct CartController {
    reservations: ReservationService,
    carts: Arc<dyn CartStore>,
    config: ReservationConfig,
    locks: UserLocks,
    /// Users whose re-sync failed during a tick, retried on the next one.
    pending_resync: Mutex<BTreeSet<UserId>>,
}

impl CartController {
    pub fn new(
        reservations: ReservationService,
        carts: Arc<dyn CartStore>,
        config: ReservationConfig,
    ) -> Self {
        Self {
            reservations,
            carts,
            config,
            locks: UserLocks::default(),
            pending_resync: Mutex::default(),
        }
    }

    pub fn reservations(&self) -> &ReservationService {
        &self.reservations
    }

    pub fn config(&self) -> &ReservationConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.reservations.now()
    }

    /// Adds `quantity` units of `product_id`, growing an existing reservation
    /// or creating a new one.
    #[tracing::instrument(skip(self))]
    pub async fn add(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartOutcome> {
        if quantity == 0 {
            return Err(ReservationError::InvalidQuantity(quantity).into());
        }

        let _guard = self.locks.acquire(user_id).await;
        let mut cart = self.read_cart(user_id).await?;

        let reservation = match self.active_reservation(&cart, user_id, product_id).await? {
            Some(existing) => {
                let new_quantity = existing
                    .quantity
                    .checked_add(quantity)
                    .ok_or(ReservationError::InvalidQuantity(quantity))?;
                match self
                    .reservations
                    .change_quantity(existing.id, new_quantity, self.config.ttl)
                    .await?
                {
                    ChangeOutcome::Changed(r) => r,
                    ChangeOutcome::InsufficientStock {
                        requested,
                        available,
                    } => {
                        return Ok(CartOutcome::InsufficientStock {
                            product_id: product_id.clone(),
                            requested,
                            available,
                        });
                    }
                }
            }
            None => match self
                .reservations
                .reserve(product_id, user_id, quantity, self.config.ttl)
                .await?
            {
                ReserveOutcome::Reserved(r) => r,
                ReserveOutcome::InsufficientStock {
                    requested,
                    available,
                } => {
                    return Ok(CartOutcome::InsufficientStock {
                        product_id: product_id.clone(),
                        requested,
                        available,
                    });
                }
            },
        };

        cart.upsert_line(&reservation);
        self.write_cart(&mut cart).await?;
        Ok(CartOutcome::Updated { cart })
    }

    /// Sets the line for `product_id` to `quantity`. Zero removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartOutcome> {
        if quantity == 0 {
            let cart = self.remove(user_id, product_id).await?;
            return Ok(CartOutcome::Updated { cart });
        }

        let _guard = self.locks.acquire(user_id).await;
        let mut cart = self.read_cart(user_id).await?;
        let reservation_id = Self::line_or_missing(&cart, user_id, product_id)?;

        match self
            .reservations
            .change_quantity(reservation_id, quantity, self.config.ttl)
            .await?
        {
            ChangeOutcome::Changed(r) => {
                cart.upsert_line(&r);
                self.write_cart(&mut cart).await?;
                Ok(CartOutcome::Updated { cart })
            }
            ChangeOutcome::InsufficientStock {
                requested,
                available,
            } => Ok(CartOutcome::InsufficientStock {
                product_id: product_id.clone(),
                requested,
                available,
            }),
        }
    }

    /// Releases the line's reservation and drops the line.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, user_id: &UserId, product_id: &ProductId) -> Result<Cart> {
        let _guard = self.locks.acquire(user_id).await;
        let mut cart = self.read_cart(user_id).await?;
        let reservation_id = Self::line_or_missing(&cart, user_id, product_id)?;

        self.reservations.release(reservation_id).await?;
        cart.remove_line(product_id);
        self.write_cart(&mut cart).await?;
        Ok(cart)
    }

    /// Extends the line's reservation by the configured TTL.
    #[tracing::instrument(skip(self))]
    pub async fn touch(&self, user_id: &UserId, product_id: &ProductId) -> Result<Cart> {
        let _guard = self.locks.acquire(user_id).await;
        let mut cart = self.read_cart(user_id).await?;
        let reservation_id = Self::line_or_missing(&cart, user_id, product_id)?;

        let extended = self
            .reservations
            .extend(reservation_id, self.config.ttl)
            .await?;
        cart.upsert_line(&extended);
        self.write_cart(&mut cart).await?;
        Ok(cart)
    }

    /// Commits every line. Committed lines leave the cart, failed ones stay.
    ///
    /// Lines committed before a failure are not rolled back.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, user_id: &UserId) -> Result<CheckoutReport> {
        let _guard = self.locks.acquire(user_id).await;
        let mut cart = self.read_cart(user_id).await?;
        if cart.is_empty() {
            return Err(CartError::EmptyCart(user_id.clone()));
        }

        let pending: Vec<_> = cart.lines.values().cloned().collect();
        let mut lines = Vec::with_capacity(pending.len());

        for line in pending {
            let result = match self.reservations.commit(line.reservation_id).await {
                Ok(_) => {
                    cart.remove_line(&line.product_id);
                    LineResult::Committed
                }
                Err(e) => {
                    tracing::error!(
                        product_id = %line.product_id,
                        reservation_id = %line.reservation_id,
                        error = %e,
                        "checkout line failed"
                    );
                    LineResult::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            lines.push(CheckoutLine {
                product_id: line.product_id,
                reservation_id: line.reservation_id,
                quantity: line.quantity,
                result,
            });
        }

        self.write_cart(&mut cart).await?;

        let report = CheckoutReport { lines, cart };
        if report.is_complete() {
            metrics::counter!("cart_checkouts_total", "result" => "complete").increment(1);
        } else {
            metrics::counter!("cart_checkouts_total", "result" => "partial").increment(1);
            tracing::warn!(
                failed = report.failed().count(),
                "checkout left uncommitted lines in cart"
            );
        }
        Ok(report)
    }

    /// Releases every line and clears the cart.
    ///
    /// Lines whose release fails stay in the cart and the first error is
    /// returned after the cart is saved.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, user_id: &UserId) -> Result<Cart> {
        let _guard = self.locks.acquire(user_id).await;
        let mut cart = self.read_cart(user_id).await?;

        let pending: Vec<_> = cart.lines.values().cloned().collect();
        let mut first_error = None;
        for line in pending {
            match self.reservations.release(line.reservation_id).await {
                Ok(_) => {
                    cart.remove_line(&line.product_id);
                }
                Err(e) => {
                    tracing::warn!(product_id = %line.product_id, error = %e, "release failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.write_cart(&mut cart).await?;
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(cart),
        }
    }

    /// Reads the cart at session start, dropping lines whose reservation is
    /// no longer Active.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self, user_id: &UserId) -> Result<LoadedCart> {
        let _guard = self.locks.acquire(user_id).await;
        let mut cart = self.read_cart(user_id).await?;
        let notice = self.resync(&mut cart).await?;
        let total = self.total(&cart).await?;
        Ok(LoadedCart {
            cart,
            total,
            notice,
        })
    }

    /// Prices the cart at current catalog prices. Lines whose product has
    /// been deleted count as zero.
    pub async fn total(&self, cart: &Cart) -> Result<Money> {
        let catalog = self.reservations.catalog();
        let mut total = Money::zero();
        for line in cart.lines.values() {
            match catalog.get_product(&line.product_id).await? {
                Some(product) => total = total + product.price.multiply(line.quantity),
                None => {
                    tracing::warn!(
                        product_id = %line.product_id,
                        "cart line has no catalog price"
                    );
                }
            }
        }
        Ok(total)
    }

    /// Runs the expiry sweep and re-syncs the carts it touched.
    ///
    /// Each cart is re-synced on its own. A cart that fails is counted in
    /// [`TickReport::failed`] and retried on the next tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let sweep = self.reservations.sweep_expired(now).await?;

        let mut users: BTreeSet<UserId> = std::mem::take(
            &mut *self
                .pending_resync
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        users.extend(sweep.expired.iter().map(|r| r.user_id.clone()));

        let mut failed = sweep.failed;
        let mut notices = Vec::new();
        for user_id in users {
            match self.resync_stored(&user_id).await {
                Ok(Some(notice)) => notices.push(notice),
                Ok(None) => {}
                Err(e) => {
                    failed += 1;
                    metrics::counter!("cart_resync_failures_total").increment(1);
                    tracing::warn!(%user_id, error = %e, "cart re-sync failed, will retry");
                    self.pending_resync
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(user_id);
                }
            }
        }

        Ok(TickReport {
            expired: sweep.count(),
            failed,
            notices,
        })
    }

    /// Re-syncs the stored cart of `user_id`, if there is one.
    async fn resync_stored(&self, user_id: &UserId) -> Result<Option<ExpiryNotice>> {
        let _guard = self.locks.acquire(user_id).await;
        match self.carts.get(user_id).await? {
            Some(mut cart) => self.resync(&mut cart).await,
            None => Ok(None),
        }
    }

    async fn read_cart(&self, user_id: &UserId) -> Result<Cart> {
        Ok(self
            .carts
            .get(user_id)
            .await?
            .unwrap_or_else(|| Cart::empty(user_id.clone(), self.now())))
    }

    async fn write_cart(&self, cart: &mut Cart) -> Result<()> {
        cart.updated_at = self.now();
        self.carts.put(cart).await?;
        Ok(())
    }

    fn line_or_missing(
        cart: &Cart,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<ReservationId> {
        cart.line(product_id)
            .map(|line| line.reservation_id)
            .ok_or_else(|| CartError::ItemNotFound {
                user_id: user_id.clone(),
                product_id: product_id.clone(),
            })
    }

    /// The user's Active reservation for `product_id`, via the cart line or,
    /// when the cart has drifted, via the ledger.
    async fn active_reservation(
        &self,
        cart: &Cart,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<Option<Reservation>> {
        if let Some(line) = cart.line(product_id) {
            match self.reservations.get(line.reservation_id).await {
                Ok(r) if r.is_active() => return Ok(Some(r)),
                Ok(_) | Err(ReservationError::ReservationNotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let held = self.reservations.active_for_user(user_id).await?;
        Ok(held.into_iter().find(|r| &r.product_id == product_id))
    }

    /// Drops lines whose reservation is gone or no longer Active, and pulls
    /// quantity and expiry from the ledger for the rest. Saves the cart only
    /// if something changed.
    async fn resync(&self, cart: &mut Cart) -> Result<Option<ExpiryNotice>> {
        let mut removed = Vec::new();
        let mut changed = false;

        let lines: Vec<_> = cart.lines.values().cloned().collect();
        for line in lines {
            match self.reservations.get(line.reservation_id).await {
                Ok(r) if r.is_active() => {
                    if r.quantity != line.quantity || r.expires_at != line.expires_at {
                        cart.upsert_line(&r);
                        changed = true;
                    }
                }
                Ok(_) | Err(ReservationError::ReservationNotFound(_)) => {
                    cart.remove_line(&line.product_id);
                    removed.push(line.product_id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if removed.is_empty() && !changed {
            return Ok(None);
        }
        self.write_cart(cart).await?;

        if removed.is_empty() {
            return Ok(None);
        }
        metrics::counter!("cart_lines_expired_total").increment(removed.len() as u64);
        let notice = ExpiryNotice {
            user_id: cart.user_id.clone(),
            removed,
        };
        tracing::info!(user_id = %notice.user_id, "{notice}");
        Ok(Some(notice))
    }
}
