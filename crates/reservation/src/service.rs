//! The reservation state machine over the catalog and the ledger.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::{Clock, ProductId, ReservationId, SystemClock, UserId};
use store::{
    CatalogStore, DecrementOutcome, LedgerStore, Reservation, ReservationStatus, StoreError,
};

use crate::error::{ReservationError, Result};

/// Outcome of [`ReservationService::reserve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Stock was taken and an Active reservation recorded.
    Reserved(Reservation),
    /// Not enough stock; nothing changed.
    InsufficientStock { requested: u32, available: u32 },
}

impl ReserveOutcome {
    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            ReserveOutcome::Reserved(r) => Some(r),
            ReserveOutcome::InsufficientStock { .. } => None,
        }
    }
}

/// Outcome of [`ReservationService::change_quantity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The reservation now holds the new quantity.
    Changed(Reservation),
    /// The increase could not be covered; the reservation is untouched.
    /// `requested` is the additional quantity that was asked for.
    InsufficientStock { requested: u32, available: u32 },
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Rows this sweep moved to Expired, with their stock returned.
    pub expired: Vec<Reservation>,
    /// Rows the sweep could not process because of store errors.
    pub failed: usize,
}

impl SweepReport {
    /// Number of reservations released by this sweep.
    pub fn count(&self) -> usize {
        self.expired.len()
    }
}

/// Service implementing reserve / extend / release / commit / change and the
/// expiry sweep.
///
/// No lock is held across calls. Atomicity comes from two store primitives:
/// the catalog's conditional decrement and the ledger's Active-only
/// transitions. Every path that returns stock first wins the row's
/// transition, so a second release, a late sweep or a racing commit can
/// never return the same units twice.
#[derive(Clone)]
pub struct ReservationService {
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl ReservationService {
    /// Creates a service reading wall-clock time.
    pub fn new(catalog: Arc<dyn CatalogStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self::with_clock(catalog, ledger, Arc::new(SystemClock))
    }

    pub fn with_clock(
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            clock,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// `now + ttl`, rejecting non-positive or out-of-range lifetimes.
    fn expiry(&self, now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
        if ttl <= Duration::zero() {
            return Err(ReservationError::InvalidTtl(ttl));
        }
        now.checked_add_signed(ttl)
            .ok_or(ReservationError::InvalidTtl(ttl))
    }

    /// Loads a reservation by ID.
    pub async fn get(&self, id: ReservationId) -> Result<Reservation> {
        self.ledger
            .get(id)
            .await?
            .ok_or(ReservationError::ReservationNotFound(id))
    }

    /// Active reservations held by `user_id`.
    pub async fn active_for_user(&self, user_id: &UserId) -> Result<Vec<Reservation>> {
        Ok(self.ledger.list_active_by_user(user_id).await?)
    }

    /// Takes `quantity` units of `product_id` out of stock and records an
    /// Active reservation expiring after `ttl`.
    ///
    /// Stock is decremented before the ledger row is written. If the insert
    /// fails the units are put back; a crash between the two steps leaks them
    /// until reconciled.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        product_id: &ProductId,
        user_id: &UserId,
        quantity: u32,
        ttl: Duration,
    ) -> Result<ReserveOutcome> {
        if quantity == 0 {
            return Err(ReservationError::InvalidQuantity(quantity));
        }
        let now = self.clock.now();
        self.expiry(now, ttl)?;

        match self.catalog.try_decrement(product_id, quantity).await? {
            DecrementOutcome::ProductMissing => {
                Err(ReservationError::ProductNotFound(product_id.clone()))
            }
            DecrementOutcome::Insufficient { available } => {
                metrics::counter!("reservations_rejected_total").increment(1);
                tracing::info!(requested = quantity, available, "insufficient stock");
                Ok(ReserveOutcome::InsufficientStock {
                    requested: quantity,
                    available,
                })
            }
            DecrementOutcome::Applied { remaining } => {
                let reservation = Reservation::new(
                    product_id.clone(),
                    user_id.clone(),
                    quantity,
                    now,
                    ttl,
                );

                if let Err(e) = self.ledger.insert(reservation.clone()).await {
                    // A failed put-back is logged and counted inside return_stock.
                    let _ = self
                        .return_stock(reservation.id, product_id, quantity)
                        .await;
                    return Err(e.into());
                }

                metrics::counter!("reservations_created_total").increment(1);
                tracing::info!(
                    reservation_id = %reservation.id,
                    remaining,
                    "stock reserved"
                );
                Ok(ReserveOutcome::Reserved(reservation))
            }
        }
    }

    /// Pushes the expiry of an Active reservation to `now + ttl`.
    #[tracing::instrument(skip(self))]
    pub async fn extend(&self, id: ReservationId, ttl: Duration) -> Result<Reservation> {
        let expires_at = self.expiry(self.clock.now(), ttl)?;
        Ok(self.ledger.extend(id, expires_at).await?)
    }

    /// Returns the reservation's stock and marks it Released.
    ///
    /// Releasing a reservation that is already terminal succeeds without
    /// touching stock, so callers may retry freely.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, id: ReservationId) -> Result<Reservation> {
        match self
            .ledger
            .update_status(id, ReservationStatus::Released)
            .await
        {
            Ok(row) => {
                self.return_stock(row.id, &row.product_id, row.quantity)
                    .await?;
                metrics::counter!("reservations_released_total").increment(1);
                tracing::info!(quantity = row.quantity, "reservation released");
                Ok(row)
            }
            Err(StoreError::TransitionRejected { status, .. }) => {
                tracing::debug!(%status, "release on terminal reservation is a no-op");
                self.get(id).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Makes the reservation's deduction permanent. Stock is not touched.
    ///
    /// Committing twice succeeds. Committing a Released or Expired
    /// reservation means the units were already returned and is reported as
    /// corruption.
    #[tracing::instrument(skip(self))]
    pub async fn commit(&self, id: ReservationId) -> Result<Reservation> {
        match self
            .ledger
            .update_status(id, ReservationStatus::Committed)
            .await
        {
            Ok(row) => {
                metrics::counter!("reservations_committed_total").increment(1);
                Ok(row)
            }
            Err(StoreError::TransitionRejected {
                status: ReservationStatus::Committed,
                ..
            }) => self.get(id).await,
            Err(StoreError::TransitionRejected { status, .. }) => {
                metrics::counter!("reservation_corruption_total").increment(1);
                tracing::error!(%status, "commit attempted on a returned reservation");
                Err(ReservationError::CorruptionDetected {
                    reservation_id: id,
                    reason: format!("commit attempted on {status} reservation"),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Moves an Active reservation to `new_quantity`, taking or returning
    /// only the difference, and refreshes its expiry to `now + ttl`.
    #[tracing::instrument(skip(self))]
    pub async fn change_quantity(
        &self,
        id: ReservationId,
        new_quantity: u32,
        ttl: Duration,
    ) -> Result<ChangeOutcome> {
        if new_quantity == 0 {
            return Err(ReservationError::InvalidQuantity(new_quantity));
        }
        let expires_at = self.expiry(self.clock.now(), ttl)?;

        let current = self.get(id).await?;
        if !current.is_active() {
            return Err(ReservationError::NotActive {
                id,
                status: current.status,
            });
        }

        let old_quantity = current.quantity;
        let product_id = &current.product_id;

        if new_quantity > old_quantity {
            let delta = new_quantity - old_quantity;
            match self.catalog.try_decrement(product_id, delta).await? {
                DecrementOutcome::Applied { .. } => {}
                DecrementOutcome::Insufficient { available } => {
                    metrics::counter!("reservations_rejected_total").increment(1);
                    return Ok(ChangeOutcome::InsufficientStock {
                        requested: delta,
                        available,
                    });
                }
                DecrementOutcome::ProductMissing => {
                    metrics::counter!("reservation_orphaned_total").increment(1);
                    tracing::warn!(%product_id, "reservation references a deleted product");
                    return Err(ReservationError::CorruptionDetected {
                        reservation_id: id,
                        reason: format!("product {product_id} no longer exists"),
                    });
                }
            }
        }

        let updated = match self
            .ledger
            .update_quantity(id, old_quantity, new_quantity, expires_at)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                if new_quantity > old_quantity {
                    // A failed put-back is logged and counted inside return_stock.
                    let _ = self
                        .return_stock(id, product_id, new_quantity - old_quantity)
                        .await;
                }
                return Err(e.into());
            }
        };

        if new_quantity < old_quantity {
            self.return_stock(id, product_id, old_quantity - new_quantity)
                .await?;
        }

        tracing::info!(old_quantity, new_quantity, "reservation quantity changed");
        Ok(ChangeOutcome::Changed(updated))
    }

    /// Expires every Active reservation with `expires_at <= now` and returns
    /// its stock.
    ///
    /// Safe to run concurrently with itself and with release/commit: a row
    /// that another caller already moved out of Active is skipped.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let start = std::time::Instant::now();
        let due = self.ledger.list_active_expiring_before(now).await?;
        let mut report = SweepReport::default();

        for row in due {
            match self.ledger.expire(row.id, now).await {
                Ok(expired) => {
                    if let Err(e) = self
                        .return_stock(expired.id, &expired.product_id, expired.quantity)
                        .await
                    {
                        tracing::error!(error = %e, "expired reservation kept its stock");
                    }
                    report.expired.push(expired);
                }
                Err(StoreError::TransitionRejected { status, .. }) => {
                    tracing::debug!(reservation_id = %row.id, %status, "lost expiry race");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(reservation_id = %row.id, error = %e, "failed to expire reservation");
                }
            }
        }

        metrics::counter!("reservations_expired_total").increment(report.count() as u64);
        metrics::histogram!("reservation_sweep_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        if report.count() > 0 || report.failed > 0 {
            tracing::info!(
                expired = report.count(),
                failed = report.failed,
                "expiry sweep complete"
            );
        }

        Ok(report)
    }

    /// Puts `quantity` units back into stock for a reservation that has
    /// already given them up in the ledger.
    ///
    /// A deleted product is tolerated. A store failure here leaks stock and
    /// is reported as corruption.
    async fn return_stock(
        &self,
        reservation_id: ReservationId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<()> {
        match self.catalog.increment(product_id, quantity).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                metrics::counter!("reservation_orphaned_total").increment(1);
                tracing::warn!(
                    %reservation_id,
                    %product_id,
                    quantity,
                    "product deleted while reserved, stock not returned"
                );
                Ok(())
            }
            Err(e) => {
                metrics::counter!("reservation_stock_leaks_total").increment(1);
                tracing::error!(
                    %reservation_id,
                    %product_id,
                    quantity,
                    error = %e,
                    "failed to return stock"
                );
                Err(ReservationError::CorruptionDetected {
                    reservation_id,
                    reason: format!("{quantity} units of {product_id} not returned: {e}"),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{FixedClock, ManualClock, Money};
    use store::{InMemoryCatalog, InMemoryLedger, Product};

    use super::*;

    struct Fixture {
        service: ReservationService,
        catalog: InMemoryCatalog,
        clock: ManualClock,
    }

    fn fixture(stock: u32) -> Fixture {
        let catalog = InMemoryCatalog::with_products([Product::new(
            "SKU-001",
            "Widget",
            Money::from_cents(1000),
            stock,
        )]);
        let clock = ManualClock::new(Utc::now());
        let service = ReservationService::with_clock(
            Arc::new(catalog.clone()),
            Arc::new(InMemoryLedger::new()),
            Arc::new(clock.clone()),
        );
        Fixture {
            service,
            catalog,
            clock,
        }
    }

    fn sku() -> ProductId {
        ProductId::new("SKU-001")
    }

    fn ttl() -> Duration {
        Duration::minutes(10)
    }

    async fn stock(f: &Fixture) -> u32 {
        f.catalog.get_stock(&sku()).await.unwrap().unwrap()
    }

    async fn reserve(f: &Fixture, user: &str, qty: u32) -> Reservation {
        match f
            .service
            .reserve(&sku(), &user.into(), qty, ttl())
            .await
            .unwrap()
        {
            ReserveOutcome::Reserved(r) => r,
            other => panic!("expected reservation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reserve_decrements_stock_and_sets_expiry() {
        let f = fixture(10);
        let now = f.clock.now();
        let r = reserve(&f, "u1", 4).await;

        assert_eq!(r.status, ReservationStatus::Active);
        assert_eq!(r.reserved_at, now);
        assert_eq!(r.expires_at, now + ttl());
        assert_eq!(stock(&f).await, 6);
    }

    #[tokio::test]
    async fn test_reserve_stamps_times_from_clock() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let service = ReservationService::with_clock(
            Arc::new(InMemoryCatalog::with_products([Product::new(
                "SKU-001",
                "Widget",
                Money::from_cents(1000),
                1,
            )])),
            Arc::new(InMemoryLedger::new()),
            Arc::new(FixedClock::new(at)),
        );

        let outcome = service
            .reserve(&sku(), &"u1".into(), 1, Duration::seconds(30))
            .await
            .unwrap();
        let r = outcome.reservation().unwrap();
        assert_eq!(r.reserved_at, at);
        assert_eq!(r.expires_at, at + Duration::seconds(30));
        assert!(!r.is_due(at + Duration::seconds(29)));
        assert!(r.is_due(at + Duration::seconds(30)));
    }

    #[tokio::test]
    async fn test_reserve_rejections() {
        let f = fixture(2);

        let outcome = f
            .service
            .reserve(&sku(), &"u1".into(), 3, ttl())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReserveOutcome::InsufficientStock {
                requested: 3,
                available: 2
            }
        );
        assert!(outcome.reservation().is_none());

        let missing = f
            .service
            .reserve(&ProductId::new("nope"), &"u1".into(), 1, ttl())
            .await;
        assert!(matches!(missing, Err(ReservationError::ProductNotFound(_))));

        let zero = f.service.reserve(&sku(), &"u1".into(), 0, ttl()).await;
        assert!(matches!(zero, Err(ReservationError::InvalidQuantity(0))));
        assert_eq!(stock(&f).await, 2);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected_without_touching_stock() {
        let f = fixture(5);

        for ttl in [Duration::zero(), Duration::seconds(-1), Duration::MAX] {
            let result = f.service.reserve(&sku(), &"u1".into(), 1, ttl).await;
            assert!(matches!(result, Err(ReservationError::InvalidTtl(_))));
        }
        assert_eq!(stock(&f).await, 5);

        let r = reserve(&f, "u1", 2).await;
        assert!(matches!(
            f.service.extend(r.id, Duration::MAX).await,
            Err(ReservationError::InvalidTtl(_))
        ));
        assert!(matches!(
            f.service.change_quantity(r.id, 3, Duration::MAX).await,
            Err(ReservationError::InvalidTtl(_))
        ));
        assert_eq!(f.service.get(r.id).await.unwrap().expires_at, r.expires_at);
        assert_eq!(stock(&f).await, 3);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let f = fixture(10);
        let r = reserve(&f, "u1", 4).await;

        let first = f.service.release(r.id).await.unwrap();
        assert_eq!(first.status, ReservationStatus::Released);
        assert_eq!(stock(&f).await, 10);

        let second = f.service.release(r.id).await.unwrap();
        assert_eq!(second.status, ReservationStatus::Released);
        assert_eq!(stock(&f).await, 10);
    }

    #[tokio::test]
    async fn test_release_unknown_reservation() {
        let f = fixture(1);
        let result = f.service.release(ReservationId::new()).await;
        assert!(matches!(
            result,
            Err(ReservationError::ReservationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_keeps_stock_and_blocks_release() {
        let f = fixture(5);
        let r = reserve(&f, "u1", 3).await;

        let committed = f.service.commit(r.id).await.unwrap();
        assert_eq!(committed.status, ReservationStatus::Committed);
        assert_eq!(stock(&f).await, 2);

        // Release after commit must not hand the units back.
        let after = f.service.release(r.id).await.unwrap();
        assert_eq!(after.status, ReservationStatus::Committed);
        assert_eq!(stock(&f).await, 2);

        // Commit again is harmless.
        assert!(f.service.commit(r.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_commit_of_released_reservation_is_corruption() {
        let f = fixture(5);
        let r = reserve(&f, "u1", 1).await;
        f.service.release(r.id).await.unwrap();

        let result = f.service.commit(r.id).await;
        assert!(matches!(
            result,
            Err(ReservationError::CorruptionDetected { .. })
        ));
    }

    #[tokio::test]
    async fn test_change_quantity_up_and_down() {
        let f = fixture(10);
        let r = reserve(&f, "u1", 2).await;

        f.clock.advance(Duration::minutes(3));
        let ChangeOutcome::Changed(up) = f.service.change_quantity(r.id, 5, ttl()).await.unwrap()
        else {
            panic!("increase should succeed");
        };
        assert_eq!(up.quantity, 5);
        assert_eq!(up.expires_at, f.clock.now() + ttl());
        assert_eq!(stock(&f).await, 5);

        let ChangeOutcome::Changed(down) =
            f.service.change_quantity(r.id, 1, ttl()).await.unwrap()
        else {
            panic!("decrease should succeed");
        };
        assert_eq!(down.quantity, 1);
        assert_eq!(stock(&f).await, 9);
    }

    #[tokio::test]
    async fn test_change_quantity_blocked_by_stock() {
        let f = fixture(2);
        let r = reserve(&f, "u1", 2).await;
        assert_eq!(stock(&f).await, 0);

        let outcome = f.service.change_quantity(r.id, 5, ttl()).await.unwrap();
        assert_eq!(
            outcome,
            ChangeOutcome::InsufficientStock {
                requested: 3,
                available: 0
            }
        );
        assert_eq!(f.service.get(r.id).await.unwrap().quantity, 2);
        assert_eq!(stock(&f).await, 0);
    }

    #[tokio::test]
    async fn test_change_quantity_requires_active_row() {
        let f = fixture(5);
        let r = reserve(&f, "u1", 2).await;
        f.service.release(r.id).await.unwrap();

        let result = f.service.change_quantity(r.id, 3, ttl()).await;
        assert!(matches!(
            result,
            Err(ReservationError::NotActive {
                status: ReservationStatus::Released,
                ..
            })
        ));
        assert_eq!(stock(&f).await, 5);
    }

    #[tokio::test]
    async fn test_extend_pushes_expiry_without_stock_change() {
        let f = fixture(5);
        let r = reserve(&f, "u1", 2).await;

        f.clock.advance(Duration::minutes(8));
        let extended = f.service.extend(r.id, ttl()).await.unwrap();
        assert_eq!(extended.expires_at, f.clock.now() + ttl());
        assert_eq!(stock(&f).await, 3);
    }

    #[tokio::test]
    async fn test_sweep_expires_only_due_rows() {
        let f = fixture(10);
        let old = reserve(&f, "u1", 3).await;
        f.clock.advance(Duration::minutes(5));
        let fresh = reserve(&f, "u2", 2).await;
        assert_eq!(stock(&f).await, 5);

        let at = old.expires_at;
        let report = f.service.sweep_expired(at).await.unwrap();
        assert_eq!(report.count(), 1);
        assert_eq!(report.expired[0].id, old.id);
        assert!(report.expired.iter().all(|r| r.expires_at <= at));
        assert_eq!(stock(&f).await, 8);

        assert_eq!(
            f.service.get(fresh.id).await.unwrap().status,
            ReservationStatus::Active
        );
        assert_eq!(
            f.service.get(old.id).await.unwrap().status,
            ReservationStatus::Expired
        );

        // A second sweep at the same instant finds nothing.
        assert_eq!(f.service.sweep_expired(at).await.unwrap().count(), 0);
        assert_eq!(stock(&f).await, 8);
    }

    #[tokio::test]
    async fn test_release_tolerates_deleted_product() {
        let f = fixture(5);
        let r = reserve(&f, "u1", 2).await;
        f.catalog.delete_product(&sku()).await;

        let released = f.service.release(r.id).await.unwrap();
        assert_eq!(released.status, ReservationStatus::Released);
    }
}
