use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Cart, CartLine, Money, Product, ProductId, Reservation, ReservationId, ReservationStatus,
    Result, StoreError, UserId,
    store::{CartStore, CatalogStore, DecrementOutcome, LedgerStore},
};

const RESERVATION_COLUMNS: &str =
    "id, product_id, user_id, quantity, reserved_at, expires_at, status";

/// Runs the database migrations for all three stores.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("database migrations applied");
    Ok(())
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column} out of range: {value}")))
}

/// PostgreSQL-backed product catalog.
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: to_u32(row.try_get("stock")?, "stock")?,
        })
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalog {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, name, price_cents, stock FROM products WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn put_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_decrement(&self, id: &ProductId, qty: u32) -> Result<DecrementOutcome> {
        // The WHERE clause is the compare half of the compare-and-swap.
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(id.as_str())
        .bind(i64::from(qty))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(DecrementOutcome::Applied {
                remaining: to_u32(remaining, "stock")?,
            });
        }

        let available: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        tracing::debug!(
            product_id = %id,
            requested = qty,
            ?available,
            "conditional decrement rejected"
        );
        match available {
            Some(stock) => Ok(DecrementOutcome::Insufficient {
                available: to_u32(stock, "stock")?,
            }),
            None => Ok(DecrementOutcome::ProductMissing),
        }
    }

    async fn increment(&self, id: &ProductId, qty: u32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(i64::from(qty))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// PostgreSQL-backed reservation ledger.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let status: String = row.try_get("status")?;
        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            quantity: to_u32(row.try_get("quantity")?, "quantity")?,
            reserved_at: row.try_get("reserved_at")?,
            expires_at: row.try_get("expires_at")?,
            status: status.parse()?,
        })
    }

    /// Explains why a conditional update matched no row.
    async fn rejection(&self, id: ReservationId) -> StoreError {
        match self.get(id).await {
            Ok(Some(row)) => StoreError::TransitionRejected {
                id,
                status: row.status,
            },
            Ok(None) => StoreError::ReservationNotFound(id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn insert(&self, reservation: Reservation) -> Result<ReservationId> {
        sqlx::query(
            r#"
            INSERT INTO reservations (id, product_id, user_id, quantity, reserved_at, expires_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.product_id.as_str())
        .bind(reservation.user_id.as_str())
        .bind(i64::from(reservation.quantity))
        .bind(reservation.reserved_at)
        .bind(reservation.expires_at)
        .bind(reservation.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::DuplicateReservation(reservation.id);
            }
            StoreError::Database(e)
        })?;

        Ok(reservation.id)
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn update_status(
        &self,
        id: ReservationId,
        status: ReservationStatus,
    ) -> Result<Reservation> {
        if !ReservationStatus::Active.can_transition_to(status) {
            return Err(StoreError::InvalidData(format!(
                "cannot move reservation {id} to {status}"
            )));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE reservations SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'Active'
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_reservation(row),
            None => Err(self.rejection(id).await),
        }
    }

    async fn expire(&self, id: ReservationId, now: DateTime<Utc>) -> Result<Reservation> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reservations SET status = 'Expired', updated_at = NOW()
            WHERE id = $1 AND status = 'Active' AND expires_at <= $2
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_reservation(row),
            None => Err(self.rejection(id).await),
        }
    }

    async fn update_quantity(
        &self,
        id: ReservationId,
        expected: u32,
        quantity: u32,
        expires_at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reservations SET quantity = $3, expires_at = $4, updated_at = NOW()
            WHERE id = $1 AND status = 'Active' AND quantity = $2
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(i64::from(expected))
        .bind(i64::from(quantity))
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_reservation(row);
        }

        match self.get(id).await? {
            Some(current) if current.is_active() => Err(StoreError::ConcurrencyConflict {
                id,
                expected,
                actual: current.quantity,
            }),
            Some(current) => Err(StoreError::TransitionRejected {
                id,
                status: current.status,
            }),
            None => Err(StoreError::ReservationNotFound(id)),
        }
    }

    async fn extend(&self, id: ReservationId, expires_at: DateTime<Utc>) -> Result<Reservation> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reservations SET expires_at = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'Active'
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_reservation(row),
            None => Err(self.rejection(id).await),
        }
    }

    async fn list_active_expiring_before(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM reservations
            WHERE status = 'Active' AND expires_at <= $1
            ORDER BY expires_at ASC
            "#
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn list_active_by_user(&self, user_id: &UserId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM reservations
            WHERE status = 'Active' AND user_id = $1
            ORDER BY reserved_at ASC
            "#
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }
}

/// PostgreSQL-backed cart documents (lines stored as JSONB).
#[derive(Clone)]
pub struct PostgresCartStore {
    pool: PgPool,
}

impl PostgresCartStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for PostgresCartStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<Cart>> {
        let row: Option<PgRow> =
            sqlx::query("SELECT user_id, lines, updated_at FROM carts WHERE user_id = $1")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => {
                let lines_json: serde_json::Value = row.try_get("lines")?;
                let lines: BTreeMap<ProductId, CartLine> = serde_json::from_value(lines_json)?;
                Ok(Some(Cart {
                    user_id: UserId::new(row.try_get::<String, _>("user_id")?),
                    lines,
                    updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, cart: &Cart) -> Result<()> {
        let lines_json = serde_json::to_value(&cart.lines)?;

        sqlx::query(
            r#"
            INSERT INTO carts (user_id, lines, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                lines = EXCLUDED.lines,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(cart.user_id.as_str())
        .bind(lines_json)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
