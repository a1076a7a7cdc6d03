//! Reservation rows and their status machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{ProductId, ReservationId, StoreError, UserId};

/// The status of a reservation.
///
/// State transitions:
/// ```text
/// Active ──┬──► Committed
///          ├──► Released
///          └──► Expired
/// ```
/// All three targets are terminal; a row never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReservationStatus {
    /// Stock is held and returnable.
    #[default]
    Active,

    /// Returned by an explicit remove/cancel (terminal).
    Released,

    /// Returned by the expiry sweep (terminal).
    Expired,

    /// Deduction made permanent at order placement (terminal).
    Committed,
}

impl ReservationStatus {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }

    /// Returns true if a row in this state may move to `next`.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(self, ReservationStatus::Active) && next.is_terminal()
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "Active",
            ReservationStatus::Released => "Released",
            ReservationStatus::Expired => "Expired",
            ReservationStatus::Committed => "Committed",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(ReservationStatus::Active),
            "Released" => Ok(ReservationStatus::Released),
            "Expired" => Ok(ReservationStatus::Expired),
            "Committed" => Ok(ReservationStatus::Committed),
            other => Err(StoreError::InvalidData(format!(
                "unknown reservation status '{other}'"
            ))),
        }
    }
}

/// A time-bounded hold on a quantity of stock for one user and product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub quantity: u32,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ReservationStatus,
}

impl Reservation {
    /// Creates a new Active reservation expiring `ttl` after `now`.
    pub fn new(
        product_id: ProductId,
        user_id: UserId,
        quantity: u32,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            product_id,
            user_id,
            quantity,
            reserved_at: now,
            expires_at: now + ttl,
            status: ReservationStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Returns true if the sweep may expire this row at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at <= now
    }
}
