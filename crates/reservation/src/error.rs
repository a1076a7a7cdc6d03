//! Reservation error types.

use chrono::Duration;
use common::{ProductId, ReservationId};
use store::{ReservationStatus, StoreError};
use thiserror::Error;

/// Errors that can occur during reservation operations.
///
/// Running out of stock is not an error; it is reported through
/// `ReserveOutcome::InsufficientStock` and `ChangeOutcome::InsufficientStock`.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// The product does not exist in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The reservation does not exist in the ledger.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// Quantities must be greater than zero.
    #[error("Invalid quantity: {0} (must be greater than 0)")]
    InvalidQuantity(u32),

    /// Reservation lifetimes must be positive and representable.
    #[error("Invalid TTL: {0} (must be positive and within range)")]
    InvalidTtl(Duration),

    /// The operation needs an Active reservation.
    #[error("Reservation {id} is {status}, not Active")]
    NotActive {
        id: ReservationId,
        status: ReservationStatus,
    },

    /// Ledger and catalog disagree in a way the engine cannot repair.
    #[error("Corruption detected for reservation {reservation_id}: {reason}")]
    CorruptionDetected {
        reservation_id: ReservationId,
        reason: String,
    },

    /// The backing store failed or a conditional write lost a race.
    #[error("Transient store error: {0}")]
    Transient(#[source] StoreError),
}

impl ReservationError {
    /// Returns true if repeating the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReservationError::Transient(_))
    }
}

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ReservationNotFound(id) => ReservationError::ReservationNotFound(id),
            StoreError::TransitionRejected { id, status } => {
                ReservationError::NotActive { id, status }
            }
            other => ReservationError::Transient(other),
        }
    }
}

/// Result type for reservation operations.
pub type Result<T> = std::result::Result<T, ReservationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_taxonomy() {
        let id = ReservationId::new();

        let not_found: ReservationError = StoreError::ReservationNotFound(id).into();
        assert!(matches!(not_found, ReservationError::ReservationNotFound(_)));
        assert!(!not_found.is_retryable());

        let conflict: ReservationError = StoreError::ConcurrencyConflict {
            id,
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(conflict.is_retryable());

        let rejected: ReservationError = StoreError::TransitionRejected {
            id,
            status: ReservationStatus::Expired,
        }
        .into();
        assert!(matches!(
            rejected,
            ReservationError::NotActive {
                status: ReservationStatus::Expired,
                ..
            }
        ));
    }
}
