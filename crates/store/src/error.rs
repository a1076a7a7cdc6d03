use thiserror::Error;

use crate::{ReservationId, ReservationStatus};

/// Errors that can occur when interacting with the backing stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional status transition found the row outside the state it
    /// requires (not Active, or not yet due for expiry).
    #[error("Transition rejected for reservation {id}: row is {status}")]
    TransitionRejected {
        id: ReservationId,
        status: ReservationStatus,
    },

    /// A conditional quantity update lost a race with another writer.
    #[error(
        "Concurrency conflict for reservation {id}: expected quantity {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        id: ReservationId,
        expected: u32,
        actual: u32,
    },

    /// The reservation row does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// A reservation with this ID already exists.
    #[error("Duplicate reservation: {0}")]
    DuplicateReservation(ReservationId),

    /// A stored value is outside the domain's range.
    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
