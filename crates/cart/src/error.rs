//! Cart error types.

use common::{ProductId, UserId};
use reservation::ReservationError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The cart has no line for this product.
    #[error("Product {product_id} is not in the cart of {user_id}")]
    ItemNotFound {
        user_id: UserId,
        product_id: ProductId,
    },

    /// Checkout was asked for an empty cart.
    #[error("Cart of {0} is empty")]
    EmptyCart(UserId),

    /// Reservation service error.
    #[error(transparent)]
    Reservation(#[from] ReservationError),

    /// Cart persistence error.
    #[error("Cart store error: {0}")]
    Store(#[from] StoreError),
}

impl CartError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CartError::Reservation(e) => e.is_retryable(),
            CartError::Store(_) => true,
            _ => false,
        }
    }
}

/// Convenience type alias for cart results.
pub type Result<T> = std::result::Result<T, CartError>;
