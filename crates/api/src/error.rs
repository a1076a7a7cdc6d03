//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cart::CartError;
use reservation::ReservationError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Reservation service error.
    Reservation(ReservationError),
    /// Cart controller error.
    Cart(CartError),
    /// Store error outside any service call.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Reservation(err) => reservation_error_to_response(err),
            ApiError::Cart(err) => cart_error_to_response(err),
            ApiError::Store(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn reservation_error_to_response(err: ReservationError) -> (StatusCode, String) {
    match &err {
        ReservationError::ProductNotFound(_) | ReservationError::ReservationNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        ReservationError::InvalidQuantity(_) | ReservationError::InvalidTtl(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        ReservationError::NotActive { .. } => (StatusCode::CONFLICT, err.to_string()),
        ReservationError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        ReservationError::CorruptionDetected { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn cart_error_to_response(err: CartError) -> (StatusCode, String) {
    match err {
        CartError::Reservation(inner) => reservation_error_to_response(inner),
        CartError::ItemNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        CartError::EmptyCart(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        _ if err.is_retryable() => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        ApiError::Reservation(err)
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
